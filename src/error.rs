//! Centralized error type for the bloco umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate
//! boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] bloco_core::Error),

    #[error("Program: {0}")]
    Program(#[from] bloco_program::Error),

    #[error("Events: {0}")]
    Events(#[from] bloco_events::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
