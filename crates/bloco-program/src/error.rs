//! Error types for bloco-program.
//!
//! Parsing a workspace is the only fallible step. Compilation of a parsed
//! forest always succeeds (misconfigured blocks log and drop out), and
//! execution catches its own failures per statement.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Block forest parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
