//! Integration test modules for the bloco engine.
//!
//! - engine: lifecycle, run/stop/reset cycles, isolation
//! - programs: workspace JSON through the compiler and executor
//! - events: handler registration, debounced updates, dispatch

pub mod engine;
pub mod events;
pub mod programs;
