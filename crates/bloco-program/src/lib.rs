//! Block programs for the bloco audio engine.
//!
//! Turns a serialized block workspace into runnable scripts: a typed
//! [`BlockForest`] model, a compiler that classifies top-level chains into
//! definition, setup, and execution phases, and an async [`Executor`] that
//! interprets compiled statements against a [`bloco_core::BlocoSystem`]
//! with cooperative cancellation.
//!
//! # Primary API
//!
//! - [`BlockForest`]: typed model of a block workspace.
//! - [`compile`] / [`compile_handlers`]: workspace to program and handler
//!   specs.
//! - [`CompiledProgram`]: phase scripts plus the canonical listing.
//! - [`Executor`]: runs compiled scripts against a live system.
//!
//! ```ignore
//! let forest = BlockForest::from_json(&workspace_json)?;
//! let program = compile(&forest);
//! let executor = Executor::new(system);
//! executor.run_program(&program).await;
//! ```

pub mod error;
pub use error::{Error, Result};

mod blocks;
pub use blocks::{Block, BlockForest, BlockKind, Expr, KeyTrigger, NumExpr};

mod script;
pub use script::{render_script, CompiledHandler, CompiledProgram, Script, Stmt};

mod compiler;
pub use compiler::{compile, compile_handlers, HandlerSpec};

mod executor;
pub use executor::Executor;
