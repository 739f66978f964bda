// src/exec/mod.rs

//! External command execution.
//!
//! - [`backend`] provides the `CommandRunner` trait and the production
//!   `TokioCommandRunner`; tests replace it with a scripted runner.
//! - [`latch`] provides the single-fire events used for cancellation and
//!   process completion.

pub mod backend;
pub mod latch;

pub use backend::{
    BoxFuture, CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner,
    DEFAULT_COMMAND_TIMEOUT,
};
pub use latch::{latch, CancelToken, Latch, LatchWaiter};
