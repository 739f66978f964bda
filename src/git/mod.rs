// src/git/mod.rs

//! Version-control queries.
//!
//! All git semantics live behind the [`CommitOracle`] trait so the watch loop
//! only ever sees commit refs and [`Comparison`](crate::types::Comparison)
//! values. [`GitOracle`] is the production implementation, shelling out to
//! the `git` binary through a [`CommandRunner`](crate::exec::CommandRunner).

pub mod oracle;

pub use oracle::{CommitOracle, GitOracle};
