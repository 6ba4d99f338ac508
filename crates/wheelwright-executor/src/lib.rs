//! Executor implementations for wheelwright.
//!
//! [`LocalExecutor`] runs build jobs as local child processes; the
//! [`emulation`] module covers cross-architecture builds.

pub mod emulation;
pub mod local;

pub use emulation::{CommandEmulation, NativeOnly};
pub use local::LocalExecutor;
