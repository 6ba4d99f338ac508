//! Core domain types and traits for the wheelwright release engine.
//!
//! This crate contains:
//! - Job identifiers and common types
//! - Build targets (os, architecture, python version)
//! - Build jobs and their lifecycle
//! - Executor and emulation traits
//! - The content-addressed artifact store
//! - Package index trait and publish outcomes
//! - Command template interpolation

pub mod artifact;
pub mod error;
pub mod executor;
pub mod id;
pub mod index;
pub mod job;
pub mod release;
pub mod target;
pub mod template;

pub use error::{Error, Result};
pub use id::JobId;
