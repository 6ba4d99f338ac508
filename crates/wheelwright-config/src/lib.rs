//! KDL configuration parsing for wheelwright.
//!
//! This crate handles parsing of:
//! - Release definitions (release.kdl)
//! - Build matrix expansion

pub mod error;
pub mod matrix;
pub mod release;

pub use error::{ConfigError, ConfigResult};
pub use matrix::{MatrixSpec, Selector};
pub use release::{BuildConfig, ReleaseConfig, load_release_config, parse_release_config};
