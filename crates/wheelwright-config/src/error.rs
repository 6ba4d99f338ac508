//! Configuration parsing errors.

use thiserror::Error;
use wheelwright_core::target::ParseTargetError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ParseTargetError> for ConfigError {
    fn from(e: ParseTargetError) -> Self {
        ConfigError::InvalidValue {
            field: e.dimension.to_string(),
            message: format!("unknown value '{}'", e.value),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
