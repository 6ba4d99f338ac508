//! Error types for wheelwright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("build failed: {0}")]
    Build(String),

    #[error("tests failed: {0}")]
    Test(String),

    #[error("emulation setup failed: {0}")]
    EmulationSetup(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("upload failed: {0}")]
    Publish(String),

    #[error("authentication rejected: {0}")]
    Credential(String),

    #[error("artifact conflict: {0}")]
    ArtifactConflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error aborts the entire publish phase rather than a
    /// single artifact. Only authentication rejections qualify: no artifact
    /// in the batch can succeed once the index refuses the credentials.
    pub fn is_publish_fatal(&self) -> bool {
        matches!(self, Error::Credential(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
