//! Error taxonomy for a single turn.

use thiserror::Error;

/// Failure while persisting or retrieving one rendered artifact. Never aborts a turn.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid base64 payload for {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("writing {path} in sandbox: {message}")]
    RemoteWrite { path: String, message: String },
    #[error("downloading {path}: {message}")]
    Download { path: String, message: String },
    #[error("writing local file {path}: {source}")]
    LocalWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Unexpected shape or failure while asking the model what to run.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tool `{tool}` was called without a string `code` field")]
    MissingCode { tool: String },
    #[error("model request failed: {0:#}")]
    Model(anyhow::Error),
}
