//! Errors surfaced to the caller of a pipeline run.
//!
//! Everything transient (a failed partition, a broken detail page, a dead
//! website) is recovered locally and only logged. What ends up here is what a
//! caller must act on: a missing credential, invalid run options, or an export
//! that could not be persisted.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadsError {
    /// The keyed API variant was selected but no token is available.
    #[error("missing credential: set {var} or `keyed.api_token` in the config")]
    MissingCredential { var: &'static str },

    /// Run options violate `days > 0` / `limit > 0`.
    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    /// Unknown source name on the configuration surface.
    #[error("unknown source kind: {0}")]
    UnknownSource(String),

    /// HTTP client could not be constructed (TLS backend, bad header value).
    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Export could not be written.
    #[error("export to {path} failed: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LeadsError>;
