use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Proxy fetch failures. Callers degrade these to "content unavailable".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("proxy returned HTTP {0}")]
    Status(u16),
    #[error("malformed proxy envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("page has no title heading")]
    MissingHeading,
}

/// Completion call failures. All of them map to the fallback candidate.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response had no choices")]
    NoChoices,
    #[error("malformed completion content: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error in {file} line {line}: {source}")]
    Json {
        file: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("no processed files could be read from {0}")]
    NoProcessedFiles(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing credential: set ASYLUM_{0}")]
    MissingCredential(&'static str),
}
