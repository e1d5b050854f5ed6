use std::path::PathBuf;

use thiserror::Error;

/// Raised while building a sink, before any chunk is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'path' parameter is required on file output")]
    MissingPath,
    #[error("unsupported compression algorithm '{0}'")]
    UnsupportedCompression(String),
    #[error("'{executable}' utility must be in PATH for compression: {source}")]
    CompressorUnavailable {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid time format description '{format}': {reason}")]
    InvalidTimeFormat { format: String, reason: String },
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raised by a single `ChunkWriter::write` call. Never retried internally.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn compressor '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("compressor '{executable}' exited with {status}")]
    CompressorFailed { executable: String, status: String },
    #[error("compressor '{executable}' did not exit within {timeout_secs}s")]
    CompressorTimeout { executable: String, timeout_secs: u64 },
    #[error("no free ordinal for key '{key}' after {attempts} candidates")]
    OrdinalsExhausted { key: String, attempts: u64 },
    #[error("chunk key '{key}' does not match the time slice format: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WriteError {
    /// True when the destination was claimed by someone else between the
    /// existence probe and the exclusive create.
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            WriteError::Open { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        )
    }
}
