//! File output configuration.
//!
//! Loaded from JSON (or assembled by the CLI), then validated once by
//! [`FileOutputConfig::resolve`]. Everything that can be wrong with the
//! configuration, including a missing compressor, surfaces there.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compress::{CompressionDispatcher, CompressionMode, SinkFactory};
use crate::error::ConfigError;
use crate::format::RecordFormatter;
use crate::layout::{PathTemplate, WILDCARD};
use crate::slicer::{TimeSlicer, TimeZonePolicy, DEFAULT_TIME_SLICE_FORMAT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutputConfig {
    /// Output path template. Required.
    #[serde(default)]
    pub path: Option<String>,

    /// Record timestamp format. Default: ISO 8601 with offset.
    #[serde(default)]
    pub time_format: Option<String>,

    /// Bucket key format.
    /// Default: `[year][month][day]`
    #[serde(default = "default_time_slice_format")]
    pub time_slice_format: String,

    /// Local offset when true, UTC otherwise.
    /// Default: true
    #[serde(default = "default_localtime")]
    pub localtime: bool,

    /// `gz`, `gzip`, `lzop` or `none`.
    #[serde(default)]
    pub compress: Option<String>,

    /// Executable used instead of the mode's default compressor.
    #[serde(default)]
    pub compress_command: Option<String>,

    /// Upper bound on waiting for a compressor to exit.
    /// Default: 300
    #[serde(default = "default_compress_timeout_secs")]
    pub compress_timeout_secs: u64,

    #[serde(default)]
    pub symlink_path: Option<PathBuf>,
}

fn default_time_slice_format() -> String {
    DEFAULT_TIME_SLICE_FORMAT.to_string()
}

fn default_localtime() -> bool {
    true
}

fn default_compress_timeout_secs() -> u64 {
    300
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            time_format: None,
            time_slice_format: default_time_slice_format(),
            localtime: default_localtime(),
            compress: None,
            compress_command: None,
            compress_timeout_secs: default_compress_timeout_secs(),
            symlink_path: None,
        }
    }
}

/// Validated, immutable configuration shared by every write.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub template: PathTemplate,
    pub sinks: SinkFactory,
    pub formatter: RecordFormatter,
    pub slicer: TimeSlicer,
    pub symlink_path: Option<PathBuf>,
}

impl FileOutputConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn compression(&self) -> Result<CompressionMode, ConfigError> {
        match self.compress.as_deref() {
            None => Ok(CompressionMode::None),
            Some(name) => name.parse(),
        }
    }

    /// Where the upstream buffer keeps pending chunks unless told
    /// otherwise.
    pub fn buffer_path(&self) -> Option<String> {
        let path = self.path.as_deref()?;
        if path.contains(WILDCARD) {
            Some(path.to_string())
        } else {
            Some(format!("{path}.{WILDCARD}"))
        }
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let path = match self.path.as_deref() {
            Some(path) if !path.is_empty() => absolute(path)?,
            _ => return Err(ConfigError::MissingPath),
        };

        let mode = self.compression()?;
        let mut dispatcher = CompressionDispatcher::new()
            .with_timeout(Duration::from_secs(self.compress_timeout_secs));
        if let Some(command) = &self.compress_command {
            dispatcher = dispatcher.with_command(command.clone());
        }
        let sinks = dispatcher.resolve(mode)?;

        let policy = TimeZonePolicy::from_localtime(self.localtime);
        let offset = policy.offset();
        let slicer = TimeSlicer::with_offset(&self.time_slice_format, offset)?;
        let formatter = RecordFormatter::with_offset(self.time_format.as_deref(), offset)?;
        let template = PathTemplate::parse(&path, &slicer)?;

        log::info!(
            "file output: template {}, compression {}, slices {}",
            template,
            mode,
            self.time_slice_format
        );

        Ok(ResolvedConfig {
            template,
            sinks,
            formatter,
            slicer,
            symlink_path: self.symlink_path.clone(),
        })
    }
}

fn absolute(path: &str) -> Result<String, ConfigError> {
    if Path::new(path).is_absolute() {
        return Ok(path.to_string());
    }
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })?;
    Ok(cwd.join(path).to_string_lossy().into_owned())
}
