//! Compression modes and the sink strategy each one resolves to.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, WriteError};
use crate::sink::{deadline_after, wait_until, ChunkSink, FileSink, ProcessSink};

pub const DEFAULT_COMPRESS_TIMEOUT: Duration = Duration::from_secs(300);
/// Upper bound on the startup `-V` check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMode {
    #[default]
    None,
    Gzip,
    Lzop,
}

/// Everything a mode implies, fixed at compile time.
#[derive(Debug, PartialEq, Eq)]
pub struct Codec {
    pub mode: CompressionMode,
    /// Accepted configuration spellings.
    pub names: &'static [&'static str],
    /// Executable looked up on `PATH`; empty for `None`.
    pub executable: &'static str,
    /// Appended to the file name, including the leading dot.
    pub suffix: &'static str,
}

static CODECS: [Codec; 3] = [
    Codec {
        mode: CompressionMode::None,
        names: &["none"],
        executable: "",
        suffix: "",
    },
    Codec {
        mode: CompressionMode::Gzip,
        names: &["gz", "gzip"],
        executable: "gzip",
        suffix: ".gz",
    },
    Codec {
        mode: CompressionMode::Lzop,
        names: &["lzop"],
        executable: "lzop",
        suffix: ".lzo",
    },
];

impl CompressionMode {
    pub fn codec(self) -> &'static Codec {
        match self {
            CompressionMode::None => &CODECS[0],
            CompressionMode::Gzip => &CODECS[1],
            CompressionMode::Lzop => &CODECS[2],
        }
    }

    pub fn suffix(self) -> &'static str {
        self.codec().suffix
    }
}

impl FromStr for CompressionMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CODECS
            .iter()
            .find(|codec| codec.names.contains(&value))
            .map(|codec| codec.mode)
            .ok_or_else(|| ConfigError::UnsupportedCompression(value.to_string()))
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec().names[self.codec().names.len() - 1])
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Direct,
    Process { executable: String, timeout: Duration },
}

/// Opens sinks for one resolved mode. Cheap to clone and share across
/// flush threads.
#[derive(Debug, Clone)]
pub struct SinkFactory {
    codec: &'static Codec,
    strategy: Strategy,
}

impl SinkFactory {
    pub fn direct() -> Self {
        Self {
            codec: CompressionMode::None.codec(),
            strategy: Strategy::Direct,
        }
    }

    pub fn mode(&self) -> CompressionMode {
        self.codec.mode
    }

    pub fn suffix(&self) -> &'static str {
        self.codec.suffix
    }

    /// Claims `path` exclusively and returns a sink writing to it.
    pub fn open(&self, path: &Path) -> Result<Box<dyn ChunkSink>, WriteError> {
        match &self.strategy {
            Strategy::Direct => Ok(Box::new(FileSink::create(path)?)),
            Strategy::Process {
                executable,
                timeout,
            } => Ok(Box::new(ProcessSink::spawn(executable, path, *timeout)?)),
        }
    }
}

/// Turns a configured mode into a `SinkFactory`, verifying compressors
/// up front.
#[derive(Debug, Clone)]
pub struct CompressionDispatcher {
    timeout: Duration,
    command: Option<String>,
}

impl Default for CompressionDispatcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMPRESS_TIMEOUT,
            command: None,
        }
    }
}

impl CompressionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the mode's default executable. Ignored for `None`.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn resolve(&self, mode: CompressionMode) -> Result<SinkFactory, ConfigError> {
        let codec = mode.codec();
        if mode == CompressionMode::None {
            return Ok(SinkFactory::direct());
        }

        let executable = self
            .command
            .clone()
            .unwrap_or_else(|| codec.executable.to_string());
        check_executable(&executable, self.timeout.min(CHECK_TIMEOUT))?;
        log::debug!("compressing {} output with {}", mode, executable);

        Ok(SinkFactory {
            codec,
            strategy: Strategy::Process {
                executable,
                timeout: self.timeout,
            },
        })
    }
}

/// Runs `<executable> -V`. Only a failure to start it, or no exit within
/// `bound`, counts; a non-zero exit still proves it is on `PATH`.
fn check_executable(executable: &str, bound: Duration) -> Result<(), ConfigError> {
    let unavailable = |source| ConfigError::CompressorUnavailable {
        executable: executable.to_string(),
        source,
    };
    let mut child = Command::new(executable)
        .arg("-V")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(unavailable)?;

    match wait_until(deadline_after(bound), || child.try_wait()).map_err(unavailable)? {
        Some(status) if !status.success() => {
            log::warn!("'{executable} -V' exited with {status}");
        }
        Some(_) => {}
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(unavailable(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("'-V' did not exit within {}ms", bound.as_millis()),
            )));
        }
    }
    Ok(())
}
