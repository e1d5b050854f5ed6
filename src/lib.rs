//! Durable file sink for time-bucketed chunks.
//!
//! A [`ChunkWriter`] drains one [`Chunk`] per call into a file whose name is
//! derived from the chunk's bucket key, optionally piping it through an
//! external compressor (`gzip`, `lzop`). Paths are never reused: each write
//! claims a fresh `_<ordinal>` name with an exclusive create, so concurrent
//! flushes of the same bucket cannot overwrite each other.
//!
//! ```rust,ignore
//! use bucketfile::{ChunkWriter, FileOutputConfig, MemoryChunk};
//!
//! let mut config = FileOutputConfig::new("/var/log/app/buffer.*.log");
//! config.compress = Some("gzip".to_string());
//! let writer = ChunkWriter::from_config(&config.resolve()?);
//!
//! let path = writer.write(&MemoryChunk::with_data("20240615", "..."))?;
//! // /var/log/app/buffer.20240615_0.log.gz
//! ```

pub mod chunk;
pub mod compress;
pub mod config;
pub mod error;
pub mod format;
pub mod layout;
pub mod sink;
pub mod slicer;
pub mod symlink;
pub mod writer;

pub use chunk::{Chunk, MemoryChunk};
pub use compress::{Codec, CompressionDispatcher, CompressionMode, SinkFactory};
pub use config::{FileOutputConfig, ResolvedConfig};
pub use error::{ConfigError, WriteError};
pub use format::{FormatError, RecordFormatter};
pub use layout::{Allocation, FsProbe, PathAllocator, PathProbe, PathTemplate};
pub use sink::{ChunkSink, FileSink, ProcessSink};
pub use slicer::{TimeSlicer, TimeZonePolicy};
pub use symlink::SymlinkMaintainer;
pub use writer::ChunkWriter;
