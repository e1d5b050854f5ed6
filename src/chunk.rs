//! The boundary between the upstream buffer and the file sink.

use std::io::{self, Write};

/// A flushable batch of serialized records for one time bucket.
///
/// Implementations are owned by the buffering layer; the sink only reads
/// them during a single streaming pass.
pub trait Chunk {
    /// Bucket key identifying the chunk's time slice.
    fn key(&self) -> &str;

    /// Streams every buffered byte into `sink`, in full, once per call.
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()>;
}

/// Heap-backed chunk.
#[derive(Debug, Clone, Default)]
pub struct MemoryChunk {
    key: String,
    data: Vec<u8>,
}

impl MemoryChunk {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: Vec::new(),
        }
    }

    pub fn with_data(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }

    pub fn push(&mut self, line: &str) {
        self.data.extend_from_slice(line.as_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Chunk for MemoryChunk {
    fn key(&self) -> &str {
        &self.key
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(&self.data)
    }
}
