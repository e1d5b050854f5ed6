//! Destinations a chunk is streamed into.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::WriteError;

mod process;

pub(crate) use process::{deadline_after, wait_until};
pub use process::ProcessSink;

/// Mode of every file the sink creates, before umask.
pub const FILE_PERMISSION: u32 = 0o644;

/// A byte destination for one chunk. `finish` must be called for the
/// write to count as complete.
pub trait ChunkSink: Write + Send {
    fn finish(self: Box<Self>) -> Result<(), WriteError>;

    /// Releases the sink after streaming failed with `err`, returning the
    /// error the write reports.
    fn abort(self: Box<Self>, err: io::Error) -> WriteError {
        WriteError::Io(err)
    }

    fn describe(&self) -> String;
}

/// Claims `path` with an exclusive create. Fails with `AlreadyExists`
/// (see `WriteError::is_collision`) if anything is already there.
pub(crate) fn create_exclusive(path: &Path, append: bool) -> Result<File, WriteError> {
    OpenOptions::new()
        .write(true)
        .append(append)
        .create_new(true)
        .mode(FILE_PERMISSION)
        .open(path)
        .map_err(|source| WriteError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Uncompressed output straight to the destination file.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self, WriteError> {
        let file = create_exclusive(path, true)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl ChunkSink for FileSink {
    fn finish(self: Box<Self>) -> Result<(), WriteError> {
        let file = self.writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn file_sink_writes_bytes_verbatim() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out.log");

        let mut sink: Box<dyn ChunkSink> = Box::new(FileSink::create(&path).expect("create"));
        sink.write_all(b"one\n").expect("write");
        sink.write_all(b"two\n").expect("write");
        sink.finish().expect("finish");

        assert_eq!(std::fs::read(&path).expect("read"), b"one\ntwo\n");
    }

    #[test]
    fn file_sink_refuses_existing_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("taken.log");
        std::fs::write(&path, b"keep").expect("seed");

        let err = FileSink::create(&path).err().expect("must fail");
        assert!(err.is_collision());
        assert_eq!(std::fs::read(&path).expect("read"), b"keep");
    }

    #[test]
    fn created_files_are_not_group_or_world_writable() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("mode.log");
        Box::new(FileSink::create(&path).expect("create"))
            .finish()
            .expect("finish");

        let mode = std::fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o022, 0);
        assert_eq!(mode & 0o600, 0o600);
    }
}
