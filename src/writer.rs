//! One flush: allocate, create directories, stream, finalize.

use std::path::{Path, PathBuf};

use crate::chunk::Chunk;
use crate::compress::SinkFactory;
use crate::config::ResolvedConfig;
use crate::error::WriteError;
use crate::layout::PathAllocator;
use crate::symlink::SymlinkMaintainer;

/// Writes chunks to uniquely named files.
///
/// Holds no mutable state, so one writer can serve many flush threads.
/// Two writes for the same key never share a path: the sink claims the
/// allocated path with an exclusive create, and losing that race resumes
/// probing at the next ordinal.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    allocator: PathAllocator,
    sinks: SinkFactory,
    symlink: Option<SymlinkMaintainer>,
}

impl ChunkWriter {
    pub fn new(allocator: PathAllocator, sinks: SinkFactory) -> Self {
        Self {
            allocator,
            sinks,
            symlink: None,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        let writer = Self::new(
            PathAllocator::new(config.template.clone()),
            config.sinks.clone(),
        );
        match &config.symlink_path {
            Some(link) => writer.with_symlink(SymlinkMaintainer::new(link)),
            None => writer,
        }
    }

    pub fn with_symlink(mut self, symlink: SymlinkMaintainer) -> Self {
        self.symlink = Some(symlink);
        self
    }

    pub fn allocator(&self) -> &PathAllocator {
        &self.allocator
    }

    /// Returns the realized path. A failure after the path was claimed
    /// leaves the partial file in place; later allocations skip it.
    pub fn write(&self, chunk: &dyn Chunk) -> Result<PathBuf, WriteError> {
        let key = chunk.key();
        let suffix = self.sinks.suffix();

        let mut start = 0;
        let (path, mut sink) = loop {
            let allocation = self.allocator.allocate_from(key, suffix, start)?;
            ensure_parent_dir(&allocation.path)?;
            match self.sinks.open(&allocation.path) {
                Ok(sink) => break (allocation.path, sink),
                Err(err) if err.is_collision() => {
                    log::debug!(
                        "{} claimed concurrently, probing past ordinal {}",
                        allocation.path.display(),
                        allocation.ordinal
                    );
                    start = allocation.ordinal + 1;
                }
                Err(err) => return Err(err),
            }
        };

        if let Err(err) = chunk.write_to(&mut sink) {
            return Err(sink.abort(err));
        }
        let description = sink.describe();
        sink.finish()?;
        log::debug!("flushed chunk {} via {}", key, description);

        if let Some(symlink) = &self.symlink {
            symlink.update(&path);
        }
        Ok(path)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), WriteError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };
    std::fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })
}
