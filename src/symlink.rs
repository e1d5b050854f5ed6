use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Keeps a fixed-location symlink pointing at the latest written file.
#[derive(Debug, Clone)]
pub struct SymlinkMaintainer {
    link: PathBuf,
}

impl SymlinkMaintainer {
    pub fn new(link: impl Into<PathBuf>) -> Self {
        Self { link: link.into() }
    }

    pub fn link(&self) -> &Path {
        &self.link
    }

    /// Best effort: failures are logged, never returned.
    pub fn update(&self, target: &Path) {
        match self.try_update(target) {
            Ok(()) => log::debug!("{} -> {}", self.link.display(), target.display()),
            Err(err) => log::warn!(
                "failed to point symlink {} at {}: {}",
                self.link.display(),
                target.display(),
                err
            ),
        }
    }

    /// Creates the new link beside the old one and renames it into place,
    /// so the link always resolves to either the old or the new target.
    pub fn try_update(&self, target: &Path) -> io::Result<()> {
        let tmp = tmp_link_path(&self.link)?;
        let _ = fs::remove_file(&tmp);
        std::os::unix::fs::symlink(target, &tmp)?;
        if let Err(err) = fs::rename(&tmp, &self.link) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }
}

fn tmp_link_path(link: &Path) -> io::Result<PathBuf> {
    let name = link
        .file_name()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("symlink path {} has no file name", link.display()),
            )
        })?
        .to_string_lossy();
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    Ok(link.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id())))
}
