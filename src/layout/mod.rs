//! Output path templates and collision-avoiding allocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::format_description::OwnedFormatItem;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{ConfigError, WriteError};
use crate::slicer::{parse_format, TimeSlicer};

pub const WILDCARD: char = '*';
pub const DEFAULT_SUFFIX: &str = ".log";
/// Upper bound on ordinals probed for one key.
pub const MAX_ORDINAL: u64 = 1 << 20;

const TIME_COMPONENT_OPEN: char = '[';

#[derive(Debug, Clone)]
pub enum PathTemplate {
    /// `prefix + key + "_" + ordinal + suffix`. Covers both the wildcard
    /// form and the bare path form (`path + "."`, `".log"`).
    Split { prefix: String, suffix: String },
    /// Time components rendered from the bucket key.
    Timed {
        raw: String,
        items: OwnedFormatItem,
        slicer: TimeSlicer,
    },
}

impl PathTemplate {
    /// A `*` always selects the wildcard form, even if the path also
    /// contains `[`.
    pub fn parse(path: &str, slicer: &TimeSlicer) -> Result<Self, ConfigError> {
        if path.is_empty() {
            return Err(ConfigError::MissingPath);
        }
        if let Some(pos) = path.find(WILDCARD) {
            return Ok(PathTemplate::Split {
                prefix: path[..pos].to_string(),
                suffix: path[pos + WILDCARD.len_utf8()..].to_string(),
            });
        }
        if path.contains(TIME_COMPONENT_OPEN) {
            let items = parse_format(path)?;
            if has_component(&items) {
                // Keys parse to a PrimitiveDateTime, so offset components
                // could never render.
                let sample = OffsetDateTime::UNIX_EPOCH;
                PrimitiveDateTime::new(sample.date(), sample.time())
                    .format(&items)
                    .map_err(|err| ConfigError::InvalidTimeFormat {
                        format: path.to_string(),
                        reason: err.to_string(),
                    })?;
                return Ok(PathTemplate::Timed {
                    raw: path.to_string(),
                    items,
                    slicer: slicer.clone(),
                });
            }
            // Only escaped brackets: the template renders to one fixed
            // name, so the key is appended like a bare path.
            let literal = OffsetDateTime::UNIX_EPOCH.format(&items).map_err(|err| {
                ConfigError::InvalidTimeFormat {
                    format: path.to_string(),
                    reason: err.to_string(),
                }
            })?;
            return Ok(bare(&literal));
        }
        Ok(bare(path))
    }

    /// Returns `(head, suffix)` so that a candidate is
    /// `head + "_" + ordinal + suffix + compression_suffix`.
    pub fn stem(&self, key: &str) -> Result<(String, &str), WriteError> {
        match self {
            PathTemplate::Split { prefix, suffix } => Ok((format!("{prefix}{key}"), suffix)),
            PathTemplate::Timed { items, slicer, .. } => {
                let bucket = slicer.parse_key(key)?;
                let rendered = bucket.format(items).map_err(|err| WriteError::InvalidKey {
                    key: key.to_string(),
                    reason: err.to_string(),
                })?;
                Ok((rendered, DEFAULT_SUFFIX))
            }
        }
    }
}

fn bare(path: &str) -> PathTemplate {
    PathTemplate::Split {
        prefix: format!("{path}."),
        suffix: DEFAULT_SUFFIX.to_string(),
    }
}

fn has_component(item: &OwnedFormatItem) -> bool {
    match item {
        OwnedFormatItem::Literal(_) => false,
        OwnedFormatItem::Component(_) => true,
        OwnedFormatItem::Compound(items) | OwnedFormatItem::First(items) => {
            items.iter().any(has_component)
        }
        OwnedFormatItem::Optional(item) => has_component(item),
        _ => false,
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathTemplate::Split { prefix, suffix } => write!(f, "{prefix}{WILDCARD}{suffix}"),
            PathTemplate::Timed { raw, .. } => write!(f, "{raw}"),
        }
    }
}

/// Existence check used while probing ordinals.
pub trait PathProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Probes the real filesystem. Dangling symlinks count as occupied, the
/// same as an exclusive create would see them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub path: PathBuf,
    pub ordinal: u64,
}

/// Picks the first free candidate path for a key. Performs existence
/// checks only; claiming the path is the sink's exclusive create.
#[derive(Clone)]
pub struct PathAllocator {
    template: PathTemplate,
    probe: Arc<dyn PathProbe>,
}

impl fmt::Debug for PathAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathAllocator")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl PathAllocator {
    pub fn new(template: PathTemplate) -> Self {
        Self::with_probe(template, Arc::new(FsProbe))
    }

    pub fn with_probe(template: PathTemplate, probe: Arc<dyn PathProbe>) -> Self {
        Self { template, probe }
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn candidate(&self, key: &str, ordinal: u64, ext: &str) -> Result<PathBuf, WriteError> {
        let (head, suffix) = self.template.stem(key)?;
        Ok(PathBuf::from(format!("{head}_{ordinal}{suffix}{ext}")))
    }

    pub fn allocate(&self, key: &str, ext: &str) -> Result<Allocation, WriteError> {
        self.allocate_from(key, ext, 0)
    }

    /// Probes ordinals `start..MAX_ORDINAL`.
    pub fn allocate_from(&self, key: &str, ext: &str, start: u64) -> Result<Allocation, WriteError> {
        let (head, suffix) = self.template.stem(key)?;
        for ordinal in start..MAX_ORDINAL {
            let path = PathBuf::from(format!("{head}_{ordinal}{suffix}{ext}"));
            if !self.probe.exists(&path) {
                return Ok(Allocation { path, ordinal });
            }
        }
        Err(WriteError::OrdinalsExhausted {
            key: key.to_string(),
            attempts: MAX_ORDINAL.saturating_sub(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicer::DEFAULT_TIME_SLICE_FORMAT;
    use tempfile::tempdir;
    use time::UtcOffset;

    fn daily() -> TimeSlicer {
        TimeSlicer::with_offset(DEFAULT_TIME_SLICE_FORMAT, UtcOffset::UTC).expect("slicer")
    }

    fn template(path: &str) -> PathTemplate {
        PathTemplate::parse(path, &daily()).expect("template")
    }

    #[test]
    fn wildcard_splits_prefix_and_suffix() {
        let allocator = PathAllocator::new(template("/var/log/app/buffer.*.log"));
        let path = allocator.candidate("20240615", 0, "").expect("candidate");
        assert_eq!(path, PathBuf::from("/var/log/app/buffer.20240615_0.log"));
    }

    #[test]
    fn only_first_wildcard_splits() {
        let allocator = PathAllocator::new(template("/data/a*b*c"));
        let path = allocator.candidate("k", 2, ".gz").expect("candidate");
        assert_eq!(path, PathBuf::from("/data/ak_2b*c.gz"));
    }

    #[test]
    fn bare_path_derives_dot_and_log() {
        let allocator = PathAllocator::new(template("/var/log/app"));
        let path = allocator.candidate("20240615", 1, ".gz").expect("candidate");
        assert_eq!(path, PathBuf::from("/var/log/app.20240615_1.log.gz"));
    }

    #[test]
    fn timed_template_renders_key() {
        let allocator = PathAllocator::new(template("/var/log/[year]/[month]/[day]/app"));
        let path = allocator.candidate("20240615", 0, "").expect("candidate");
        assert_eq!(path, PathBuf::from("/var/log/2024/06/15/app_0.log"));
    }

    #[test]
    fn timed_template_without_components_appends_key() {
        // `[[` is an escaped bracket, leaving no time component.
        let allocator = PathAllocator::new(template("/var/log/[[app"));
        let (head, _) = allocator.template().stem("20240615").expect("stem");
        assert_eq!(head, "/var/log/[app.20240615");
    }

    #[test]
    fn offset_components_are_rejected_up_front() {
        let err = PathTemplate::parse("/var/log/[year]/[offset_hour]/app", &daily()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeFormat { .. }), "{err:?}");
    }

    #[test]
    fn timed_template_rejects_mismatched_key() {
        let allocator = PathAllocator::new(template("/var/log/[year]/app"));
        let err = allocator.allocate("not-a-date", "").unwrap_err();
        assert!(matches!(err, WriteError::InvalidKey { .. }));
    }

    #[test]
    fn empty_path_is_rejected() {
        let err = PathTemplate::parse("", &daily()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath));
    }

    #[test]
    fn allocate_skips_existing_ordinals() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("out.*.log");
        let allocator = PathAllocator::new(template(base.to_str().expect("utf8")));

        std::fs::write(dir.path().join("out.k_0.log"), b"x").expect("seed 0");
        std::fs::write(dir.path().join("out.k_1.log"), b"x").expect("seed 1");

        let allocation = allocator.allocate("k", "").expect("allocate");
        assert_eq!(allocation.ordinal, 2);
        assert_eq!(allocation.path, dir.path().join("out.k_2.log"));
        assert!(!allocation.path.exists(), "allocator must not create");
    }

    #[test]
    fn compression_suffix_is_part_of_the_probe() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path().join("out.*.log");
        let allocator = PathAllocator::new(template(base.to_str().expect("utf8")));

        std::fs::write(dir.path().join("out.k_0.log"), b"x").expect("seed");

        let allocation = allocator.allocate("k", ".gz").expect("allocate");
        assert_eq!(allocation.path, dir.path().join("out.k_0.log.gz"));
    }

    struct AlwaysTaken;

    impl PathProbe for AlwaysTaken {
        fn exists(&self, _path: &Path) -> bool {
            true
        }
    }

    #[test]
    fn exhausted_ordinals_are_an_error() {
        let allocator = PathAllocator::with_probe(template("/tmp/x.*"), Arc::new(AlwaysTaken));
        let err = allocator
            .allocate_from("k", "", MAX_ORDINAL - 3)
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::OrdinalsExhausted { attempts: 3, .. }
        ));
    }
}
