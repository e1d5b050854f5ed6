use std::fs;

use bucketfile::{ChunkWriter, FileOutputConfig, MemoryChunk};
use tempfile::tempdir;

#[test]
fn symlink_follows_latest_write() {
    let dir = tempdir().expect("tempdir");
    let link = dir.path().join("current.log");
    let mut config = FileOutputConfig::new(dir.path().join("app.*.log").to_str().expect("utf8 path"));
    config.symlink_path = Some(link.clone());
    config.localtime = false;
    let writer = ChunkWriter::from_config(&config.resolve().expect("resolve"));

    let first = writer
        .write(&MemoryChunk::with_data("20240615", "first"))
        .expect("first");
    assert_eq!(fs::read_link(&link).expect("link"), first);

    let second = writer
        .write(&MemoryChunk::with_data("20240616", "second"))
        .expect("second");
    assert_eq!(fs::read_link(&link).expect("link"), second);
    assert_eq!(fs::read(&link).expect("read via link"), b"second");
}

#[test]
fn broken_symlink_location_does_not_fail_writes() {
    let dir = tempdir().expect("tempdir");
    let mut config = FileOutputConfig::new(dir.path().join("app.*.log").to_str().expect("utf8 path"));
    config.symlink_path = Some(dir.path().join("no-such-dir/current.log"));
    config.localtime = false;
    let writer = ChunkWriter::from_config(&config.resolve().expect("resolve"));

    let path = writer
        .write(&MemoryChunk::with_data("k", "data"))
        .expect("write");
    assert_eq!(fs::read(&path).expect("read"), b"data");
}
