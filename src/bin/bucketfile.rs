use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use bucketfile::{Chunk, ChunkWriter, FileOutputConfig, MemoryChunk};

#[derive(Parser, Debug)]
#[command(name = "bucketfile")]
#[command(about = "Slice JSON-lines records into time buckets and flush each bucket to its own file")]
struct Cli {
    /// JSON config file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output path template (e.g. /var/log/app/buffer.*.log)
    #[arg(long)]
    path: Option<String>,

    /// Compression: gz, gzip, lzop or none
    #[arg(long)]
    compress: Option<String>,

    /// Compressor executable overriding the mode default
    #[arg(long)]
    compress_command: Option<String>,

    /// Symlink repointed at the newest file after each write
    #[arg(long)]
    symlink_path: Option<PathBuf>,

    /// Bucket key format (time format description)
    #[arg(long)]
    time_slice_format: Option<String>,

    /// Record timestamp format (time format description)
    #[arg(long)]
    time_format: Option<String>,

    /// Render and slice timestamps in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Input file of JSON lines (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct InputRecord {
    tag: String,
    /// Unix seconds.
    time: i64,
    #[serde(default)]
    record: Map<String, Value>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FileOutputConfig::load(path)?,
        None => FileOutputConfig::default(),
    };
    if cli.path.is_some() {
        config.path = cli.path.clone();
    }
    if cli.compress.is_some() {
        config.compress = cli.compress.clone();
    }
    if cli.compress_command.is_some() {
        config.compress_command = cli.compress_command.clone();
    }
    if cli.symlink_path.is_some() {
        config.symlink_path = cli.symlink_path.clone();
    }
    if let Some(format) = &cli.time_slice_format {
        config.time_slice_format = format.clone();
    }
    if cli.time_format.is_some() {
        config.time_format = cli.time_format.clone();
    }
    if cli.utc {
        config.localtime = false;
    }

    let resolved = config.resolve().context("invalid file output configuration")?;
    let writer = ChunkWriter::from_config(&resolved);

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("open input {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut chunks: BTreeMap<String, MemoryChunk> = BTreeMap::new();
    let mut records = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let input: InputRecord = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(err) => {
                warn!("skipping line {}: {}", lineno + 1, err);
                continue;
            }
        };
        let time = match OffsetDateTime::from_unix_timestamp(input.time) {
            Ok(time) => time,
            Err(err) => {
                warn!("skipping line {}: {}", lineno + 1, err);
                continue;
            }
        };

        let key = resolved.slicer.key_for(time)?;
        let formatted = resolved
            .formatter
            .format(&input.tag, time, &input.record)?;
        chunks
            .entry(key.clone())
            .or_insert_with(|| MemoryChunk::new(key))
            .push(&formatted);
        records += 1;
    }

    info!("{} records in {} buckets", records, chunks.len());
    for chunk in chunks.values() {
        let path = writer
            .write(chunk)
            .with_context(|| format!("flush bucket {}", chunk.key()))?;
        println!("{}", path.display());
    }

    Ok(())
}
