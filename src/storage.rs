//! CSV sample persistence.
//!
//! One row per sample, flushed as soon as it is written: killing the
//! process after point N must leave samples `0..N` on disk. Files open in
//! append mode so a resumed run concatenates under the existing header;
//! the header is written only when the file is new or empty.
//!
//! Resume correctness for spatial scans depends on row K holding sequence
//! index K. [`CsvSink::truncate_rows`] drops any stale rows at or past the
//! restart index before the run appends fresh ones.

use crate::error::{AppResult, MapperError};
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// An append-only, flush-per-row CSV sink.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Open `path` for appending, writing `header` first if the file is new
    /// or empty.
    pub fn open_append(path: &Path, header: &[&str]) -> AppResult<Self> {
        let fresh = data_rows(path)? == 0 && !has_header(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                MapperError::OutputSink(format!("cannot open '{}': {e}", path.display()))
            })?;
        let mut writer = csv::Writer::from_writer(file);
        if fresh {
            writer.write_record(header)?;
            writer.flush()?;
            info!("Created output file '{}'", path.display());
        } else {
            info!("Appending to existing '{}'", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Append one row and flush it to disk.
    pub fn append(&mut self, fields: &[String]) -> AppResult<()> {
        self.writer.write_record(fields)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Number of data rows (excluding the header) currently in `path`.
/// A missing file counts as zero rows.
pub fn data_rows(path: &Path) -> AppResult<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    let lines = reader.lines().count();
    Ok(lines.saturating_sub(1))
}

/// Rewrite `path` keeping the header and the first `keep` data rows.
pub fn truncate_rows(path: &Path, keep: usize) -> AppResult<()> {
    let content = std::fs::read_to_string(path)?;
    let kept: Vec<&str> = content.lines().take(keep + 1).collect();
    let mut out = kept.join("\n");
    out.push('\n');
    std::fs::write(path, out)?;
    info!(
        "Truncated '{}' to {} data rows for resume",
        path.display(),
        keep
    );
    Ok(())
}

fn has_header(path: &Path) -> AppResult<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;
    Ok(!first_line.trim().is_empty())
}
