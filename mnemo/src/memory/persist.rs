//! File helpers shared by the staging area and the committed store.
//!
//! Snapshots are written to a sibling `.tmp` file and renamed over the target.
//! Journals are JSONL: one JSON value per line, flushed line by line.
//! Every helper opens and closes its own handle; nothing is kept open between calls.

use crate::memory::error::MemoryError;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub(crate) fn ensure_dir(root: &Path) -> Result<(), MemoryError> {
    fs::create_dir_all(root)
        .map_err(|e| MemoryError::io(format!("create directory {}", root.display()), e))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` compactly and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), MemoryError> {
    let data = serde_json::to_vec(value)?;
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = tmp_path_for(path);
    {
        let mut f = File::create(&tmp)
            .map_err(|e| MemoryError::io(format!("create {}", tmp.display()), e))?;
        f.write_all(&data)
            .map_err(|e| MemoryError::io(format!("write {}", tmp.display()), e))?;
        f.sync_all()
            .map_err(|e| MemoryError::io(format!("sync {}", tmp.display()), e))?;
    }
    fs::rename(&tmp, path)
        .map_err(|e| MemoryError::io(format!("rename {} over {}", tmp.display(), path.display()), e))?;
    // Flush the directory entry where the platform allows it.
    if let Some(dir) = path.parent() {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            log::debug!("[Memory] Directory sync of {} skipped: {}", dir.display(), e);
        }
    }
    Ok(())
}

/// Append one compact JSON line per item, flushing after each line.
pub(crate) fn append_json_lines<'a, T, I>(path: &Path, items: I) -> Result<usize, MemoryError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| MemoryError::io(format!("open {} for append", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for item in items {
        let line = serde_json::to_string(item)?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| MemoryError::io(format!("append {}", path.display()), e))?;
        written += 1;
    }
    Ok(written)
}

/// Read a whole file, returning `None` when it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, MemoryError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MemoryError::io(format!("read {}", path.display()), e)),
    }
}

/// Non-empty lines of a journal with their 1-based line numbers. Missing file → empty.
pub(crate) fn read_journal_lines(path: &Path) -> Result<Vec<(usize, String)>, MemoryError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MemoryError::io(format!("open {}", path.display()), e)),
    };
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MemoryError::io(format!("read {}", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push((idx + 1, line));
    }
    Ok(lines)
}

pub(crate) fn truncate(path: &Path) -> Result<(), MemoryError> {
    File::create(path)
        .map(|_| ())
        .map_err(|e| MemoryError::io(format!("truncate {}", path.display()), e))
}
