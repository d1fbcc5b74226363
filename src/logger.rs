use log::{error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::OsaError;

/// Buffered JSONL record log.
///
/// Records are appended as one JSON object per line whenever the buffer
/// fills. A flush that fails is retried on the next flush; only a run of
/// `max_flush_failures` consecutive failures is reported as an error.
#[derive(Debug)]
pub struct Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    buffer: Vec<T>,
    buffer_size: usize,
    file_path: PathBuf,
    final_format_json: bool, // rewrite as a JSON array in finalize_as_json
    flush_failures: usize,
    max_flush_failures: usize,
    finalized: bool,
}

impl<T> Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(file_path: P, buffer_size: usize, final_format_json: bool) -> Self {
        let mut path = file_path.into();
        let extension = if final_format_json { "json" } else { "jsonl" };
        if path.extension() != Some(std::ffi::OsStr::new(extension)) {
            path.set_extension(extension);
        }

        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            file_path: path,
            final_format_json,
            flush_failures: 0,
            max_flush_failures: 10,
            finalized: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn add(&mut self, record: T) -> Result<(), OsaError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn write_buffer(&self) -> Result<(), OsaError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for record in &self.buffer {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OsaError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        match self.write_buffer() {
            Ok(()) => {
                self.flush_failures = 0;
                self.buffer.clear();
                Ok(())
            }
            Err(e) => {
                self.flush_failures += 1;
                error!(
                    "Flush failure {}/{} for {:?}: {e}",
                    self.flush_failures, self.max_flush_failures, self.file_path
                );
                if self.flush_failures >= self.max_flush_failures {
                    return Err(e);
                }
                if self.flush_failures % 3 == 0 {
                    warn!("Acquisition log keeps failing to flush, records are being held in memory");
                }
                Ok(())
            }
        }
    }

    /// Rewrite the JSONL file as a pretty JSON array
    pub fn finalize_as_json(&mut self) -> Result<(), OsaError> {
        self.flush()?;
        if !self.final_format_json || self.finalized || !self.file_path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path)?;
        let records = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<T>)
            .collect::<Result<Vec<_>, _>>()?;

        std::fs::write(&self.file_path, serde_json::to_string_pretty(&records)?)?;
        self.finalized = true;
        info!("Converted {} records from JSONL to JSON format", records.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> Drop for Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        let _ = self.finalize_as_json();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        attempt: u32,
        note: String,
    }

    fn entry(attempt: u32) -> Entry {
        Entry {
            attempt,
            note: format!("attempt {attempt}"),
        }
    }

    #[test]
    fn test_jsonl_flush_on_buffer_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = Logger::new(dir.path().join("history"), 2, false);
        assert_eq!(logger.path(), dir.path().join("history.jsonl"));

        logger.add(entry(1)).unwrap();
        assert_eq!(logger.len(), 1);
        assert!(!logger.path().exists());

        logger.add(entry(2)).unwrap();
        assert!(logger.is_empty());

        let content = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(
            serde_json::from_str::<Entry>(content.lines().next().unwrap()).unwrap(),
            entry(1)
        );
    }

    #[test]
    fn test_finalize_as_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let mut logger = Logger::new(&path, 10, true);
            logger.add(entry(1)).unwrap();
            logger.add(entry(2)).unwrap();
            logger.add(entry(3)).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<Entry> = serde_json::from_str(&content).unwrap();
        assert_eq!(records, vec![entry(1), entry(2), entry(3)]);
    }

    #[test]
    fn test_finalize_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = Logger::new(dir.path().join("history"), 10, true);
        logger.add(entry(1)).unwrap();
        logger.finalize_as_json().unwrap();
        logger.finalize_as_json().unwrap();

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let records: Vec<Entry> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 1);
    }
}
