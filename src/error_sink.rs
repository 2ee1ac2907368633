use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Append-only file receiving the raw bytes of every line the grammar rejects.
#[derive(Debug)]
pub struct ErrorSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines_written: usize,
}

impl ErrorSink {
    /// Open (creating parent directories as needed) for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let to_err = |source| PipelineError::ErrorSink {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(to_err)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            lines_written: 0,
        })
    }

    /// Append `raw` unchanged. A final line without a terminator gets `\n`.
    pub fn record(&mut self, raw: &[u8]) -> Result<()> {
        let terminated = raw.ends_with(b"\n");
        self.writer
            .write_all(raw)
            .and_then(|_| {
                if terminated {
                    Ok(())
                } else {
                    self.writer.write_all(b"\n")
                }
            })
            .map_err(|source| PipelineError::ErrorSink {
                path: self.path.clone(),
                source,
            })?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| PipelineError::ErrorSink {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended through this handle
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_parent_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors/incorrect_data.txt");

        let mut sink = ErrorSink::open(&path).unwrap();
        sink.record(b"garbage line\n").unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sink = ErrorSink::open(&path).unwrap();
        sink.record(b"another one").unwrap();
        assert_eq!(sink.lines_written(), 1);
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "garbage line\nanother one\n");
    }

    #[test]
    fn test_bytes_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.txt");

        let mut sink = ErrorSink::open(&path).unwrap();
        sink.record(b"bad \xff\xfe line\r\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"bad \xff\xfe line\r\n".to_vec());
    }

    #[test]
    fn test_unwritable_location() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let result = ErrorSink::open(blocker.join("errors.txt"));
        assert!(matches!(result, Err(PipelineError::ErrorSink { .. })));
    }
}
