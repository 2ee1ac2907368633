use std::fmt;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::decompression::{Compression, DecompressionReader};
use crate::error::{PipelineError, Result};
use crate::stats::{stats_add_file_matched, stats_add_line_read};

/// 256KB read buffer per open file, same as the multi-file reader default
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Where a line came from, for error messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOrigin {
    pub path: Arc<Path>,
    pub line_number: usize,
}

impl fmt::Display for LineOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line_number)
    }
}

/// One physical input line.
///
/// `raw` holds the bytes exactly as read, terminator included. `text` is the
/// decoded line without `\n` or `\r\n`, with invalid UTF-8 replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub raw: Vec<u8>,
    pub origin: LineOrigin,
}

impl SourceLine {
    pub fn new(raw: Vec<u8>, origin: LineOrigin) -> Self {
        let mut end = raw.len();
        if end > 0 && raw[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
        // Access logs routinely carry stray non-UTF-8 bytes in user agents
        let text = String::from_utf8_lossy(&raw[..end]).into_owned();
        Self { text, raw, origin }
    }
}

/// List every file under `directory` (recursively) whose name matches `pattern`.
///
/// Results are sorted so that repeated runs see files in the same order.
/// A pattern that matches nothing yields an empty list.
pub fn discover_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&directory.to_string_lossy());
    let full_pattern = format!("{}/**/{}", root.trim_end_matches('/'), pattern);

    let entries = glob::glob(&full_pattern).map_err(|e| PipelineError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::Io {
            path: e.path().to_path_buf(),
            source: io::Error::new(e.error().kind(), e.error().to_string()),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Open the matched files of `directory`/`pattern` as one lazy line sequence.
pub fn read(directory: &Path, pattern: &str) -> Result<LineReader> {
    let files = discover_files(directory, pattern)?;
    debug!(directory = %directory.display(), pattern, files = files.len(), "discovered input files");
    Ok(LineReader::new(files))
}

struct OpenFile {
    path: Arc<Path>,
    compression: Compression,
    reader: DecompressionReader,
    line_number: usize,
}

/// Streams lines through a list of files, one file handle open at a time.
///
/// The current handle is dropped as soon as its file is exhausted, and
/// dropping the reader early releases it too. After the first error the
/// iterator is finished.
pub struct LineReader {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    buffer: Vec<u8>,
    buffer_size: usize,
    finished: bool,
}

impl LineReader {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self::with_buffer_size(files, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(files: Vec<PathBuf>, buffer_size: usize) -> Self {
        Self {
            files: files.into_iter(),
            current: None,
            buffer: Vec::new(),
            buffer_size,
            finished: false,
        }
    }

    /// Path of the file currently being read, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|f| f.path.as_ref())
    }

    fn open_next(&mut self) -> Option<Result<()>> {
        let path = self.files.next()?;
        match DecompressionReader::open(&path, self.buffer_size) {
            Ok(reader) => {
                stats_add_file_matched();
                debug!(path = %path.display(), compression = ?reader.compression(), "opened input file");
                self.current = Some(OpenFile {
                    path: Arc::from(path.as_path()),
                    compression: reader.compression(),
                    reader,
                    line_number: 0,
                });
                Some(Ok(()))
            }
            Err(source) => Some(Err(PipelineError::Io { path, source })),
        }
    }
}

impl Iterator for LineReader {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if self.current.is_none() {
                match self.open_next() {
                    None => {
                        self.finished = true;
                        return None;
                    }
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }

            let file = self.current.as_mut()?;
            self.buffer.clear();
            match file.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    // EOF on current file, release the handle and advance
                    self.current = None;
                    continue;
                }
                Ok(_) => {
                    file.line_number += 1;
                    stats_add_line_read();
                    let origin = LineOrigin {
                        path: Arc::clone(&file.path),
                        line_number: file.line_number,
                    };
                    return Some(Ok(SourceLine::new(std::mem::take(&mut self.buffer), origin)));
                }
                Err(source) => {
                    self.finished = true;
                    let path = file.path.to_path_buf();
                    let line = file.line_number + 1;
                    let err = match file.compression {
                        Compression::Plain => PipelineError::Io { path, source },
                        _ => PipelineError::Decompression { path, line, source },
                    };
                    self.current = None;
                    return Some(Err(err));
                }
            }
        }
    }
}
