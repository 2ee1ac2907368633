// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

use loglake::config::PipelineConfig;

pub const LINE_200: &str = r#"10.0.0.1 - - [22/Jan/2019:03:56:14 +0330] "GET /index.html HTTP/1.1" 200 512 "-" "Mozilla/5.0""#;
pub const LINE_404: &str = r#"10.0.0.2 - - [22/Jan/2019:03:56:16 +0330] "GET /missing HTTP/1.1" 404 - "http://example.com/" "curl/7.68.0""#;
pub const MALFORMED: &str = "garbage line";

pub const SIDE_FILE: &str = "client,hostname\n10.0.0.1,alpha\n10.0.0.2,beta\n";

/// A scratch workspace with `logs/`, a side file and output locations
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("logs")).expect("Failed to create logs dir");
        let ws = Self { dir };
        ws.write_side_file(SIDE_FILE);
        ws
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn logs(&self) -> PathBuf {
        self.path().join("logs")
    }

    pub fn side_file(&self) -> PathBuf {
        self.path().join("hosts.csv")
    }

    pub fn lake(&self) -> PathBuf {
        self.path().join("lake")
    }

    pub fn error_file(&self) -> PathBuf {
        self.path().join("errors").join("incorrect_data.txt")
    }

    pub fn warehouse(&self) -> PathBuf {
        self.path().join("warehouse")
    }

    pub fn write_side_file(&self, contents: &str) {
        std::fs::write(self.side_file(), contents).expect("Failed to write side file");
    }

    pub fn write_log(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.logs().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create log subdir");
        }
        std::fs::write(&path, join_lines(lines)).expect("Failed to write log file");
        path
    }

    pub fn write_gz_log(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.logs().join(name);
        let file = std::fs::File::create(&path).expect("Failed to create gz log");
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(join_lines(lines).as_bytes())
            .expect("Failed to write gz log");
        encoder.finish().expect("Failed to finish gz log");
        path
    }

    /// Library config pointing every location into this workspace
    pub fn config(&self, pattern: &str) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.logs(), pattern, self.side_file());
        config.output.destination_root = self.lake();
        config.error_file = self.error_file();
        config.warehouse.directory = self.warehouse();
        config
    }

    /// CLI arguments pointing every location into this workspace
    pub fn args(&self, pattern: &str) -> Vec<String> {
        vec![
            "--ignore-config".to_string(),
            "--log-dir".to_string(),
            self.logs().display().to_string(),
            "--log-pattern".to_string(),
            pattern.to_string(),
            "--hostname-file".to_string(),
            self.side_file().display().to_string(),
            "--output-dir".to_string(),
            self.lake().display().to_string(),
            "--error-file".to_string(),
            self.error_file().display().to_string(),
            "--warehouse-dir".to_string(),
            self.warehouse().display().to_string(),
        ]
    }

    pub fn error_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.error_file())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn join_lines(lines: &[&str]) -> String {
    let mut text = lines.join("\n");
    if !lines.is_empty() {
        text.push('\n');
    }
    text
}

/// Well-formed line for host `10.0.0.<n % 250>` with `bytes = n`
pub fn numbered_line(n: usize) -> String {
    format!(
        r#"10.0.0.{} - - [22/Jan/2019:03:56:14 +0330] "GET /item/{} HTTP/1.1" 200 {} "-" "bench""#,
        n % 250,
        n,
        n
    )
}

/// Run the loglake binary with given arguments from `cwd`
pub fn run_loglake(args: &[String], cwd: &Path) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_loglake"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute loglake");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}
