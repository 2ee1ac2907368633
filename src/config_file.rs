use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const PROJECT_CONFIG_NAME: &str = ".loglakerc";

/// Default arguments read from `.loglakerc` / `config.ini`
#[derive(Debug, Default)]
pub struct ConfigFile {
    pub defaults: Option<String>,
    pub source: Option<PathBuf>,
}

impl ConfigFile {
    /// Walk up from the working directory looking for `.loglakerc`
    pub fn find_project_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_config_from(&current)
    }

    fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let config_path = current.join(PROJECT_CONFIG_NAME);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// User config locations in order of preference
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("loglake").join("config.ini"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(PROJECT_CONFIG_NAME));
        }
        paths
    }

    /// Project config first, then the first user config that exists
    pub fn find_config_path() -> Option<PathBuf> {
        Self::find_project_config()
            .or_else(|| Self::get_user_config_paths().into_iter().find(|p| p.is_file()))
    }

    pub fn load() -> Result<Self> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_with_custom_path(custom_path: Option<&str>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(Path::new(path)),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse_ini_content(&content);
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Only the root-level `defaults` key is understood; sections and other keys are ignored.
    fn parse_ini_content(content: &str) -> Self {
        let mut defaults = None;
        let mut in_section = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_section = true;
                continue;
            }
            if in_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if key.trim() == "defaults" {
                    defaults = Some(value.trim().to_string());
                }
            }
        }

        Self {
            defaults,
            source: None,
        }
    }

    /// Insert the configured defaults after the program name so explicit flags win
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>> {
        let Some(defaults) = &self.defaults else {
            return Ok(args);
        };

        let default_args = shell_words::split(defaults)
            .context("Invalid defaults: failed to parse arguments")?;

        let mut args = args.into_iter();
        let mut result: Vec<String> = args.next().into_iter().collect();
        result.extend(default_args);
        result.extend(args);
        Ok(result)
    }

    pub fn show_config() {
        println!("Configuration precedence: CLI > project .loglakerc > user config > built-in defaults\n");

        match Self::load() {
            Ok(config) => match (&config.source, &config.defaults) {
                (Some(source), Some(defaults)) => {
                    println!("Configuration loaded from: {}", source.display());
                    println!("\nActive defaults:");
                    println!("  defaults = {}", defaults);
                }
                (Some(source), None) => {
                    println!("Configuration loaded from: {}", source.display());
                    println!("\nNo defaults key set.");
                }
                _ => println!("No configuration files found. Using built-in defaults."),
            },
            Err(e) => eprintln!("Error loading configuration: {}", e),
        }

        println!("\nConfiguration search locations (in precedence order):");
        match Self::find_project_config() {
            Some(path) => println!("  1. Project: {} (found)", path.display()),
            None => println!("  1. Project: .loglakerc (searched up directory tree, not found)"),
        }
        for (i, path) in Self::get_user_config_paths().iter().enumerate() {
            let status = if path.is_file() { "(found)" } else { "(not found)" };
            println!("  {}. User: {} {}", i + 2, path.display(), status);
        }

        println!("\nExample configuration file (.loglakerc):");
        println!();
        println!("defaults = --chunk-size 50000 --partition-field status --stats");
    }
}
