use anyhow::Result;
use clap::{CommandFactory, FromArgMatches};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use loglake::cli::Cli;
use loglake::config::PipelineConfig;
use loglake::config_file::ConfigFile;
use loglake::pipeline::run_pipeline;
use loglake::platform::ExitCode;
use loglake::stats::stats_reset;

fn main() -> Result<()> {
    let cli = process_args_with_config();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = PipelineConfig::from_cli(&cli);
    if let Err(e) = config.validate() {
        eprintln!("loglake: Error: {}", e);
        ExitCode::InvalidUsage.exit();
    }
    debug!(?config, "resolved configuration");

    stats_reset();
    match run_pipeline(&config) {
        Ok(outcome) => {
            if config.stats {
                eprintln!("{}", outcome.stats.format_stats());
            }
            println!(
                "Loaded {} rows into table '{}' ({})",
                outcome.rows_loaded,
                outcome.table_name,
                outcome.table_path.display()
            );
            ExitCode::Success.exit();
        }
        Err(e) => {
            eprintln!("loglake: Error: {}", e);
            if config.stats {
                eprintln!("{}", loglake::stats::get_thread_stats().format_stats());
            }
            ExitCode::GeneralError.exit();
        }
    }
}

fn extract_config_file_arg(args: &[String]) -> Option<String> {
    args.iter()
        .position(|arg| arg == "--config-file")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| {
            args.iter()
                .find_map(|arg| arg.strip_prefix("--config-file=").map(str::to_string))
        })
}

/// Parse the command line with config file defaults inserted ahead of user flags
fn process_args_with_config() -> Cli {
    let raw_args: Vec<String> = std::env::args().collect();

    if raw_args.iter().any(|arg| arg == "--show-config") {
        ConfigFile::show_config();
        ExitCode::Success.exit();
    }

    let processed_args = if raw_args.iter().any(|arg| arg == "--ignore-config") {
        raw_args
    } else {
        let config_file_path = extract_config_file_arg(&raw_args);
        match ConfigFile::load_with_custom_path(config_file_path.as_deref())
            .and_then(|config_file| config_file.process_args(raw_args))
        {
            Ok(processed) => processed,
            Err(e) => {
                eprintln!("loglake: Config error: {:#}", e);
                ExitCode::GeneralError.exit();
            }
        }
    };

    let matches = Cli::command().get_matches_from(processed_args);
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| {
        eprintln!("loglake: Error: {}", e);
        ExitCode::InvalidUsage.exit();
    })
}
