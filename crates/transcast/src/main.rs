//! tcast: replay and inspect paced cross-window translation runs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use transcast_core::config::{Config, LogFormat, default_config_path, resolve_config_path};
use transcast_core::logging::{LogConfig, init_logging};

mod replay;

use replay::{OutputFormat, ReplayOptions};

#[derive(Parser, Debug)]
#[command(name = "tcast", version, about = "Replay and inspect paced cross-window translation runs")]
struct Cli {
    /// Config file (defaults: $TRANSCAST_CONFIG, ./transcast.toml, user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty or json)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines script of producer frames across in-process windows
    Replay {
        /// Script file, one producer frame per line (optional `at_ms` offset)
        file: PathBuf,

        /// Windows sharing the channel; the first one runs the producer
        #[arg(long, default_value_t = 1)]
        windows: usize,

        /// Open one extra window this many script milliseconds after start
        #[arg(long, value_name = "MS")]
        late_join_ms: Option<u64>,

        /// Multiply every delay by this factor (0.01 replays 100x faster)
        #[arg(long, default_value_t = 1.0)]
        time_scale: f64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },

    /// Print the reveal delay pacing assigns to a translated text
    Delay {
        /// Translated text
        text: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print which config file is used
    Path,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation_for(&err) {
                eprintln!();
                eprint!("{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}

fn remediation_for(err: &anyhow::Error) -> Option<transcast_core::error::Remediation> {
    if let Some(core) = err.downcast_ref::<transcast_core::Error>() {
        return core.remediation();
    }
    err.downcast_ref::<transcast_core::error::ConfigError>()
        .map(transcast_core::error::ConfigError::remediation)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    setup_logging(&config.logging, cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Replay {
            file,
            windows,
            late_join_ms,
            time_scale,
            format,
        } => {
            if windows == 0 {
                bail!("--windows must be at least 1");
            }
            if !(time_scale.is_finite() && time_scale > 0.0) {
                bail!("--time-scale must be a positive number");
            }
            let script = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read script {}", file.display()))?;
            let lines = transcast_core::producer::parse_script(&script)
                .with_context(|| format!("invalid script {}", file.display()))?;
            let options = ReplayOptions {
                windows,
                late_join_ms,
                time_scale,
                format,
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?;
            runtime.block_on(replay::run(&config, lines, &options))
        }
        Commands::Delay { text } => {
            let units = text.encode_utf16().count();
            let delay = config.pacing.reveal_delay(units);
            println!("{units} units -> {} ms", delay.as_millis());
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml_string()?);
                Ok(())
            }
            ConfigCommands::Path => {
                print_config_path(cli.config.as_deref());
                Ok(())
            }
        },
    }
}

fn setup_logging(
    base: &LogConfig,
    level: Option<String>,
    format: Option<LogFormat>,
) -> anyhow::Result<()> {
    let mut log_config = base.clone();
    if let Some(level) = level {
        log_config.level = level;
    }
    if let Some(format) = format {
        log_config.format = format;
    }
    init_logging(&log_config).context("failed to initialize logging")
}

fn print_config_path(explicit: Option<&Path>) {
    match resolve_config_path(explicit) {
        Some(path) => println!("{}", path.display()),
        None => {
            println!("(none; using built-in defaults)");
            if let Some(path) = default_config_path() {
                println!("user config location: {}", path.display());
            }
        }
    }
}
