use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inkpress_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use inkpress_core::{AppConfig, SettingsPatch, System};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "inkpress")]
#[command(author, version, about = "Operator tooling for the Inkpress persistence core", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the
    /// configured level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Path to a TOML configuration file; environment variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory (supports ~ expansion)
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the store: partitions, settings record, cache token
    Init,

    /// Report readiness and component health
    Status,

    /// Inspect or edit the persisted settings record
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Rotate the cache token
    Invalidate,

    /// Rebuild sorted indices, all registered types or a subset
    Reindex {
        /// Content types to rebuild; all registered types when omitted
        types: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the whole settings record as JSON
    Show,

    /// Print one field
    Get { name: String },

    /// Save a partial replacement of the settings record
    Set {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        http_port: Option<String>,
        #[arg(long)]
        admin_email: Option<String>,
        /// Cache flags, e.g. --cache-flag invalidate; repeatable
        #[arg(long = "cache-flag")]
        cache_flags: Vec<String>,
    },
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::from_env().context("loading config from environment")?,
    };

    if let Some(dir) = &args.data_dir {
        let expanded = shellexpand::tilde(dir);
        config.store.data_dir = PathBuf::from(expanded.as_ref());
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let level_source = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level = level_source.parse::<LogLevel>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{level_source}', using 'info'");
        LogLevel::Info
    });
    init_logging_with_config(
        LogConfig::new(log_level)
            .with_target(config.logging.with_target)
            .json_format(args.json_logs || config.logging.json_format),
    )?;
    inkpress_core::metrics::init_metrics();

    let system = match System::init(&config) {
        Ok(system) => system,
        Err(err) => {
            error!(%err, "startup failed");
            return Err(err.into());
        }
    };

    match args.command {
        Command::Init => {
            info!("store initialized");
            println!(
                "initialized {} with {} content type(s)",
                config.db_path().display(),
                system.types().len()
            );
        }
        Command::Status => {
            let report = system.health();
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("bootstrapped: {}", system.is_bootstrapped()?);
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let snapshot = system.settings().snapshot();
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
            }
            SettingsAction::Get { name } => match system.get_setting(&name) {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("unknown setting: {name}"),
            },
            SettingsAction::Set { name, domain, http_port, admin_email, cache_flags } => {
                let patch = SettingsPatch {
                    name,
                    domain,
                    http_port,
                    admin_email,
                    cache: if cache_flags.is_empty() { None } else { Some(cache_flags) },
                    ..Default::default()
                };
                let snapshot = system.replace_config(patch)?;
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
            }
        },
        Command::Invalidate => {
            let token = system.invalidate_cache()?;
            println!("{token}");
        }
        Command::Reindex { types } => {
            let targets: Vec<String> = if types.is_empty() {
                system.types().iter().map(String::from).collect()
            } else {
                types
            };
            for content_type in &targets {
                match system.indexes().sort_content(content_type).await {
                    Ok(entries) => println!("{content_type}: {entries} entries"),
                    Err(err) => eprintln!("{content_type}: {err}"),
                }
            }
        }
    }

    system.close();
    Ok(())
}
