use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use vigia::cli::{Cli, Commands, ConfigAction};
use vigia::config::Config;
use vigia::engine::{self, MonitorEngine, Pipeline};
use vigia::error::{Result, VigiaError};
use vigia::filtering::CandidateItem;
use vigia::ledger::{parse_date, AlertRecord};
use vigia::storage::{AlertStore, MemoryStore, SqliteStore};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay {
            input,
            persist,
            digest,
            show_alerts,
        } => {
            cmd_replay(cli.config, cli.profile, &input, persist, digest, show_alerts)?;
        }
        Commands::Digest { date, weekly } => {
            cmd_digest(cli.config, cli.profile, date, weekly)?;
        }
        Commands::Trends => {
            cmd_operator(cli.config, cli.profile, "tendencias")?;
        }
        Commands::Lookup { key } => {
            cmd_operator(cli.config, cli.profile, &format!("buscar {}", key))?;
        }
        Commands::Command { line } => {
            cmd_operator(cli.config, cli.profile, &line.join(" "))?;
        }
        Commands::Status => {
            cmd_status(cli.config, cli.profile)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "vigia=debug" } else { "vigia=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_replay(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    input: &Path,
    persist: bool,
    digest: bool,
    show_alerts: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let file = std::fs::File::open(input).map_err(|e| VigiaError::Io {
        source: e,
        context: format!("Failed to open input file: {}", input.display()),
    })?;

    let store: Arc<dyn AlertStore> = if persist {
        Arc::new(open_store(&config)?)
    } else {
        Arc::new(MemoryStore::new())
    };

    let mut engine = MonitorEngine::new(config.clone())?;
    if persist {
        engine.restore_recent(store.as_ref(), Utc::now());
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| VigiaError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    let engine = rt.block_on(async {
        let (alert_tx, mut alert_rx) =
            mpsc::channel::<AlertRecord>(config.pipeline.buffer_size.max(1));
        let printer = tokio::spawn(async move {
            let mut count = 0usize;
            while let Some(record) = alert_rx.recv().await {
                count += 1;
                if show_alerts {
                    println!(
                        "🚨 [{}] @{}: {}",
                        record.tier(),
                        record.item.source_handle,
                        record.item.text
                    );
                }
            }
            count
        });

        let pipeline = Pipeline::new(
            engine,
            Arc::clone(&store),
            alert_tx,
            config.pipeline.buffer_size,
            config.flush_interval(),
        );

        let mut processed = 0usize;
        let mut skipped = 0usize;
        for (idx, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| VigiaError::Io {
                source: e,
                context: format!("Failed to read line {} of {}", idx + 1, input.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let item: CandidateItem = match serde_json::from_str(&line) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping line {}: {}", idx + 1, e);
                    skipped += 1;
                    continue;
                }
            };

            // Detection delay: how long after posting the item reached us
            let latency_ms = (Utc::now() - item.observed_at).num_milliseconds() as f64;
            match pipeline.submit_with_latency(item, Some(latency_ms)).await {
                Ok(_) => processed += 1,
                Err(VigiaError::InvalidInput(msg)) => {
                    tracing::warn!("Skipping line {}: {}", idx + 1, msg);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let engine = pipeline.shutdown().await?;
        let forwarded = printer
            .await
            .map_err(|e| VigiaError::Pipeline(format!("Alert printer failed: {}", e)))?;

        println!("✓ Replayed {}", input.display());
        println!("  Processed: {}", processed);
        println!("  Skipped: {}", skipped);
        println!("  Alerts forwarded: {}", forwarded);
        Ok::<_, VigiaError>(engine)
    })?;

    if digest {
        let now = Utc::now();
        println!();
        println!("{}", engine.daily_digest(engine.today(now), now));
    }

    Ok(())
}

fn cmd_digest(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    date: Option<String>,
    weekly: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let engine = stored_engine(&config)?;
    let now = Utc::now();

    let date = match date {
        Some(d) => parse_date(&d)?,
        None => engine.today(now),
    };

    if weekly {
        println!("{}", engine.weekly_digest(date));
    } else {
        println!("{}", engine.daily_digest(date, now));
    }
    Ok(())
}

fn cmd_operator(config_path: Option<PathBuf>, profile: Option<String>, line: &str) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let engine = stored_engine(&config)?;
    println!("{}", engine::dispatch(&engine, line, Utc::now()));
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let path = expand_path(&config.database_path())?;

    println!("Vigia Status");
    println!("============");
    println!("\nDatabase: {}", path.display());

    if !path.exists() {
        println!("  (not created yet)");
        return Ok(());
    }

    let stats = open_store(&config)?.stats()?;
    println!("  Alerts: {}", stats.alert_count);
    println!("  Suppressed: {}", stats.suppressed_count);
    println!("  Partitions: {}", stats.partition_count);
    println!(
        "  Metrics saved: {}",
        stats.metrics_saved_at.as_deref().unwrap_or("never")
    );
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| VigiaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    VigiaError::invalid_argument(format!("unknown config section '{}'", section))
                })?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&shown).map_err(|e| VigiaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Profiles: {}", config.profiles.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'vigia config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = expand_path(&config.database_path())?;
    SqliteStore::new(&path)
}

/// Engine restored from the configured database, for read-only commands
fn stored_engine(config: &Config) -> Result<MonitorEngine> {
    let store = open_store(config)?;
    let mut engine = MonitorEngine::new(config.clone())?;
    engine.restore_recent(&store, Utc::now());
    Ok(engine)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| VigiaError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| VigiaError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
