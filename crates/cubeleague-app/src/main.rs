// Cube league draft runner entry point.
//
// Startup sequence:
// 1. Load config
// 2. Initialize tracing (log to file, stdout is the report)
// 3. Open database, seed league and pool
// 4. Run the requested command once
// 5. Drain broadcast events into the log and exit

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing::{error, info};

use cubeleague_app::cli::{self, Cli};
use cubeleague_app::config::{self, LoggingConfig};
use cubeleague_app::league;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = Cli::parse().action();

    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;
    info!(
        "Config loaded: league={}, {} teams, starting balance {}",
        config.league.name,
        config.league.teams.len(),
        config.league.starting_balance
    );

    // 3. Open database and seed
    let league = league::open(&config).context("failed to open league")?;
    info!("Database opened at {}", config.database.path);
    let mut events = league.events.subscribe();

    // 4. Run the command
    let report = match cli::run(&command, &league).await {
        Ok(report) => report,
        Err(e) => {
            error!("Command {:?} failed: {:#}", command, e);
            return Err(e);
        }
    };
    print!("{report}");

    // 5. Log what was broadcast
    while let Ok(event) = events.try_recv() {
        info!(topic = %event.topic, payload = %event.payload, "draft event");
    }

    Ok(())
}

/// Initialize tracing to log to a file under the configured log directory.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = match &logging.dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("cubeleague.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

/// Platform data directory (e.g. `~/.local/share/cubeleague/logs`), falling
/// back to `./logs`.
fn default_log_dir() -> anyhow::Result<PathBuf> {
    match ProjectDirs::from("", "", "cubeleague") {
        Some(dirs) => Ok(dirs.data_dir().join("logs")),
        None => Ok(std::env::current_dir()?.join("logs")),
    }
}
