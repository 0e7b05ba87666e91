use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use eventlog::EventLog;
use eventlog_store::SqliteStore;
use tracing_subscriber::EnvFilter;

use eventlog_cli::commands::events::Filters;
use eventlog_cli::commands::record::Entry;
use eventlog_cli::commands::{clear, events, export, record, status};
use eventlog_cli::{Cli, Commands, Config};

/// Load config, open the database and initialize the engine over it.
async fn open_log(config_path: Option<&Path>) -> Result<(EventLog, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let log = EventLog::builder()
        .config(config.engine.clone())
        .storage(store)
        .build();
    log.init(None)
        .await
        .context("failed to initialize event log")?;
    Ok((log, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init so a subscriber installed by a test harness is left alone
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (log, config) = open_log(cli.config.as_deref()).await?;
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Status => status::run(&mut stdout, &log, &config.database_path)?,
        Commands::Events {
            categories,
            session,
            search,
            since,
            until,
            limit,
        } => {
            let filters = Filters {
                categories,
                session: session.as_deref(),
                search: search.as_deref(),
                since: since.as_deref(),
                until: until.as_deref(),
                limit: *limit,
            };
            events::run(&mut stdout, &log, &filters)?;
        }
        Commands::Export { mode } => export::run(&mut stdout, &log, *mode).await?,
        Commands::Screen { name, params } => {
            record::run(
                &log,
                Entry::Screen {
                    name,
                    params: params.clone(),
                },
            )
            .await?;
        }
        Commands::Action { name, data } => {
            record::run(
                &log,
                Entry::Action {
                    name,
                    data: data.clone(),
                },
            )
            .await?;
        }
        Commands::Log {
            level,
            message,
            data,
        } => {
            record::run(
                &log,
                Entry::Log {
                    level: *level,
                    message,
                    data: data.clone(),
                },
            )
            .await?;
        }
        Commands::Error { message, context } => {
            record::run(
                &log,
                Entry::Error {
                    message,
                    context: context.clone(),
                },
            )
            .await?;
        }
        Commands::Clear => clear::run(&mut stdout, &log).await?,
    }

    Ok(())
}
