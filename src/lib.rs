pub mod cli;
pub mod core;
pub mod notifier;
pub mod providers;
pub mod store;

use crate::core::AlertRule;
use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What to simulate: a configured alert or an ad-hoc rule.
#[derive(Debug, Clone)]
pub enum SimulateTarget {
    Alert(String),
    Rule(AlertRule),
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Check,
    Watch,
    List,
    Unsubscribe {
        id: String,
        undo: bool,
    },
    Simulate {
        target: SimulateTarget,
        days: Option<u32>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxalert starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let snapshot_cache = Arc::new(providers::SnapshotCache::new());
    let source = providers::CurrencyApiProvider::new(
        config.providers.currency_api_url(),
        Arc::clone(&snapshot_cache),
    )?;

    match command {
        AppCommand::Check => run_alerts(&config, &source, None).await,
        AppCommand::Watch => {
            let interval = config.schedule.interval()?;
            run_alerts(&config, &source, Some(interval)).await
        }
        AppCommand::List => {
            let store = store::open(&config)?;
            cli::list::run(&store).await
        }
        AppCommand::Unsubscribe { id, undo } => {
            let store = store::open(&config)?;
            cli::list::unsubscribe(&store, &id, undo).await
        }
        AppCommand::Simulate { target, days } => {
            let rule = match target {
                SimulateTarget::Rule(rule) => rule,
                SimulateTarget::Alert(id) => config
                    .alert(&id)
                    .map(|a| a.rule.clone())
                    .with_context(|| format!("No alert with id '{id}' in configuration"))?,
            };
            let days = days.unwrap_or(config.simulation.days);
            let today = chrono::Utc::now().date_naive();
            cli::simulate::run(&source, &rule, days, today)
                .await
                .map(|_| ())
        }
    }
}

/// Evaluates alerts once, or on `interval` until interrupted.
async fn run_alerts(
    config: &AppConfig,
    source: &providers::CurrencyApiProvider,
    interval: Option<Duration>,
) -> Result<()> {
    let store = store::open(config)?;
    let (notifier, dispatcher) = notifier::QueuedNotifier::from_config(&config.notifier)?;

    let result = match interval {
        None => cli::check::run(source, &store, &notifier).await.map(|_| ()),
        Some(interval) => cli::check::watch(source, &store, &notifier, interval).await,
    };

    // Let queued notifications go out before exiting
    drop(notifier);
    dispatcher
        .await
        .context("Notification dispatcher panicked")?;
    result
}
