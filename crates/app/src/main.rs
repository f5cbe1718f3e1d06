mod cli;
mod config;
mod conversation;
mod dedup;
mod dispatch;
mod generator;
mod http;
mod jobs;
mod scanner;
mod state;
#[cfg(test)]
mod testing;
mod wiring;

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::ConfigError;
use crate::http::HttpError;
use crate::jobs::JobError;
use crate::wiring::WiringError;
use quill_infra::db::run_migrations;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("db error: {0}")]
    Db(#[from] quill_infra::db::DbPoolError),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error("job error: {0}")]
    Jobs(#[from] JobError),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    config::load_dotenv()?;
    let config = config::AppConfig::from_env()?;
    let persona = config.load_persona(cli.persona.as_deref())?;
    info!(subreddit = %config.subreddit, account = %config.reddit.username, "configuration loaded");

    let state = wiring::build_state(config, persona).await?;
    run_migrations(&state.db).await?;

    let (trigger, shutdown) = jobs::shutdown::channel();
    let mut api_task = None;
    let mut worker_task = None;

    if cli.mode.run_api() {
        let addr = state.config.http_addr;
        let http_state = state.clone();
        let http_shutdown = shutdown.clone();
        api_task = Some(tokio::spawn(async move {
            info!(%addr, "http server starting");
            http::serve(addr, http_state, http_shutdown).await
        }));
    }

    if cli.mode.run_worker() {
        let worker_state = state.clone();
        let worker_shutdown = shutdown.clone();
        let skip_initial_scan = cli.skip_initial_scan;
        worker_task = Some(tokio::spawn(async move {
            info!("bot started");
            jobs::start(worker_state, worker_shutdown, skip_initial_scan).await
        }));
    }

    let mut early_exit = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received; stopping loops");
        }
        res = wait_for(&mut api_task) => {
            early_exit = Some(res);
        }
        res = wait_for(&mut worker_task) => {
            early_exit = Some(res);
        }
    }
    trigger.trigger();

    if let Some(task) = api_task {
        join_with_grace("http", task, SHUTDOWN_GRACE).await;
    }
    if let Some(task) = worker_task {
        join_with_grace("worker", task, SHUTDOWN_GRACE).await;
    }
    state.generator.close().await;
    info!("shutdown complete");

    match early_exit {
        Some(res) => res,
        None => Ok(()),
    }
}

/// Waits for a spawned task and takes it out of `slot`. Never resolves when
/// the slot is empty.
async fn wait_for<E>(
    slot: &mut Option<tokio::task::JoinHandle<Result<(), E>>>,
) -> Result<(), AppError>
where
    AppError: From<E>,
{
    let Some(handle) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let res = handle.await;
    *slot = None;
    res??;
    Ok(())
}

/// Waits up to `grace` for a task that was asked to stop. Returns `true`
/// when it finished cleanly.
async fn join_with_grace<E: std::fmt::Display>(
    name: &'static str,
    handle: tokio::task::JoinHandle<Result<(), E>>,
    grace: Duration,
) -> bool {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(err))) => {
            warn!(task = name, error = %err, "task ended with error during shutdown");
            false
        }
        Ok(Err(err)) => {
            warn!(task = name, error = %err, "task panicked during shutdown");
            false
        }
        Err(_) => {
            warn!(task = name, grace_secs = grace.as_secs(), "task did not stop within the grace period");
            false
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::join_with_grace;
    use crate::http::HttpError;
    use crate::jobs::JobError;

    #[tokio::test(start_paused = true)]
    async fn stopped_tasks_are_joined_and_hung_ones_abandoned() {
        let http = tokio::spawn(async { Ok::<(), HttpError>(()) });
        let worker = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), JobError>(())
        });

        let start = Instant::now();
        assert!(join_with_grace("http", http, Duration::from_secs(10)).await);
        assert!(!join_with_grace("worker", worker, Duration::from_secs(10)).await);
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_secs(11));
    }
}
