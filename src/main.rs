use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scraperd::{
    config::Config,
    jobs::{schedule, ExecutionGuard, JobRegistry, JobRunner, SchedulerService},
    notify,
    web::WebServer,
};

/// Bound on how long shutdown waits for in-flight runs to finish
const SHUTDOWN_DRAIN_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "scraperd")]
#[command(about = "Scraping job orchestration service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("scraperd={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting scraperd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    // A schedule the process cannot fully parse is fatal: better to
    // fail the deploy than to silently run a partial schedule.
    let definitions = schedule::load(&config.scheduler)?;

    let notifier = notify::build(&config.notify);
    let registry = Arc::new(JobRegistry::from_config(&config.scraper));
    info!("Registered job targets: {}", registry.targets().join(", "));
    let guard = ExecutionGuard::new();
    let runner = Arc::new(JobRunner::new(notifier, config.scraper.clone()));

    let scheduler = SchedulerService::new(
        definitions,
        &config.scheduler.effective_timezone(),
        registry.clone(),
        guard.clone(),
        runner.clone(),
    )?;

    let web_server = WebServer::new(&config, registry, guard.clone(), runner)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let cancel = CancellationToken::new();

    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = web_server.serve(server_cancel).await {
            tracing::error!("Web server failed: {}", e);
        }
    });

    wait_for_shutdown().await?;
    info!("Shutdown signal received");
    cancel.cancel();

    let _ = scheduler_handle.await;
    let _ = server_handle.await;

    drain_running_jobs(&guard).await;

    info!("scraperd stopped");
    Ok(())
}

/// Block until SIGINT or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

/// Wait a bounded time for in-flight runs to clear the guard table
async fn drain_running_jobs(guard: &ExecutionGuard) {
    use tokio::time::{interval, Duration, Instant};

    if guard.running_count() == 0 {
        return;
    }

    info!(
        "Waiting up to {}s for {} running job(s) to complete",
        SHUTDOWN_DRAIN_SECS,
        guard.running_count()
    );

    let deadline = Instant::now() + Duration::from_secs(SHUTDOWN_DRAIN_SECS);
    let mut tick = interval(Duration::from_millis(500));

    loop {
        tick.tick().await;

        if guard.running_count() == 0 {
            info!("All running jobs completed");
            return;
        }

        if Instant::now() >= deadline {
            let abandoned: Vec<String> = guard
                .running()
                .into_iter()
                .map(|handle| handle.target)
                .collect();
            warn!(
                "Shutdown drain timed out; abandoning in-flight job(s): {}",
                abandoned.join(", ")
            );
            return;
        }
    }
}
