use std::sync::Arc;

use tokio::sync::watch;

use tweetrelay::clock::{Clock, SystemClock};
use tweetrelay::config;
use tweetrelay::poll::{Monitor, Scheduler};
use tweetrelay::services::{create_source, DiscordNotifier, NotificationSink};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Starting tweetrelay: {} account(s) via {:?}, relaying to channel {}",
        config.accounts.len(),
        config.source.kind,
        config.discord.channel_id
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sink = DiscordNotifier::new(&config.discord, config.http_timeout).map_err(|e| {
        log::error!("Discord client error: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    match sink.verify().await {
        Ok(()) => log::info!("Discord channel {} is reachable", config.discord.channel_id),
        Err(e) if e.is_fatal() => {
            log::error!("Discord credentials rejected: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                e.to_string(),
            ));
        }
        // The channel may become available later; deliveries will report it
        Err(e) => log::warn!("Discord channel check failed: {}", e),
    }

    let handle = create_source(&config, clock.clone()).map_err(|e| {
        log::error!("Source setup error: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    log::info!("Using {} source", handle.source.name());

    let monitor = Monitor::new(
        &config.accounts,
        handle.source,
        Arc::new(sink),
        clock,
        config.poll.clone(),
        config.source.max_results,
    )
    .with_rate_limiter(handle.limiter);
    let monitor = Arc::new(monitor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn graceful shutdown handler
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping after the current account...");
        let _ = shutdown_tx.send(true);
    });

    #[cfg(unix)]
    spawn_manual_trigger(monitor.clone(), shutdown_rx.clone());

    Scheduler::new(monitor, config.poll.interval)
        .run(shutdown_rx)
        .await
        .map_err(|e| {
            log::error!("Poller halted: {}", e);
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string())
        })
}

/// SIGUSR1 runs an extra check right away and logs a status snapshot. It
/// queues behind a running scheduled cycle instead of overlapping it.
#[cfg(unix)]
fn spawn_manual_trigger(monitor: Arc<Monitor>, shutdown: watch::Receiver<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to install SIGUSR1 handler: {}", e);
                return;
            }
        };

        while usr1.recv().await.is_some() {
            log::info!("Manual check requested");
            if let Err(e) = monitor.run_cycle(&shutdown).await {
                log::error!("Manual check failed: {}", e);
            }
            match serde_json::to_string(&monitor.status().await) {
                Ok(status) => log::info!("Status: {}", status),
                Err(e) => log::error!("Failed to serialize status: {}", e),
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
