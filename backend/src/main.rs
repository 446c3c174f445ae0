use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::logger::init_logger;
use dlmm_backend::{
    analytics::{LOOKBACK_OPTIONS, MIN_TICKS_FOR_ANALYTICS, WindowAnalytics},
    config::AppConfig,
    db::Db,
    history::Reconciler,
    market::collector::Collector,
    market::meteora::{MeteoraClient, RateLimitedClient},
    metrics::counters::Counters,
    scheduler::IngestScheduler,
};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type Ingest = IngestScheduler<Collector<RateLimitedClient<MeteoraClient>>, Reconciler>;

/// Builds the collect -> reconcile pipeline over the configured API and store.
fn build_ingest(cfg: &AppConfig, db: &Db, counters: &Counters) -> anyhow::Result<Ingest> {
    let transport = MeteoraClient::new(cfg.api_url.clone(), cfg.request_timeout)
        .context("failed to build http client")?;

    let listing = RateLimitedClient::new(
        transport,
        cfg.rate_limit(),
        cfg.backoff(),
        cfg.retry_attempts,
        counters.clone(),
    )
    .context("invalid rate limit configuration")?;

    let collector = Collector::new(Arc::new(listing), cfg.collector());
    let reconciler = Reconciler::new(db.pool.clone(), counters.clone());

    Ok(IngestScheduler::new(
        Arc::new(collector),
        Arc::new(reconciler),
        cfg.tick_interval,
        counters.clone(),
    ))
}

/// Periodically logs what a consumer would currently be offered.
async fn run_reporter(
    analytics: WindowAnalytics,
    ingest: Arc<Ingest>,
    counters: Counters,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing has been collected yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let status = ingest.status();
        info!(
            ticks_ok = Counters::read(&counters.ticks_ok),
            ticks_failed = Counters::read(&counters.ticks_failed),
            pages = Counters::read(&counters.pages_fetched),
            retries = Counters::read(&counters.fetch_retries),
            skipped = Counters::read(&counters.records_skipped),
            anomalies = Counters::read(&counters.anomalies),
            last_error = status.last_error.as_deref().unwrap_or("-"),
            "ingest status"
        );

        let readiness = match analytics.readiness().await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "readiness query failed");
                continue;
            }
        };

        if !readiness.is_ready(MIN_TICKS_FOR_ANALYTICS) {
            info!(
                ticks = readiness.ticks_collected,
                needed = MIN_TICKS_FOR_ANALYTICS,
                "not enough data yet"
            );
            continue;
        }

        let Some(lookback) = readiness
            .available_lookbacks(&LOOKBACK_OPTIONS)
            .last()
            .copied()
        else {
            continue;
        };

        match analytics.summarize(lookback).await {
            Ok(rows) => {
                for (rank, p) in rows.iter().take(5).enumerate() {
                    info!(
                        rank = rank + 1,
                        pool = %p.pair_address,
                        name = %p.name,
                        lookback,
                        ticks = p.ticks_observed,
                        yield_24h_pct = ?p.annualized_fee_yield,
                        positions = ?p.estimated_positions,
                        "top pool"
                    );
                }
            }
            Err(e) => error!(error = %e, "summary query failed"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    init_logger("dlmm-backend", cfg.production);

    info!("Starting DLMM history collector...");

    let db = Db::connect(&cfg.database_url)
        .await
        .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;

    let counters = Counters::default();
    let ingest = Arc::new(build_ingest(&cfg, &db, &counters)?);
    let analytics = WindowAnalytics::new(db.pool.clone(), cfg.yield_params());

    let cancel = CancellationToken::new();

    let ingest_handle = tokio::spawn(Arc::clone(&ingest).run(cancel.child_token()));
    let reporter_handle = tokio::spawn(run_reporter(
        analytics,
        Arc::clone(&ingest),
        counters.clone(),
        cfg.tick_interval,
        cancel.child_token(),
    ));

    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?
    };

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    cancel.cancel();

    info!("Waiting for the in-flight tick to finish...");
    let _ = ingest_handle.await;
    let _ = reporter_handle.await;

    db.pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
