// Copyright (c) 2026 Vela Labs. MIT License.
// See LICENSE for details.

//! # Vela Node
//!
//! Entry point for the `vela-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the wallet core's process-wide
//! singletons, and runs the maintenance loop.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the daemon (metrics endpoint + maintenance sweeps)
//! - `tiers`   — print the KYC tier limit table
//! - `version` — print build version information

mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use vela_core::config::{AbuseConfig, IdempotencyConfig, LedgerConfig};
use vela_core::guard::{AbuseTracker, AccountLockGuard, StaticGeoResolver};
use vela_core::idempotency::IdempotencyRegistry;
use vela_core::ledger::LedgerEngine;
use vela_core::limits::KycTier;

use cli::{Commands, VelaNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VelaNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Tiers => {
            print_tiers();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// The core's process-wide singletons, constructed once at startup and
/// shared by reference. The request-serving layer receives the same
/// handles; the daemon only needs them for sweeps and gauge sampling.
struct CoreHandles {
    ledger: Arc<LedgerEngine>,
    registry: Arc<IdempotencyRegistry>,
    guard: Arc<AccountLockGuard>,
    tracker: Arc<AbuseTracker>,
}

/// Starts the daemon: metrics endpoint plus the maintenance loop.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "vela_node=info,vela_core=info",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        metrics_port = args.metrics_port,
        sweep_interval_secs = args.sweep_interval_secs,
        abuse_threshold = args.abuse_threshold,
        "starting vela-node"
    );

    // --- Core singletons ---
    let abuse_config = AbuseConfig {
        violation_threshold: args.abuse_threshold,
        window: chrono::Duration::minutes(args.abuse_window_minutes),
        lock_duration: chrono::Duration::hours(args.abuse_lock_hours),
    };

    let ledger = Arc::new(LedgerEngine::new(LedgerConfig::default()));
    let registry = Arc::new(IdempotencyRegistry::new(IdempotencyConfig::default()));
    let guard = Arc::new(AccountLockGuard::new());
    let tracker = Arc::new(AbuseTracker::new(
        Arc::new(StaticGeoResolver::builtin()),
        Arc::clone(&guard),
        abuse_config,
    ));
    let handles = CoreHandles {
        ledger,
        registry,
        guard,
        tracker,
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Maintenance loop ---
    // Sweeps are eager versions of work the core also does lazily:
    // idempotency records past TTL are dropped, expired account locks are
    // moved to history, and the state gauges are re-sampled.
    let sweep_metrics = Arc::clone(&node_metrics);
    let sweep_interval = std::time::Duration::from_secs(args.sweep_interval_secs.max(1));
    let maintenance = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();

            let expired_records = handles.registry.sweep_expired(now);
            let released_locks = handles.guard.release_expired(now);

            sweep_metrics
                .idempotency_records_expired_total
                .inc_by(expired_records as u64);
            sweep_metrics
                .expired_locks_released_total
                .inc_by(released_locks as u64);
            sweep_metrics.maintenance_sweeps_total.inc();

            sweep_metrics.open_wallets.set(handles.ledger.wallet_count() as i64);
            sweep_metrics.journal_rows.set(handles.ledger.journal_len() as i64);
            sweep_metrics
                .idempotency_records
                .set(handles.registry.len() as i64);
            sweep_metrics
                .active_account_locks
                .set(handles.guard.active_count() as i64);
            sweep_metrics
                .rate_limit_violations
                .set(handles.tracker.violation_count() as i64);

            tracing::debug!(
                expired_records = expired_records,
                released_locks = released_locks,
                "maintenance sweep complete"
            );
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
        }
    }

    maintenance.abort();
    tracing::info!("vela-node stopped");
    Ok(())
}

/// Prints the KYC tier limit table to stdout.
fn print_tiers() {
    println!("{:<8} {:>14} {:>14} {:>14}", "tier", "daily", "monthly", "single-tx");
    for tier in [KycTier::Tier0, KycTier::Tier1, KycTier::Tier2, KycTier::Tier3] {
        let limits = tier.limits();
        println!(
            "{:<8} {:>14} {:>14} {:>14}",
            tier.to_string(),
            format_limit(limits.daily),
            format_limit(limits.monthly),
            format_limit(limits.single_transaction),
        );
    }
}

/// Renders a limit value, spelling out the unlimited sentinel.
fn format_limit(value: u64) -> String {
    if value == vela_core::limits::UNLIMITED {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("vela-node {}", env!("CARGO_PKG_VERSION"));
    println!("core      {}", vela_core::config::CORE_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
