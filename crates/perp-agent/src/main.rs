use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_core::{Exchange, SentimentFeed};
use anyhow::Result;
use chrono::Utc;
use hyperliquid_client::{HyperliquidClient, IndicatorServiceClient, PaperExchange};
use ml_client::ScorerClient;
use near_miss_lab::NearMissRecorder;
use position_sizer::PositionSizer;
use risk_governor::{RiskVerdict, Session};
use sentiment_client::SentimentClient;
use signal_engine::AgentState;
use tokio::signal::unix::SignalKind;
use tokio::sync::Notify;
use uuid::Uuid;
use volatility_monitor::VolatilityMonitor;

mod config;
mod cycle;
mod metrics;
mod notifier;
mod retry;
mod trade_log;

use config::AgentConfig;
use cycle::{run_trading_cycle, Collaborators, LoopState};
use metrics::AgentMetrics;
use notifier::DiscordNotifier;
use trade_log::TradeLog;

/// Consecutive failed cycles before the loop pauses to cool down.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
const FAILURE_COOLDOWN: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting perp trading agent");

    // 2. Load and validate configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Mode: {}", if config.dry_run { "dry run" } else { "LIVE" });
    tracing::info!("  Coins: {}", config.coins.join(","));
    tracing::info!("  Interval: {} min", config.interval_minutes);
    tracing::info!(
        "  Allocation: {}% at {}x leverage, max {} positions",
        config.max_allocation_pct,
        config.leverage,
        config.max_concurrent_positions
    );
    tracing::info!(
        "  Circuit breaker: ${} | Session: {}h | Contrarian: {}%",
        config.circuit_breaker_usd,
        config.session_hours,
        config.contrarian_pct
    );

    // 3. Startup precondition: live mode needs a wallet address
    if !config.live_credentials_present() {
        tracing::error!(
            "HL_WALLET_ADDRESS is required in live mode. \
             Set DRY_RUN=true to simulate without credentials."
        );
        std::process::exit(1);
    }

    // 4. Database for session/trade logging
    sqlx::any::install_default_drivers();
    let db_pool = sqlx::AnyPool::connect(&config.database_url).await?;
    let trade_log = TradeLog::new(db_pool.clone());
    trade_log.init_tables().await?;
    sqlx::query("SELECT 1")
        .execute(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("database connectivity check failed: {}", e))?;
    tracing::info!("Startup check: database OK");

    // 5. Venue: paper book in dry run, live client otherwise
    let (exchange, paper): (Arc<dyn Exchange>, Option<Arc<PaperExchange>>) = if config.dry_run {
        let paper = Arc::new(PaperExchange::new(config.paper_starting_balance));
        (Arc::clone(&paper) as Arc<dyn Exchange>, Some(paper))
    } else {
        let client = HyperliquidClient::new(
            config.hl_api_url.clone(),
            config.hl_gateway_url.clone(),
            config.hl_wallet_address.clone(),
        )?;
        (Arc::new(client), None)
    };

    let balance = exchange
        .fetch_balance()
        .await
        .map_err(|e| anyhow::anyhow!("venue connectivity check failed: {}", e))?;
    tracing::info!(
        "Startup check: {} OK (${:.2} available, ${:.2} account value)",
        exchange.venue_name(),
        balance.available,
        balance.account_value
    );

    // 6. Collaborator clients
    let indicators = Arc::new(IndicatorServiceClient::new(
        config.indicator_service_url.clone(),
    )?);
    let scorer = Arc::new(ScorerClient::new(
        config.ml_scorer_url.clone(),
        Duration::from_secs(5),
    )?);
    let sentiment: Option<Arc<dyn SentimentFeed>> = if config.sentiment_enabled {
        Some(Arc::new(SentimentClient::new(
            config.sentiment_api_url.clone(),
            config.sentiment_api_key.clone(),
        )?))
    } else {
        tracing::info!("Sentiment disabled; sentiment-dependent rules inert");
        None
    };

    // ML scorer check (warn-only, never fatal)
    match reqwest::Client::new()
        .get(format!("{}/health", config.ml_scorer_url))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Startup check: ML scorer OK");
        }
        Ok(resp) => {
            tracing::warn!(
                "Startup check: ML scorer returned {} — confidence blend disabled until it recovers",
                resp.status()
            );
        }
        Err(e) => {
            tracing::warn!(
                "Startup check: ML scorer unreachable ({}) — confidence blend disabled until it recovers",
                e
            );
        }
    }

    let collab = Collaborators {
        exchange,
        paper,
        indicators,
        sentiment,
        scorer,
    };

    let sizer = PositionSizer::new(config.max_allocation_pct, config.size_decimals)?;
    let volatile_coins: HashSet<String> = config.volatile_coins.iter().cloned().collect();
    let notifier = DiscordNotifier::new(config.discord_webhook_url.clone())?;

    // 7. Session registration
    let session_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let mut state = LoopState {
        agent_state: AgentState::new(),
        monitor: VolatilityMonitor::new(),
        recorder: NearMissRecorder::new(),
        session: Session::new(config.circuit_breaker_usd, config.session_hours, started_at),
        provenance: HashMap::new(),
        last_reconcile: started_at,
    };
    let config_json = serde_json::to_string(&config).unwrap_or_else(|_| "{}".to_string());
    if let Err(e) = trade_log.register_session(&session_id, &config_json).await {
        tracing::warn!("failed to register session: {}", e);
    }

    let mut agent_metrics = AgentMetrics::new(10);

    notifier
        .send_message(&format!(
            "**Perp Agent Started** ({})\n\
             Balance: ${:.2} | Coins: {} | Interval: {}m\n\
             Circuit breaker: ${} | Session: {}h",
            if config.dry_run { "dry run" } else { "live" },
            balance.available,
            config.coins.join(","),
            config.interval_minutes,
            config.circuit_breaker_usd,
            config.session_hours,
        ))
        .await
        .ok();

    // 8. Graceful shutdown watcher (SIGINT + SIGTERM). The flag is checked
    // between cycles: in-flight collaborator calls run to natural
    // completion, no new cycle starts.
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_notify = Arc::new(Notify::new());
    {
        let flag = Arc::clone(&shutdown_flag);
        let notify = Arc::clone(&shutdown_notify);
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
            }
            flag.store(true, Ordering::SeqCst);
            notify.notify_waiters();
        });
    }

    tracing::info!(
        "Agent is now running (session {}). Press Ctrl+C to stop.",
        session_id
    );

    // Heartbeat: periodic Discord status so the operator knows the agent
    // is alive. 0 disables.
    let heartbeat_interval_cycles: u64 = std::env::var("HEARTBEAT_INTERVAL_CYCLES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(6);

    // 9. Main loop
    let base_interval = Duration::from_secs(config.interval_minutes * 60);
    let mut final_status = "interrupted";

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        let cycle_start = Instant::now();
        let outcome = run_trading_cycle(
            &collab,
            &config,
            &volatile_coins,
            &sizer,
            &mut state,
            &trade_log,
            &notifier,
            &mut agent_metrics,
            &session_id,
        )
        .await;

        match outcome {
            Ok(RiskVerdict::Continue) => {
                state.session.reset_errors();

                if heartbeat_interval_cycles > 0
                    && state.session.cycles > 0
                    && state.session.cycles % heartbeat_interval_cycles == 0
                {
                    notifier
                        .send_message(&format!(
                            "**Heartbeat** | Cycle #{} | PnL ${:.2} | {}W/{}L | {} near-misses pending | Volatility: {}",
                            state.session.cycles,
                            state.session.realized_pnl,
                            state.session.wins,
                            state.session.losses,
                            state.recorder.pending(),
                            state.monitor.global().as_str(),
                        ))
                        .await
                        .ok();
                }
            }
            Ok(RiskVerdict::CircuitBreaker) => {
                tracing::error!(
                    "Circuit breaker: session PnL ${:.2} breached -${} — halting",
                    state.session.realized_pnl,
                    config.circuit_breaker_usd
                );
                close_all_positions(collab.exchange.as_ref()).await;
                notifier
                    .send_message(&format!(
                        "**CIRCUIT BREAKER** — session PnL ${:.2} breached the -${} limit.\n\
                         All positions closed (best effort). Trading halted.",
                        state.session.realized_pnl, config.circuit_breaker_usd
                    ))
                    .await
                    .ok();
                final_status = "circuit_breaker";
                break;
            }
            Ok(RiskVerdict::SessionTimeout) => {
                tracing::info!(
                    "Session timeout after {:.1}h — stopping, positions stay open",
                    config.session_hours
                );
                notifier
                    .send_message(&format!(
                        "**Session timeout** after {}h. Open positions left untouched.",
                        config.session_hours
                    ))
                    .await
                    .ok();
                final_status = "timeout";
                break;
            }
            Err(e) => {
                tracing::error!("Error in trading cycle: {}", e);
                notifier
                    .send_message(&format!(
                        "**Cycle Error** (cycle #{}): {}\n_Agent is still running._",
                        state.session.cycles + 1,
                        e
                    ))
                    .await
                    .ok();

                let consecutive = state.session.record_cycle_error();
                if consecutive >= MAX_CONSECUTIVE_FAILURES {
                    tracing::warn!(
                        "{} consecutive failed cycles — cooling down for {:?}",
                        consecutive,
                        FAILURE_COOLDOWN
                    );
                    sleep_or_shutdown(FAILURE_COOLDOWN, &shutdown_notify, &shutdown_flag).await;
                    state.session.reset_errors();
                }
            }
        }

        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        // Self-paced sleep: compensate for cycle work, floor at 1s.
        let multiplier = if config.volatility_detection_enabled {
            state.monitor.global().sleep_multiplier()
        } else {
            1.0
        };
        let target = base_interval.mul_f64(multiplier);
        let sleep_for = target
            .saturating_sub(cycle_start.elapsed())
            .max(Duration::from_secs(1));
        tracing::debug!(
            "sleeping {:.0}s (interval x{:.2})",
            sleep_for.as_secs_f64(),
            multiplier
        );
        sleep_or_shutdown(sleep_for, &shutdown_notify, &shutdown_flag).await;
    }

    // 10. Orderly shutdown: flush lessons, close the session row, report.
    let report = state.recorder.lesson_report();
    if !report.is_empty() {
        if let Ok(json) = serde_json::to_string(&report) {
            trade_log.save_state("filter_lessons", &json).await.ok();
        }
        tracing::info!("{}", report.render());
    }

    if let Err(e) = trade_log
        .close_session(
            &session_id,
            final_status,
            state.session.realized_pnl,
            state.session.wins,
            state.session.losses,
            state.session.cycles,
        )
        .await
    {
        tracing::warn!("failed to close session record: {}", e);
    }

    agent_metrics.log_metrics();
    tracing::info!(
        "Session {} ended ({}) — PnL ${:.2}, {} wins / {} losses ({} contrarian {}/{})",
        session_id,
        final_status,
        state.session.realized_pnl,
        state.session.wins,
        state.session.losses,
        state.session.contrarian_wins + state.session.contrarian_losses,
        state.session.contrarian_wins,
        state.session.contrarian_losses,
    );

    notifier
        .send_message(&format!(
            "**Perp Agent Stopped** ({}) — session PnL ${:.2}, win rate {:.0}%",
            final_status,
            state.session.realized_pnl,
            state.session.win_rate() * 100.0
        ))
        .await
        .ok();

    tracing::info!("Perp agent shut down.");
    Ok(())
}

/// Best-effort close of every open position when the circuit breaker
/// trips. Individual failures are logged, not retried.
async fn close_all_positions(exchange: &dyn Exchange) {
    let positions = match exchange.fetch_positions().await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("could not list positions for circuit-breaker close: {}", e);
            return;
        }
    };

    for position in positions {
        if let Err(e) = exchange.cancel_open_orders(&position.coin).await {
            tracing::warn!("failed to cancel orders for {}: {}", position.coin, e);
        }
        match exchange.close_position(&position.coin).await {
            Ok(_) => tracing::info!("closed {} during halt", position.coin),
            Err(e) => {
                tracing::error!("failed to close {} during halt: {}", position.coin, e);
            }
        }
    }
}

/// Sleep that wakes early on the shutdown signal.
async fn sleep_or_shutdown(duration: Duration, notify: &Notify, flag: &AtomicBool) {
    if flag.load(Ordering::SeqCst) {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = notify.notified() => {}
    }
}
