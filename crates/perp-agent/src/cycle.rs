use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agent_core::{
    ConfidenceScorer, Exchange, IndicatorFeed, IndicatorSnapshot, Interval, MarketOrderRequest,
    OrderStatus, Position, Provenance, ScoreRequest, SentimentFeed, SentimentSnapshot, Signal,
    StrategyCategory,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use hyperliquid_client::PaperExchange;
use near_miss_lab::NearMissRecorder;
use position_sizer::PositionSizer;
use rand::Rng;
use risk_governor::{RiskVerdict, Session};
use signal_engine::{evaluate_entry, evaluate_exit, AgentState, EntryContext};
use tokio::sync::Semaphore;
use volatility_monitor::VolatilityMonitor;

use crate::config::AgentConfig;
use crate::metrics::AgentMetrics;
use crate::notifier::DiscordNotifier;
use crate::retry::with_retry;
use crate::trade_log::TradeLog;

/// Concurrent per-coin indicator fetches during the entry scan.
const SCAN_CONCURRENCY: usize = 4;
/// Cadence for near-miss reconciliation and lesson persistence.
const RECONCILE_INTERVAL_MINUTES: i64 = 60;

/// The collaborators the loop talks to. `paper` is a second handle to the
/// same venue when running dry, used to push mark prices into it.
pub struct Collaborators {
    pub exchange: Arc<dyn Exchange>,
    pub paper: Option<Arc<PaperExchange>>,
    pub indicators: Arc<dyn IndicatorFeed>,
    pub sentiment: Option<Arc<dyn SentimentFeed>>,
    pub scorer: Arc<dyn ConfidenceScorer>,
}

/// Signal provenance plus the trade-log row of the open position.
pub struct TradeProvenance {
    pub provenance: Provenance,
    pub trade_id: Option<i64>,
}

/// All mutable loop state. Single writer: the control loop itself; nothing
/// here is shared with another task.
pub struct LoopState {
    pub agent_state: AgentState,
    pub monitor: VolatilityMonitor,
    pub recorder: NearMissRecorder,
    pub session: Session,
    pub provenance: HashMap<String, TradeProvenance>,
    pub last_reconcile: DateTime<Utc>,
}

/// One full trading cycle: risk check, exits, reconciliation, sentiment,
/// entry scan, at most one entry, volatility bookkeeping.
#[allow(clippy::too_many_arguments)]
pub async fn run_trading_cycle(
    collab: &Collaborators,
    config: &AgentConfig,
    volatile_coins: &HashSet<String>,
    sizer: &PositionSizer,
    state: &mut LoopState,
    trade_log: &TradeLog,
    notifier: &DiscordNotifier,
    metrics: &mut AgentMetrics,
    session_id: &str,
) -> Result<RiskVerdict> {
    let cycle_start = AgentMetrics::start_timer();
    let now = Utc::now();

    // 1. Terminal risk conditions, once per cycle.
    let verdict = state.session.check(now);
    if verdict != RiskVerdict::Continue {
        return Ok(verdict);
    }

    // 2. Current venue state.
    let positions = with_retry("fetch_positions", || collab.exchange.fetch_positions()).await?;
    tracing::info!(
        cycle = state.session.cycles + 1,
        open_positions = positions.len(),
        "starting trading cycle"
    );

    // 3. Exit pass over every open position.
    for epos in &positions {
        let snapshot = match with_retry("fetch_indicators", || {
            collab.indicators.fetch(&epos.coin, Interval::H1)
        })
        .await?
        {
            Some(s) => s,
            None => {
                metrics.coins_skipped += 1;
                continue;
            }
        };

        state.monitor.record_atr(&epos.coin, snapshot.atr);
        if let Some(paper) = &collab.paper {
            paper.set_mark(&epos.coin, snapshot.price).await;
        }

        let position = hydrate_position(epos, state.provenance.get(&epos.coin), now);
        let Some(exit) = evaluate_exit(
            &position,
            snapshot.price,
            &snapshot,
            &mut state.agent_state,
            volatile_coins,
            now,
        ) else {
            continue;
        };

        tracing::info!(
            coin = %position.coin,
            rule = exit.rule,
            reason = %exit.reason,
            "exit signal"
        );

        match with_retry("close_position", || collab.exchange.close_position(&position.coin))
            .await
        {
            Ok(fill) => {
                let exit_price = if fill.avg_price > 0.0 {
                    fill.avg_price
                } else {
                    snapshot.price
                };
                let realized =
                    position.side.sign() * (exit_price - position.entry_price) * position.size;
                let pnl_pct = position.pnl_pct(exit_price);

                state.session.record_close(realized, position.category);
                state.agent_state.on_exit(&position.coin);
                metrics.exits_closed += 1;

                if let Some(tp) = state.provenance.remove(&position.coin) {
                    if let Some(trade_id) = tp.trade_id {
                        if let Err(e) = trade_log
                            .log_trade_close(trade_id, exit.rule, exit_price, realized, pnl_pct)
                            .await
                        {
                            tracing::debug!("failed to record trade close: {}", e);
                        }
                    }
                }

                notifier
                    .send_message(&format!(
                        "**{}** {} {} @ ${:.4}\nP/L: ${:.2} ({:+.2}%)\n{}",
                        exit.rule,
                        position.side.as_str(),
                        position.coin,
                        exit_price,
                        realized,
                        pnl_pct,
                        exit.reason
                    ))
                    .await
                    .ok();
            }
            Err(e) => {
                metrics.orders_failed += 1;
                tracing::error!("failed to close {}: {}", position.coin, e);
            }
        }
    }

    // 4. Hourly near-miss reconciliation and lesson persistence.
    if now - state.last_reconcile >= Duration::minutes(RECONCILE_INTERVAL_MINUTES) {
        state.last_reconcile = now;
        reconcile_near_misses(collab, state, trade_log, notifier, now).await;
    }

    // 5. Advisory sentiment fetch; failures degrade to "unavailable".
    let sentiment = fetch_sentiment(collab, config).await;

    // 6. Parallel per-coin scan for coins without a position.
    let held: HashSet<String> = positions.iter().map(|p| p.coin.clone()).collect();
    let capacity_left = positions.len() < config.max_concurrent_positions;

    let mut best: Option<(Signal, f64, IndicatorSnapshot)> = None;
    if capacity_left {
        let scan_start = AgentMetrics::start_timer();
        let fetched = fetch_scan_snapshots(collab, config, &held).await;
        metrics.record_scan_duration(scan_start);

        for (coin, ind_1h, ind_15m) in fetched {
            metrics.coins_scanned += 1;
            state.monitor.record_atr(&coin, ind_1h.atr);
            if let Some(paper) = &collab.paper {
                paper.set_mark(&coin, ind_1h.price).await;
            }

            let contrarian_draw =
                rand::thread_rng().gen_range(0.0..100.0) < config.contrarian_pct;
            let eval = evaluate_entry(
                &EntryContext {
                    ind_1h: &ind_1h,
                    ind_15m: ind_15m.as_ref(),
                    sentiment: sentiment.get(&coin),
                    contrarian_draw,
                },
                &mut state.agent_state,
            );

            metrics.near_misses_recorded += eval.near_misses.len() as u64;
            state.recorder.record_all(eval.near_misses);

            let Some(signal) = eval.signal else { continue };
            metrics.signals_generated += 1;

            // Blend with the advisory ML score before cross-coin comparison.
            let blended = blend_with_scorer(collab, &signal, &ind_1h, sentiment.get(&coin)).await;
            tracing::info!(
                coin = %signal.coin,
                rule = %signal.rule,
                side = signal.side.as_str(),
                confidence = signal.confidence,
                blended,
                "entry candidate"
            );

            // Highest post-blend confidence wins; ties keep the first.
            match &best {
                Some((_, best_conf, _)) if blended <= *best_conf => {}
                _ => best = Some((signal, blended, ind_1h)),
            }
        }
    }

    // 7. Single decision point: at most one entry per cycle.
    if let Some((signal, blended, snapshot)) = best {
        open_entry(
            collab, config, sizer, state, trade_log, notifier, metrics, session_id, signal,
            blended, &snapshot, now,
        )
        .await?;
    }

    // 8. Volatility state machine; notifications are edge-triggered.
    if config.volatility_detection_enabled {
        if let Some(transition) = state.monitor.refresh_global() {
            notifier
                .send_message(&format!(
                    "**Volatility {} -> {}** — polling interval x{:.2}",
                    transition.from.as_str(),
                    transition.to.as_str(),
                    transition.to.sleep_multiplier()
                ))
                .await
                .ok();
        }
    }

    state.session.record_cycle();
    metrics.finish_cycle(cycle_start);
    tracing::info!(
        cycle = state.session.cycles,
        duration_ms = metrics.last_total_duration_ms,
        realized_pnl = state.session.realized_pnl,
        "cycle complete"
    );

    Ok(RiskVerdict::Continue)
}

/// Join a venue position with the loop's remembered provenance. Positions
/// recovered without provenance (e.g. after a restart) are treated as
/// trend-origin so reversal exits stay active, with the clock restarted.
fn hydrate_position(
    epos: &agent_core::ExchangePosition,
    prov: Option<&TradeProvenance>,
    now: DateTime<Utc>,
) -> Position {
    let (rule, category, opened_at) = match prov {
        Some(tp) => (
            tp.provenance.rule.clone(),
            tp.provenance.category,
            tp.provenance.opened_at,
        ),
        None => ("recovered".to_string(), StrategyCategory::Trend, now),
    };
    Position {
        coin: epos.coin.clone(),
        side: epos.side,
        entry_price: epos.entry_price,
        size: epos.size,
        leverage: epos.leverage,
        opened_at,
        rule,
        category,
    }
}

async fn reconcile_near_misses(
    collab: &Collaborators,
    state: &mut LoopState,
    trade_log: &TradeLog,
    notifier: &DiscordNotifier,
    now: DateTime<Utc>,
) {
    let due = state.recorder.take_due(now);
    if !due.is_empty() {
        tracing::info!(count = due.len(), "reconciling near-misses");
    }
    for nm in due {
        match with_retry("fetch_mid", || collab.exchange.fetch_mid(&nm.coin)).await {
            Ok(price) => state.recorder.record_outcome(&nm, price, now),
            Err(e) => {
                tracing::warn!("dropping near-miss for {}: no price ({})", nm.coin, e);
            }
        }
    }

    let report = state.recorder.lesson_report();
    if report.is_empty() {
        return;
    }
    let rendered = report.render();
    tracing::info!("{}", rendered);
    match serde_json::to_string(&report) {
        Ok(json) => {
            if let Err(e) = trade_log.save_state("filter_lessons", &json).await {
                tracing::debug!("failed to persist lessons: {}", e);
            }
        }
        Err(e) => tracing::debug!("failed to serialize lessons: {}", e),
    }
    notifier.send_message(&rendered).await.ok();
}

async fn fetch_sentiment(
    collab: &Collaborators,
    config: &AgentConfig,
) -> HashMap<String, SentimentSnapshot> {
    let Some(feed) = &collab.sentiment else {
        return HashMap::new();
    };
    match with_retry("fetch_sentiment", || feed.fetch_sentiment(&config.coins)).await {
        Ok(snapshots) => snapshots.into_iter().map(|s| (s.coin.clone(), s)).collect(),
        Err(e) => {
            tracing::warn!("sentiment unavailable, technical-only cycle: {}", e);
            HashMap::new()
        }
    }
}

type ScanRow = (String, IndicatorSnapshot, Option<IndicatorSnapshot>);

/// Fetch 1h + 15m snapshots for every unheld coin, a few coins at a time.
/// Per-coin failures and insufficient history are skips, not cycle errors.
async fn fetch_scan_snapshots(
    collab: &Collaborators,
    config: &AgentConfig,
    held: &HashSet<String>,
) -> Vec<ScanRow> {
    let semaphore = Arc::new(Semaphore::new(SCAN_CONCURRENCY));
    let mut handles = Vec::new();

    for coin in config.coins.iter().filter(|c| !held.contains(*c)) {
        let coin = coin.clone();
        let sem = Arc::clone(&semaphore);
        let indicators = Arc::clone(&collab.indicators);

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return None;
            };
            let ind_1h = match with_retry("fetch_indicators", || {
                indicators.fetch(&coin, Interval::H1)
            })
            .await
            {
                Ok(Some(s)) => s,
                Ok(None) => {
                    tracing::debug!(%coin, "insufficient history, skipping");
                    return None;
                }
                Err(e) => {
                    tracing::warn!("indicator fetch failed for {}: {}", coin, e);
                    return None;
                }
            };
            // The 15m snapshot only refines entry timing; its absence is fine.
            let ind_15m = with_retry("fetch_indicators_15m", || {
                indicators.fetch(&coin, Interval::M15)
            })
            .await
            .ok()
            .flatten();
            Some((coin, ind_1h, ind_15m))
        }));
    }

    let mut rows = Vec::new();
    for handle in handles {
        if let Ok(Some(row)) = handle.await {
            rows.push(row);
        }
    }
    rows
}

async fn blend_with_scorer(
    collab: &Collaborators,
    signal: &Signal,
    snapshot: &IndicatorSnapshot,
    sentiment: Option<&SentimentSnapshot>,
) -> f64 {
    let req = ScoreRequest {
        coin: signal.coin.clone(),
        side: signal.side,
        rule: signal.rule.clone(),
        adx: snapshot.adx.value,
        plus_di: snapshot.adx.plus_di,
        minus_di: snapshot.adx.minus_di,
        rsi: snapshot.rsi,
        macd_histogram: snapshot.macd.histogram,
        bb_width: snapshot.bollinger.width,
        atr_pct: if snapshot.price > 0.0 {
            snapshot.atr / snapshot.price
        } else {
            0.0
        },
        regime: snapshot.regime,
        galaxy_score: sentiment.map(|s| s.galaxy_score),
        sentiment_pct: sentiment.map(|s| s.sentiment_pct),
        alt_rank: sentiment.map(|s| s.alt_rank),
    };

    match with_retry("score_signal", || collab.scorer.score_signal(&req)).await {
        Ok(resp) => ml_client::blend_confidence(signal.confidence, &resp),
        Err(e) => {
            tracing::debug!("scorer unavailable, keeping rule confidence: {}", e);
            signal.confidence
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn open_entry(
    collab: &Collaborators,
    config: &AgentConfig,
    sizer: &PositionSizer,
    state: &mut LoopState,
    trade_log: &TradeLog,
    notifier: &DiscordNotifier,
    metrics: &mut AgentMetrics,
    session_id: &str,
    signal: Signal,
    blended_confidence: f64,
    snapshot: &IndicatorSnapshot,
    now: DateTime<Utc>,
) -> Result<()> {
    let balance = with_retry("fetch_balance", || collab.exchange.fetch_balance()).await?;

    let Some(order) = sizer.size_order(
        balance.available,
        &signal,
        snapshot.price,
        config.leverage,
    ) else {
        tracing::info!(
            coin = %signal.coin,
            available = balance.available,
            "sizing rejected the candidate"
        );
        return Ok(());
    };

    let request = MarketOrderRequest {
        coin: signal.coin.clone(),
        side: signal.side,
        size: order.size,
        leverage: config.leverage,
        slippage_bps: config.slippage_bps,
        tp_sl: None,
    };

    match with_retry("place_market_order", || {
        collab.exchange.place_market_order(&request)
    })
    .await
    {
        Ok(fill) if fill.status == OrderStatus::Filled => {
            let entry_price = if fill.avg_price > 0.0 {
                fill.avg_price
            } else {
                snapshot.price
            };
            let position = Position {
                coin: signal.coin.clone(),
                side: signal.side,
                entry_price,
                size: fill.filled_size.max(order.size),
                leverage: config.leverage,
                opened_at: now,
                rule: signal.rule.clone(),
                category: signal.category,
            };

            state.agent_state.on_entry(&position.coin, now);
            let trade_id = match trade_log.log_trade_open(session_id, &position, &signal).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::debug!("failed to record trade open: {}", e);
                    None
                }
            };
            state.provenance.insert(
                position.coin.clone(),
                TradeProvenance {
                    provenance: Provenance {
                        rule: signal.rule.clone(),
                        category: signal.category,
                        opened_at: now,
                    },
                    trade_id,
                },
            );
            metrics.entries_opened += 1;

            tracing::info!(
                coin = %position.coin,
                side = position.side.as_str(),
                rule = %position.rule,
                size = position.size,
                entry_price,
                "position opened"
            );
            notifier
                .send_message(&format!(
                    "**Opened {} {}** — {} @ ${:.4}\nRule: {} | Confidence: {:.0}% (blended {:.0}%)\nNotional: ${:.2} at {}x\n{}",
                    signal.side.as_str(),
                    signal.coin,
                    order.size,
                    entry_price,
                    signal.rule,
                    signal.confidence * 100.0,
                    blended_confidence * 100.0,
                    order.notional,
                    config.leverage,
                    signal.reason
                ))
                .await
                .ok();
        }
        Ok(fill) => {
            metrics.orders_failed += 1;
            tracing::warn!(
                coin = %signal.coin,
                status = ?fill.status,
                "entry order not filled"
            );
        }
        Err(e) => {
            metrics.orders_failed += 1;
            tracing::error!("entry order failed for {}: {}", signal.coin, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Adx, BollingerBands, Macd, Regime, ScoreResponse, Side};
    use async_trait::async_trait;

    struct FixedFeed {
        snapshots: HashMap<(String, Interval), IndicatorSnapshot>,
    }

    #[async_trait]
    impl IndicatorFeed for FixedFeed {
        async fn fetch(
            &self,
            coin: &str,
            interval: Interval,
        ) -> Result<Option<IndicatorSnapshot>> {
            Ok(self
                .snapshots
                .get(&(coin.to_string(), interval))
                .cloned())
        }
    }

    struct NoScore;

    #[async_trait]
    impl ConfidenceScorer for NoScore {
        async fn score_signal(&self, _req: &ScoreRequest) -> Result<ScoreResponse> {
            Ok(ScoreResponse {
                score: None,
                model_samples: 0,
            })
        }
    }

    fn snapshot(coin: &str, regime: Regime, rsi: f64, price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            coin: coin.to_string(),
            interval: Interval::H1,
            price,
            rsi,
            macd: Macd {
                line: 0.0,
                signal: 0.0,
                histogram: 0.0,
            },
            bollinger: BollingerBands {
                upper: price * 1.03,
                middle: price,
                lower: price * 0.97,
                width: 0.06,
            },
            atr: 1.0,
            adx: Adx {
                value: 15.0,
                plus_di: 20.0,
                minus_di: 20.0,
            },
            regime,
            timestamp: Utc::now(),
        }
    }

    fn trend_snapshot(coin: &str, price: f64) -> IndicatorSnapshot {
        let mut s = snapshot(coin, Regime::Trending, 55.0, price);
        s.adx = Adx {
            value: 30.0,
            plus_di: 25.0,
            minus_di: 10.0,
        };
        s.macd.histogram = 0.01 * price;
        s
    }

    fn test_config(coins: &[&str]) -> AgentConfig {
        AgentConfig {
            dry_run: true,
            interval_minutes: 5,
            coins: coins.iter().map(|c| c.to_string()).collect(),
            max_concurrent_positions: 3,
            max_allocation_pct: 20.0,
            leverage: 3,
            circuit_breaker_usd: 100.0,
            session_hours: 12.0,
            contrarian_pct: 0.0,
            volatility_detection_enabled: true,
            volatile_coins: vec![],
            slippage_bps: 50,
            size_decimals: 3,
            min_confidence: 0.60,
            paper_starting_balance: 10_000.0,
            hl_api_url: String::new(),
            hl_gateway_url: String::new(),
            hl_wallet_address: String::new(),
            indicator_service_url: String::new(),
            ml_scorer_url: String::new(),
            sentiment_enabled: false,
            sentiment_api_url: String::new(),
            sentiment_api_key: String::new(),
            discord_webhook_url: String::new(),
            database_url: String::new(),
        }
    }

    async fn test_fixture(
        snapshots: Vec<IndicatorSnapshot>,
    ) -> (Collaborators, Arc<PaperExchange>, TradeLog, DiscordNotifier) {
        let paper = Arc::new(PaperExchange::new(10_000.0));
        let mut map = HashMap::new();
        for s in snapshots {
            map.insert((s.coin.clone(), s.interval), s);
        }
        let collab = Collaborators {
            exchange: Arc::clone(&paper) as Arc<dyn agent_core::Exchange>,
            paper: Some(Arc::clone(&paper)),
            indicators: Arc::new(FixedFeed { snapshots: map }),
            sentiment: None,
            scorer: Arc::new(NoScore),
        };

        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let trade_log = TradeLog::new(pool);
        trade_log.init_tables().await.unwrap();
        trade_log.register_session("test", "{}").await.unwrap();

        let notifier = DiscordNotifier::new(String::new()).unwrap();
        (collab, paper, trade_log, notifier)
    }

    fn loop_state() -> LoopState {
        LoopState {
            agent_state: AgentState::new(),
            monitor: VolatilityMonitor::new(),
            recorder: NearMissRecorder::new(),
            session: Session::new(100.0, 12.0, Utc::now()),
            provenance: HashMap::new(),
            last_reconcile: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_entry_per_cycle_takes_best_candidate() {
        // AAA fires R3 at 0.65, BBB fires R1 at 0.60: only AAA opens.
        let (collab, paper, trade_log, notifier) = test_fixture(vec![
            trend_snapshot("AAA", 100.0),
            snapshot("BBB", Regime::Quiet, 25.0, 50.0),
        ])
        .await;
        let config = test_config(&["AAA", "BBB"]);
        let sizer = PositionSizer::new(20.0, 3).unwrap();
        let mut state = loop_state();
        let mut metrics = AgentMetrics::new(0);

        let verdict = run_trading_cycle(
            &collab,
            &config,
            &HashSet::new(),
            &sizer,
            &mut state,
            &trade_log,
            &notifier,
            &mut metrics,
            "test",
        )
        .await
        .unwrap();

        assert_eq!(verdict, RiskVerdict::Continue);
        let positions = paper.fetch_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].coin, "AAA");
        assert_eq!(metrics.entries_opened, 1);
        assert_eq!(metrics.signals_generated, 2);
        assert!(state.provenance.contains_key("AAA"));
        assert_eq!(state.provenance["AAA"].provenance.rule, "R3-trend");
    }

    #[tokio::test]
    async fn exit_pass_closes_on_reversal_and_records_pnl() {
        // Open long at 100; snapshot shows RSI at the opposite extreme and a
        // small gain. Held coins are not rescanned, so nothing reopens.
        let mut exit_snap = snapshot("AAA", Regime::Ranging, 72.0, 100.5);
        exit_snap.adx = Adx {
            value: 30.0,
            plus_di: 25.0,
            minus_di: 10.0,
        };
        let (collab, paper, trade_log, notifier) = test_fixture(vec![exit_snap]).await;

        paper.set_mark("AAA", 100.0).await;
        paper
            .place_market_order(&MarketOrderRequest {
                coin: "AAA".to_string(),
                side: Side::Long,
                size: 6.0,
                leverage: 3,
                slippage_bps: 50,
                tp_sl: None,
            })
            .await
            .unwrap();

        let config = test_config(&["AAA"]);
        let sizer = PositionSizer::new(20.0, 3).unwrap();
        let mut state = loop_state();
        state.agent_state.on_entry("AAA", Utc::now());
        state.provenance.insert(
            "AAA".to_string(),
            TradeProvenance {
                provenance: Provenance {
                    rule: "R1-mean-reversion".to_string(),
                    category: StrategyCategory::MeanReversion,
                    opened_at: Utc::now(),
                },
                trade_id: None,
            },
        );
        let mut metrics = AgentMetrics::new(0);

        run_trading_cycle(
            &collab,
            &config,
            &HashSet::new(),
            &sizer,
            &mut state,
            &trade_log,
            &notifier,
            &mut metrics,
            "test",
        )
        .await
        .unwrap();

        assert!(paper.fetch_positions().await.unwrap().is_empty());
        assert_eq!(metrics.exits_closed, 1);
        assert_eq!(state.session.wins, 1);
        // (100.5 - 100) * 6
        assert!((state.session.realized_pnl - 3.0).abs() < 1e-9);
        assert!(!state.provenance.contains_key("AAA"));
    }

    #[tokio::test]
    async fn circuit_breaker_verdict_short_circuits_the_cycle() {
        let (collab, _paper, trade_log, notifier) = test_fixture(vec![]).await;
        let config = test_config(&["AAA"]);
        let sizer = PositionSizer::new(20.0, 3).unwrap();
        let mut state = loop_state();
        state.session.realized_pnl = -150.0;
        let mut metrics = AgentMetrics::new(0);

        let verdict = run_trading_cycle(
            &collab,
            &config,
            &HashSet::new(),
            &sizer,
            &mut state,
            &trade_log,
            &notifier,
            &mut metrics,
            "test",
        )
        .await
        .unwrap();

        assert_eq!(verdict, RiskVerdict::CircuitBreaker);
        assert_eq!(state.session.cycles, 0);
    }

    #[tokio::test]
    async fn insufficient_history_skips_the_coin() {
        // No snapshot at all for AAA: the scan skips it without erroring.
        let (collab, paper, trade_log, notifier) = test_fixture(vec![]).await;
        let config = test_config(&["AAA"]);
        let sizer = PositionSizer::new(20.0, 3).unwrap();
        let mut state = loop_state();
        let mut metrics = AgentMetrics::new(0);

        let verdict = run_trading_cycle(
            &collab,
            &config,
            &HashSet::new(),
            &sizer,
            &mut state,
            &trade_log,
            &notifier,
            &mut metrics,
            "test",
        )
        .await
        .unwrap();

        assert_eq!(verdict, RiskVerdict::Continue);
        assert!(paper.fetch_positions().await.unwrap().is_empty());
        assert_eq!(metrics.entries_opened, 0);
    }
}
