// =============================================================================
// Main tick loop (C13)
// =============================================================================
//
// A single fixed-cadence loop, `tick_interval_secs` apart (2s by default).
// Each tick: drain whatever raw events arrived since the last tick, feed
// them into the per-component trackers (C2-C7), build one `MarketSnapshot`
// (C8), then walk every enabled mode once — exits before entries, maker
// fills before either. The loop never blocks on network I/O itself; that
// all happens in `ingest::spawn`'s task, decoupled over the channel built
// by `events::channel`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeStore, EngineStatus, FeedbackLoop, StatusBlock};
use crate::config::RuntimeConfig;
use crate::control::ControlState;
use crate::decision::{self, Action, DecisionInputs};
use crate::events::RawEvent;
use crate::indicators::atr::calculate_atr_pct;
use crate::indicators::bollinger::calculate_bollinger;
use crate::indicators::roc::current_roc;
use crate::indicators::rsi::current_rsi;
use crate::indicators::stochastic::calculate_stochastic;
use crate::market::regime::RegimeDetector;
use crate::market::{
    self, BarAggregator, CascadeDetector, LiquidationPressureReader, MarketSnapshot,
    OrderBookTracker, SnapshotInputs, TrendAnalyzer, VpinCalculator, WhaleTracker,
};
use crate::modes::ModeRegistry;
use crate::orders::{self, EntryPlan};
use crate::session::{SessionRecorder, SignalLogRow};
use crate::types::{OrderBook, PriceLevel, Trade, WhaleSignal};

/// How many consecutive 2s ticks between AI-bridge status heartbeats (10s).
const STATUS_WRITE_EVERY_TICKS: u64 = 5;
/// How many ticks between an informational uptime log line (30s).
const LOG_EVERY_TICKS: u64 = 15;
/// How many ticks between checking `runtime_config.json` for edits on disk.
const CONFIG_RELOAD_EVERY_TICKS: u64 = 5;
/// A whale print older than this no longer feeds the decision pipeline.
const WHALE_SIGNAL_CARRY_SECS: i64 = 60;
const RSI_PERIOD: usize = 14;
const STOCH_K_PERIOD: usize = 14;
const STOCH_D_PERIOD: usize = 3;
const BOLLINGER_PERIOD: usize = 20;
const MOMENTUM_PERIOD: usize = 10;
const ATR_PERIOD: usize = 14;

fn ms_to_utc(ts_ms: i64) -> chrono::DateTime<Utc> {
    chrono::DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or_else(Utc::now)
}

/// Everything the tick loop owns for the lifetime of one run. Built once in
/// `main` and handed to `run`.
pub struct Engine {
    pub symbol: String,
    pub config: RuntimeConfig,
    pub config_path: String,
    pub config_loaded_at: std::time::SystemTime,
    pub rx: mpsc::Receiver<RawEvent>,
    pub registry: ModeRegistry,
    pub control: Arc<ControlState>,
    pub recorder: SessionRecorder,
    pub book: OrderBookTracker,
    pub vpin: VpinCalculator,
    pub bars: BarAggregator,
    pub trend: TrendAnalyzer,
    pub whale: WhaleTracker,
    pub cascade: CascadeDetector,
    pub regime: Arc<RegimeDetector>,
    pub liquidation_pressure: LiquidationPressureReader,
    pub funding_rate: f64,
    pub funding_zscore_history: Vec<f64>,
    pub recent_whale: Option<WhaleSignal>,
    pub bridge_stores: std::collections::HashMap<String, BridgeStore>,
    pub feedback: FeedbackLoop,
    pub cascade_has_data: bool,
    pub tick_count: u64,
    pub deadline: Instant,
}

impl Engine {
    pub fn new(
        symbol: String,
        config: RuntimeConfig,
        config_path: String,
        rx: mpsc::Receiver<RawEvent>,
        control: Arc<ControlState>,
        session_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let registry = ModeRegistry::from_configs(&config.modes, config.initial_capital_usdt);
        let recorder = SessionRecorder::new(session_dir.into())?;
        let whale_cfg = &config.whale;
        let whale = WhaleTracker::new(
            whale_cfg.trade_threshold_btc,
            whale_cfg.min_count,
            whale_cfg.min_total,
            whale_cfg.min_dominance,
            whale_cfg.window_secs,
            whale_cfg.min_impact_pct,
        );

        let mut bridge_stores = std::collections::HashMap::new();
        for (name, mode_cfg) in &config.modes {
            if let Some(path) = &mode_cfg.bridge_path {
                bridge_stores.insert(name.clone(), BridgeStore::new(PathBuf::from(path)));
            }
        }

        let tick_period = Duration::from_secs(config.tick_interval_secs.max(1));

        Ok(Self {
            symbol,
            vpin: VpinCalculator::new(config.vpin_bucket_usd, config.vpin_num_buckets),
            config,
            config_path,
            config_loaded_at: std::time::SystemTime::now(),
            rx,
            registry,
            control,
            recorder,
            book: OrderBookTracker::new(),
            bars: BarAggregator::new(),
            trend: TrendAnalyzer::new(),
            whale,
            cascade: CascadeDetector::new(),
            regime: RegimeDetector::new(),
            liquidation_pressure: LiquidationPressureReader::new("liquidation_pressure.json"),
            funding_rate: 0.0,
            funding_zscore_history: Vec::with_capacity(256),
            recent_whale: None,
            bridge_stores,
            feedback: FeedbackLoop::default(),
            cascade_has_data: false,
            tick_count: 0,
            deadline: Instant::now() + tick_period,
        })
    }

    /// Run until the caller's process is asked to stop. `max_ticks` is
    /// `None` for "run forever" (the normal case); the duration-bounded
    /// paper session is enforced by the caller comparing elapsed wall time.
    pub async fn run(mut self) {
        let tick_period = Duration::from_secs(self.config.tick_interval_secs.max(1));
        self.deadline = Instant::now() + tick_period;

        loop {
            if self.control.is_kill_requested() {
                info!("kill requested — engine stopping");
                break;
            }

            self.drain_events();

            if !self.control.is_paused() {
                self.tick();
            }

            self.tick_count += 1;
            self.maybe_reload_config();

            let now = Instant::now();
            if now < self.deadline {
                tokio::time::sleep(self.deadline - now).await;
            } else {
                debug!("tick loop fell behind schedule, catching up immediately");
            }
            self.deadline += tick_period;
        }
    }

    /// Drain whatever arrived on the ingestion channel since the last tick
    /// without blocking — the channel is the only boundary between the
    /// network task and this loop, so a tick never waits on it.
    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                RawEvent::Depth(d) => {
                    let bids: Vec<PriceLevel> = d.bids;
                    let asks: Vec<PriceLevel> = d.asks;
                    self.book.on_depth_snapshot(OrderBook {
                        bids,
                        asks,
                        update_ts: d.ts_ms,
                    });
                    if let Some(mid) = self.book.book().mid_price() {
                        self.bars.on_mid_price(d.ts_ms, mid);
                        let obi = self.book.indicators().obi;
                        let bias = self.large_trade_bias();
                        let vpin_value = self.vpin.state().vpin;
                        self.trend.on_sample(d.ts_ms, mid, obi, bias, vpin_value);
                        self.cascade.on_price(ms_to_utc(d.ts_ms), mid);
                    }
                }
                RawEvent::Ticker(t) => {
                    if t.best_bid > 0.0 && t.best_ask > 0.0 {
                        let mid = (t.best_bid + t.best_ask) / 2.0;
                        self.bars.on_mid_price(t.ts_ms, mid);
                    }
                }
                RawEvent::Trade(t) => {
                    let trade = Trade {
                        ts_ms: t.ts_ms,
                        price: t.price,
                        qty: t.qty,
                        buyer_is_maker: t.buyer_is_maker,
                    };
                    self.book.on_trade(&trade);
                    let usd_value = trade.price * trade.qty;
                    self.vpin.add_trade(usd_value, !trade.buyer_is_maker);
                    self.bars.on_trade_volume(trade.qty);
                    if let Some(signal) =
                        self.whale.on_trade(ms_to_utc(t.ts_ms), t.qty, t.price, t.buyer_is_maker)
                    {
                        let flipped = self
                            .recent_whale
                            .as_ref()
                            .map(|prev| prev.direction != signal.direction)
                            .unwrap_or(false);
                        if flipped {
                            for ctx in self.registry.iter() {
                                self.recorder.record_whale_flip(&ctx.name, &signal);
                            }
                        }
                        self.recent_whale = Some(signal);
                    }
                }
                RawEvent::Liquidation(f) => {
                    let event = crate::types::LiquidationEvent {
                        ts_ms: f.ts_ms,
                        side: f.side,
                        qty: f.qty,
                        price: f.price,
                    };
                    self.cascade.on_liquidation(event, Utc::now());
                    self.cascade_has_data = true;
                }
            }
        }
    }

    fn large_trade_bias(&self) -> f64 {
        match &self.recent_whale {
            Some(w) if (Utc::now() - w.ts).num_seconds() <= WHALE_SIGNAL_CARRY_SECS => {
                w.net_qty.signum() * w.dominance_ratio
            }
            _ => 0.0,
        }
    }

    /// `funding_zscore` is not fed by a live funding-rate stream in this
    /// paper engine — the book's own order imbalance stands in as a cheap,
    /// always-available proxy, scaled so it occupies roughly the same
    /// range a real funding z-score would.
    fn funding_z_proxy(obi: f64) -> f64 {
        obi * 5.0
    }

    fn closed_bars_for_indicators(&self) -> Vec<crate::types::Bar> {
        self.bars.bars_including_current()
    }

    /// Build this tick's `MarketSnapshot` from every tracker's current
    /// read. Bar-derived indicators (RSI, stochastics, Bollinger, ATR,
    /// momentum) are recomputed every tick from the rolling bar window
    /// rather than cached, since a 3s bar interval makes that cheap.
    fn build_snapshot(&mut self, ts_ms: i64) -> MarketSnapshot {
        let book_ind = self.book.indicators();
        let vpin_state = self.vpin.state();
        let bars = self.closed_bars_for_indicators();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let rsi = current_rsi(&closes, RSI_PERIOD).map(|(v, _)| v).unwrap_or(50.0);
        let stoch = calculate_stochastic(&bars, STOCH_K_PERIOD, STOCH_D_PERIOD);
        let (stoch_k, stoch_d) = stoch.map(|s| (s.k, s.d)).unwrap_or((50.0, 50.0));
        let bb = calculate_bollinger(&closes, BOLLINGER_PERIOD, 2.0);
        let (ma20, boll_upper, boll_lower) = bb
            .as_ref()
            .map(|b| (b.middle, b.upper, b.lower))
            .unwrap_or((book_ind.mid_price, book_ind.mid_price, book_ind.mid_price));
        let momentum_pct = current_roc(&closes, MOMENTUM_PERIOD).unwrap_or(0.0);
        let volatility_pct = calculate_atr_pct(&bars, ATR_PERIOD).unwrap_or(0.0);

        self.trend.on_bars_closed(&bars);
        let trend_reading = self.trend.trend_reading();
        let atr_abs = crate::indicators::atr::calculate(&bars).unwrap_or(0.0);
        let structure = self.trend.structure_state(book_ind.mid_price, atr_abs);

        if let Some(regime_state) = self.regime.update(&bars) {
            debug!(regime = %regime_state.regime, confidence = regime_state.confidence, "regime updated");
        }

        let funding_zscore = Self::funding_z_proxy(book_ind.obi);
        self.funding_zscore_history.push(funding_zscore);
        if self.funding_zscore_history.len() > 256 {
            self.funding_zscore_history.remove(0);
        }

        let cascade_signal = if self.cascade_has_data {
            Some(self.cascade.evaluate(Utc::now()))
        } else {
            None
        };
        let liquidation_pressure = self.liquidation_pressure.refresh().cloned();

        market::build_snapshot(SnapshotInputs {
            ts_ms,
            book: &book_ind,
            vpin: &vpin_state,
            funding_rate: self.funding_rate,
            funding_zscore,
            trend: trend_reading,
            structure,
            momentum_pct,
            volatility_pct,
            rsi,
            stoch_k,
            stoch_d,
            ma20,
            bollinger_upper: boll_upper,
            bollinger_middle: ma20,
            bollinger_lower: boll_lower,
            cascade: cascade_signal,
            liquidation_pressure,
            recent_swing_high: self.trend.recent_swing_high(),
            recent_swing_low: self.trend.recent_swing_low(),
        })
    }

    fn tick(&mut self) {
        let ts_ms = Utc::now().timestamp_millis();
        let snapshot = self.build_snapshot(ts_ms);
        let now_instant = Instant::now();
        let now_utc = Utc::now();

        self.whale.check_effectiveness(now_utc, snapshot.mid_price);

        self.process_exits(&snapshot, now_instant, now_utc);
        self.process_entries(&snapshot, now_instant, now_utc, ts_ms);

        self.control.publish_tick(ts_ms, snapshot.mid_price, &self.registry);

        if self.tick_count % STATUS_WRITE_EVERY_TICKS == 0 {
            self.write_bridge_status(&snapshot, now_utc);
        }
        if self.tick_count % LOG_EVERY_TICKS == 0 {
            info!(
                tick = self.tick_count,
                symbol = %self.symbol,
                mid = snapshot.mid_price,
                regime = ?snapshot.regime,
                "engine heartbeat"
            );
        }
    }

    /// Pass 1 over every mode's open orders: maker fills/timeouts, then the
    /// priority-ordered exit ladder (AI force-exit first for AI-driven
    /// styles), collecting ROIs so `apply_post_close` can run in a second
    /// pass without re-borrowing `ctx` while it's already borrowed mutably
    /// by the first.
    fn process_exits(&mut self, snapshot: &MarketSnapshot, now_instant: Instant, now_utc: chrono::DateTime<Utc>) {
        let fees = self.config.fees.clone();

        for ctx in self.registry.iter_mut() {
            let ai_command = self
                .bridge_stores
                .get_mut(&ctx.name)
                .and_then(|s| s.refresh().ai_command.clone());

            if ctx.awaiting_loss_review {
                if let Some(adjustments) = ai_command.as_ref().and_then(|c| c.recommended_adjustments) {
                    ctx.apply_ai_adjustments(&adjustments, now_instant);
                }
            }

            let mut closed_rois: Vec<f64> = Vec::new();

            let mut i = 0;
            while i < ctx.orders.len() {
                let order = &mut ctx.orders[i];
                if order.is_closed() {
                    i += 1;
                    continue;
                }

                if order.is_pending_maker() {
                    orders::tick_maker(order, snapshot, now_instant, fees.maker_rate, fees.taker_rate);
                    if order.is_pending_maker() {
                        i += 1;
                        continue;
                    }
                }

                let forced = if ctx.style.is_ai_driven() {
                    ai_command
                        .as_ref()
                        .and_then(|cmd| orders::evaluate_ai_force_exit(order, cmd, snapshot, now_utc))
                } else {
                    None
                };
                let decision = forced.or_else(|| orders::evaluate_exit(order, snapshot, now_utc));

                if let Some(exit) = decision {
                    let roi = orders::close_order(order, exit.exit_price, exit.reason, now_utc, fees.maker_rate, fees.taker_rate, self.funding_rate);
                    self.recorder.record_trade_close(order);
                    self.feedback.record_close(roi, order.holding_seconds(now_utc));
                    closed_rois.push(roi);
                }
                i += 1;
            }

            for roi in closed_rois {
                orders::apply_post_close(ctx, roi, now_instant);
            }
        }
    }

    /// Pass 2: run the decision pipeline for every mode with no open
    /// position, open a new order on a non-HOLD decision.
    fn process_entries(
        &mut self,
        snapshot: &MarketSnapshot,
        now_instant: Instant,
        now_utc: chrono::DateTime<Utc>,
        ts_ms: i64,
    ) {
        let fees = self.config.fees.clone();
        let maker = self.config.maker.clone();
        let thresholds = self.config.thresholds.clone();
        let regime = self.regime.current_regime().map(|r| r.regime).unwrap_or(crate::market::MarketRegime::Ranging);
        let recent_whale = self.recent_whale.clone();

        let whale_recommendation = recent_whale.as_ref().map(|_| {
            let quality = self.whale.quality_score(snapshot.obi, snapshot.vpin_value, snapshot.mid_price);
            self.whale.grade(quality).1
        });
        let whale_reversal_risk = self.whale.latest_reversal_risk();
        let whale_cooldown_remaining_secs = self.whale.reversal_cooldown_remaining_secs(now_instant);

        for ctx in self.registry.iter_mut() {
            let ai_command = self.bridge_stores.get_mut(&ctx.name).and_then(|s| s.refresh().ai_command.clone());

            let inputs = DecisionInputs {
                snapshot,
                regime,
                thresholds: &thresholds,
                fees: &fees,
                recent_whale: recent_whale.as_ref(),
                ai_command: ai_command.as_ref(),
                whale_recommendation,
                whale_reversal_risk,
                whale_cooldown_remaining_secs,
                now: now_instant,
                now_utc,
            };

            let decision = decision::decide(ctx, &inputs);

            self.control.record_decision(ts_ms, &ctx.name, decision.action, decision.confidence, &decision.reason);

            let micro_signal = decision::ensemble_direction(snapshot)
                .map(|d| match d {
                    crate::types::Direction::Long => "LONG",
                    crate::types::Direction::Short => "SHORT",
                })
                .unwrap_or("FLAT");
            self.recorder.record_signal(&SignalLogRow {
                ts: now_utc,
                mode: ctx.name.as_str(),
                style: ctx.style,
                decision_stage: "final",
                action: decision.action,
                reason: decision.reason.as_str(),
                signal_score: decision::compute_signal_score(snapshot),
                snapshot,
                micro_signal,
                micro_confidence: decision.confidence,
                large_trade_boost: recent_whale.as_ref().map(|w| w.dominance_ratio).unwrap_or(0.0),
                large_trade_direction: recent_whale.as_ref().map(|w| w.direction),
                large_trade_net_qty: recent_whale.as_ref().map(|w| w.net_qty).unwrap_or(0.0),
                entry_reason: decision.reason.as_str(),
                ma_distance: if snapshot.ma20 > 0.0 { (snapshot.mid_price - snapshot.ma20) / snapshot.ma20 } else { 0.0 },
                volume_ratio: 1.0,
            });

            if matches!(decision.action, Action::Hold) {
                continue;
            }
            if ctx.has_open_position() && !decision.is_pyramid_add {
                continue;
            }

            let direction = match decision.action {
                Action::Long => crate::types::Direction::Long,
                Action::Short => crate::types::Direction::Short,
                Action::Hold => unreachable!("filtered above"),
            };

            let plan: EntryPlan = orders::plan_entry(
                ctx,
                direction,
                decision.confidence,
                decision.size_multiplier,
                snapshot,
                &fees,
                &maker,
                decision.cascade_aligned,
                decision.lp_whale_burst_extreme_aligned,
            );
            let order = orders::open_order(ctx, &plan, snapshot, &fees, &maker, decision.reason.clone(), now_instant);
            ctx.orders.push(order);
        }
    }

    fn write_bridge_status(&mut self, snapshot: &MarketSnapshot, now_utc: chrono::DateTime<Utc>) {
        let whale_status = self
            .recent_whale
            .as_ref()
            .map(|w| {
                let quality = self.whale.quality_score(snapshot.obi, snapshot.vpin_value, snapshot.mid_price);
                let (grade, recommendation) = self.whale.grade(quality);
                let effectiveness = self.whale.effectiveness_rate(w.direction);
                format!(
                    "{:?} dominance={:.2} grade={:?} recommendation={:?} effectiveness={:.2}",
                    w.direction, w.dominance_ratio, grade, recommendation, effectiveness
                )
            })
            .unwrap_or_else(|| "none".to_string());
        let market_microstructure = format!("obi={:.3} spread_bps={:.2}", snapshot.obi, snapshot.spread_bps);
        let liquidation_cascade = snapshot
            .cascade
            .as_ref()
            .map(|c| format!("{:?}/{:?}", c.level, c.direction))
            .unwrap_or_else(|| "quiet".to_string());
        let risk_indicators = format!("vpin={:.3}", snapshot.vpin_value);

        for (name, store) in self.bridge_stores.iter_mut() {
            let Some(ctx) = self.registry.get(name) else { continue };

            let mut status = StatusBlock {
                status: EngineStatus::Idle,
                position: None,
                entry_price: None,
                current_pnl_usdt: None,
                current_pnl_pct: None,
                holding_seconds: None,
                whale_status: whale_status.clone(),
                market_microstructure: market_microstructure.clone(),
                volatility: snapshot.volatility_pct,
                liquidation_cascade: liquidation_cascade.clone(),
                risk_indicators: risk_indicators.clone(),
                direction_probes: String::new(),
                loss_review: None,
            };

            if let Some(order) = ctx.orders.iter().rev().find(|o| !o.is_closed() && !o.is_pending_maker()) {
                status.status = EngineStatus::InPosition;
                status.position = Some(order.direction);
                status.entry_price = Some(order.actual_entry_price);
                let pnl_pct = order.unrealized_pnl_pct(snapshot.mid_price);
                status.current_pnl_pct = Some(pnl_pct);
                status.current_pnl_usdt = Some(pnl_pct / 100.0 * order.position_value);
                status.holding_seconds = Some(order.holding_seconds(now_utc));
            }
            if ctx.awaiting_loss_review {
                status.loss_review = Some(crate::bridge::LossReviewRequest {
                    roi_pct: ctx.last_close_roi_pct.unwrap_or(0.0),
                    consecutive_losses: ctx.consecutive_losses,
                    requested_at: now_utc,
                });
            }
            if let Err(e) = store.write_status(status, self.feedback.clone(), None) {
                warn!(mode = %name, error = %e, "failed to write bridge status");
            }
        }
    }

    fn maybe_reload_config(&mut self) {
        if self.tick_count % CONFIG_RELOAD_EVERY_TICKS != 0 {
            return;
        }
        if RuntimeConfig::is_modified_since(&self.config_path, self.config_loaded_at) {
            info!(path = %self.config_path, "runtime config changed on disk, reloading");
            self.config = RuntimeConfig::load(&self.config_path);
            self.config_loaded_at = std::time::SystemTime::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_z_proxy_scales_obi() {
        assert_eq!(Engine::funding_z_proxy(0.0), 0.0);
        assert!((Engine::funding_z_proxy(0.1) - 0.5).abs() < 1e-9);
        assert!((Engine::funding_z_proxy(-0.2) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn ms_to_utc_roundtrips_through_millis() {
        let ts_ms = 1_700_000_000_123i64;
        let dt = ms_to_utc(ts_ms);
        assert_eq!(dt.timestamp_millis(), ts_ms);
    }

    #[test]
    fn ms_to_utc_falls_back_on_out_of_range_input() {
        let dt = ms_to_utc(i64::MAX);
        assert!(dt.timestamp_millis() > 0);
    }
}
