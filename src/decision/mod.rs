// =============================================================================
// Decision engine (C10)
// =============================================================================
//
// Evaluated once per tick per active mode, against that mode's isolated
// `ModeContext` and the tick's shared `MarketSnapshot`. Ten steps, in order:
// mode filters, regime gating, AI override, sniper-style filters, signal
// formation, edge check, microstructure confirmation, cost-aware filter,
// liquidation pressure adjustment, entry-delay confirmation. Any step can
// short-circuit to HOLD; the short-circuit idiom follows smart_filters.rs's
// `Option<reason>` gate chain. The microstructure ensemble in step 7 follows
// the weighted-signal shape of signals/weighted_score.rs, simplified to the
// three book-derived readings the snapshot carries.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::bridge::{AiCommand, BridgeCommand};
use crate::config::{DecisionThresholds, FeeSchedule};
use crate::market::liquidation_pressure::DirectionalBias;
use crate::market::regime::MarketRegime;
use crate::market::snapshot::MarketSnapshot;
use crate::market::vpin::VpinLevel;
use crate::market::{PressureLevel, Recommendation, ReversalRisk};
use crate::modes::{ModeContext, PendingEntry, StrategyStyle};
use crate::types::{Direction, SnapshotRegime, WhaleSignal};

/// Direction probes hold this long between unconditional probe emissions,
/// distinct from the per-mode `entry_cooldown_secs` used by every other
/// style.
pub const PROBE_COOLDOWN_SECS: u64 = 10;

const MOMENTUM_FLOOR_PCT: f64 = 0.05;
const VOLATILITY_GUARD_MULTIPLIER: f64 = 0.5;
const MIN_NET_EDGE_PCT: f64 = 0.3;
const MICROSTRUCTURE_ENSEMBLE_THRESHOLD: f64 = 0.15;
/// Confidence assigned to a fresh whale-driven signal, independent of the
/// underlying whale tracker's own quality grading.
const WHALE_SIGNAL_CONFIDENCE: f64 = 0.75;
const WHALE_SIGNAL_MAX_AGE_SECS: i64 = 60;
/// "ABSOLUTE RULE #1": a whale print this dominant overrides whatever the AI
/// bridge said, for AI-driven styles only.
const WHALE_DOMINANCE_OVERRIDE_RATIO: f64 = 0.70;
/// Trend style needs at least this many consecutive closed bars confirming
/// the current structure direction before it trusts it.
const TREND_MIN_PERSISTENCE: u32 = 3;
/// Below this, the trend reading is too weak to be worth trading either way.
const TREND_MIN_STRENGTH_PCT: f64 = 3.0;
/// Scalper needs at least this much combined OBI-velocity/microprice-pressure
/// impulse before a micro-move is worth chasing.
const SCALPER_MICRO_IMPULSE_FLOOR: f64 = 4e-4;
/// Reversion needs a range at least this wide (percent of mid) to have room
/// to mean-revert into.
const REVERSION_MIN_RANGE_WIDTH_PCT: f64 = 0.15;
const REVERSION_RANGE_POSITION_LOW: f64 = 0.22;
const REVERSION_RANGE_POSITION_HIGH: f64 = 0.78;
/// Maximum number of same-direction AI pyramid adds allowed open at once.
const MAX_PYRAMID_ORDERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Long,
    Short,
    Hold,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub size_multiplier: f64,
    pub cascade_aligned: bool,
    pub lp_whale_burst_extreme_aligned: bool,
    /// Set when an AI bridge issued ADD_LONG/ADD_SHORT against an
    /// already-open position rather than a fresh directional entry — these
    /// bypass the single-open-position gate and stack instead of replacing.
    pub is_pyramid_add: bool,
}

impl Decision {
    fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.into(),
            size_multiplier: 1.0,
            cascade_aligned: false,
            lp_whale_burst_extreme_aligned: false,
            is_pyramid_add: false,
        }
    }

    fn entry(action: Action, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            reason: reason.into(),
            size_multiplier: 1.0,
            cascade_aligned: false,
            lp_whale_burst_extreme_aligned: false,
            is_pyramid_add: false,
        }
    }
}

pub(crate) fn style_key(style: StrategyStyle) -> &'static str {
    match style {
        StrategyStyle::Baseline => "baseline",
        StrategyStyle::Trend => "trend",
        StrategyStyle::Scalper => "scalper",
        StrategyStyle::Reversion => "reversion",
        StrategyStyle::Breakout => "breakout",
        StrategyStyle::Volume => "volume",
        StrategyStyle::Volatility => "volatility",
        StrategyStyle::Whale => "whale",
        StrategyStyle::LpWhaleBurst => "lp_whale_burst",
        StrategyStyle::AiWhaleHunter => "ai_whale_hunter",
        StrategyStyle::AiDragon2 => "ai_dragon2",
        StrategyStyle::AiShrimp => "ai_shrimp",
        StrategyStyle::AiLion => "ai_lion",
        StrategyStyle::DirectionProbeLong => "direction_probe_long",
        StrategyStyle::DirectionProbeShort => "direction_probe_short",
    }
}

fn direction_sign(d: Direction) -> f64 {
    d.sign()
}

pub(crate) fn fee_cost_pct(leverage: f64, taker_rate: f64) -> f64 {
    taker_rate * leverage * 2.0 * 100.0
}

/// OBI / microprice-pressure / signed-volume-rate ensemble. Each input is
/// capped to +/-1 before summing so no single reading with an outsized
/// magnitude can dominate the vote.
pub(crate) fn ensemble_direction(snapshot: &MarketSnapshot) -> Option<Direction> {
    let mut score = 0.0;
    score += snapshot.obi.clamp(-1.0, 1.0);
    score += snapshot.microprice_pressure.clamp(-1.0, 1.0);
    score += snapshot.signed_volume_rate.clamp(-1.0, 1.0);
    if score > MICROSTRUCTURE_ENSEMBLE_THRESHOLD {
        Some(Direction::Long)
    } else if score < -MICROSTRUCTURE_ENSEMBLE_THRESHOLD {
        Some(Direction::Short)
    } else {
        None
    }
}

/// `signal_score` is kept as the literal `|obi| * 2` reduction rather than a
/// fabricated ensemble score — the real ensemble read lives in step 7's
/// microstructure confirmation.
pub(crate) fn compute_signal_score(snapshot: &MarketSnapshot) -> f64 {
    snapshot.obi.abs() * 2.0
}

/// Inputs gathered once per tick outside the per-mode loop: the regime
/// classification, the most recent whale print (if any, regardless of which
/// mode will end up consuming it), and the AI bridge command for this
/// specific mode (`None` for non-AI styles).
pub struct DecisionInputs<'a> {
    pub snapshot: &'a MarketSnapshot,
    pub regime: MarketRegime,
    pub thresholds: &'a DecisionThresholds,
    pub fees: &'a FeeSchedule,
    pub recent_whale: Option<&'a WhaleSignal>,
    pub ai_command: Option<&'a AiCommand>,
    /// Current grading of the whale tracker's recent print quality; `None`
    /// until enough large trades have accumulated to grade.
    pub whale_recommendation: Option<Recommendation>,
    /// Reversal-risk classification of the whale tracker's latest update.
    pub whale_reversal_risk: ReversalRisk,
    /// Seconds remaining on the whale-flip reversal cooldown, 0 if clear.
    pub whale_cooldown_remaining_secs: i64,
    pub now: Instant,
    pub now_utc: DateTime<Utc>,
}

/// Run the full ten-step pipeline for one mode on one tick.
pub fn decide(ctx: &mut ModeContext, inputs: &DecisionInputs<'_>) -> Decision {
    let style = ctx.style;
    let snapshot = inputs.snapshot;

    // --- Step 1: mode filters -----------------------------------------------
    if style.is_direction_probe() {
        if let Some(last) = ctx.last_entry_time {
            if inputs.now.duration_since(last).as_secs() < PROBE_COOLDOWN_SECS {
                return Decision::hold("probe_cooldown");
            }
        }
    }

    match style {
        StrategyStyle::Trend => {
            let weak_trend = (snapshot.trend_confidence * 100.0).abs() < TREND_MIN_STRENGTH_PCT;
            if snapshot.structure.structure_break
                || snapshot.structure.persistence < TREND_MIN_PERSISTENCE
                || weak_trend
                || snapshot.regime == SnapshotRegime::Consolidation
            {
                return Decision::hold("trend_structure_not_ready");
            }
        }
        StrategyStyle::Scalper => {
            let micro_impulse = snapshot.obi_velocity.abs() + snapshot.microprice_pressure.abs();
            if micro_impulse < SCALPER_MICRO_IMPULSE_FLOOR {
                return Decision::hold("scalper_micro_impulse_too_weak");
            }
        }
        StrategyStyle::Reversion => {
            let near_range_edge =
                snapshot.range_position <= REVERSION_RANGE_POSITION_LOW || snapshot.range_position >= REVERSION_RANGE_POSITION_HIGH;
            if snapshot.range_width < REVERSION_MIN_RANGE_WIDTH_PCT || !near_range_edge {
                return Decision::hold("reversion_range_not_ready");
            }
        }
        _ => {}
    }

    // --- Step 2: regime gating (AI styles are exempt; see step 3) ----------
    if !style.is_ai_driven() {
        let key = style_key(style);
        if !inputs.regime.allowed_mode_styles().contains(&key) {
            return Decision::hold(format!("regime_gate_{}", inputs.regime));
        }
    }

    // --- Step 3: AI modes fully override the generic pipeline --------------
    if style.is_ai_driven() {
        return decide_ai(ctx, inputs);
    }

    // Direction probes bypass every filter below once their cooldown and
    // regime gate clear — they exist purely to sample market direction.
    if let Some(direction) = style.probe_direction() {
        let action = match direction {
            Direction::Long => Action::Long,
            Direction::Short => Action::Short,
        };
        return Decision::entry(action, 1.0, "direction_probe");
    }

    // --- Step 4: filters common to sniper styles ----------------------------
    if ctx.has_open_position() {
        return Decision::hold("position_open");
    }
    if ctx.in_entry_cooldown(inputs.now) {
        return Decision::hold("entry_cooldown");
    }
    if ctx.in_loss_cooldown(inputs.now) {
        return Decision::hold("loss_cooldown");
    }
    if snapshot.spread_bps > inputs.thresholds.max_spread_bps || snapshot.obi.abs() < inputs.thresholds.min_obi_abs {
        return Decision::hold("spread_or_obi_gate");
    }
    if snapshot.regime == SnapshotRegime::Consolidation && !ctx.config.allow_relaxed {
        return Decision::hold("consolidation_gate");
    }
    if matches!(snapshot.vpin_level, VpinLevel::Danger | VpinLevel::Critical) && !ctx.config.allow_relaxed {
        return Decision::hold("vpin_danger_gate");
    }
    if snapshot.vpin_value > inputs.thresholds.vpin_relaxed_gate {
        let worst_case_fee = fee_cost_pct(ctx.config.leverage_cap, inputs.fees.taker_rate);
        let rough_expected_move = snapshot.momentum_pct.abs() - VOLATILITY_GUARD_MULTIPLIER * snapshot.volatility_pct;
        if rough_expected_move <= 2.0 * worst_case_fee {
            return Decision::hold("vpin_elevated_needs_bigger_edge");
        }
    }

    // --- Step 5: signal formation -------------------------------------------
    let whale_trusted = inputs.whale_cooldown_remaining_secs <= 0
        && inputs.whale_reversal_risk != ReversalRisk::Warning
        && !matches!(inputs.whale_recommendation, Some(Recommendation::Wait) | Some(Recommendation::Ignore));
    let whale_fresh = inputs.recent_whale.filter(|w| {
        whale_trusted && (inputs.now_utc - w.ts).num_seconds() <= WHALE_SIGNAL_MAX_AGE_SECS && snapshot.vpin_value <= 0.8
    });

    let mut candidate = if let Some(whale) = whale_fresh {
        Some((whale.direction, WHALE_SIGNAL_CONFIDENCE, "whale_signal"))
    } else {
        let effective_threshold = if ctx.config.allow_relaxed {
            inputs.thresholds.signal_threshold * inputs.thresholds.threshold_discount
        } else {
            inputs.thresholds.signal_threshold
        };
        let signal_score = compute_signal_score(snapshot);
        if snapshot.funding_zscore.abs() > inputs.thresholds.funding_threshold && signal_score > effective_threshold {
            let direction = if snapshot.obi >= 0.0 { Direction::Long } else { Direction::Short };
            let confidence = (signal_score / effective_threshold).min(1.0);
            Some((direction, confidence, "funding_signal"))
        } else {
            None
        }
    };

    if ctx.config.invert_signal {
        candidate = candidate.map(|(dir, conf, reason)| (dir.opposite(), conf, reason));
    }

    let (direction, mut confidence, reason) = match candidate {
        Some(c) => c,
        None => return Decision::hold("no_signal"),
    };

    // --- Step 6: edge check ---------------------------------------------------
    let direction_momentum = snapshot.momentum_pct * direction_sign(direction);
    let expected_move = direction_momentum - VOLATILITY_GUARD_MULTIPLIER * snapshot.volatility_pct;
    let leverage_estimate = ctx.config.leverage_cap;
    let fee_cost = fee_cost_pct(leverage_estimate, inputs.fees.taker_rate);
    let net_edge_pct = expected_move * leverage_estimate - fee_cost;
    if direction_momentum < MOMENTUM_FLOOR_PCT || net_edge_pct < MIN_NET_EDGE_PCT {
        return Decision::hold("edge_check_failed");
    }

    // --- Step 7: microstructure confirmation ---------------------------------
    if !(ctx.config.invert_signal || style == StrategyStyle::LpWhaleBurst) {
        match ensemble_direction(snapshot) {
            Some(ensemble) if ensemble == direction => {}
            _ => return Decision::hold("microstructure_mismatch"),
        }
    }

    // --- Step 8: cost-aware filter --------------------------------------------
    let position_value_estimate = ctx.balance * ctx.config.base_position_pct;
    let net_profit_usd = position_value_estimate * net_edge_pct / 100.0;
    let total_fees_usd = position_value_estimate * fee_cost / 100.0;
    if net_profit_usd < inputs.thresholds.min_net_profit_usd
        || net_profit_usd < total_fees_usd * inputs.thresholds.min_net_profit_fee_ratio
    {
        return Decision::hold("cost_filter");
    }

    // --- Step 9: liquidation pressure adjustment ------------------------------
    let mut size_multiplier = 1.0;
    let mut lp_whale_burst_extreme_aligned = false;
    if let Some(lp) = &snapshot.liquidation_pressure {
        let bias_match = matches!(
            (lp.bias, direction),
            (DirectionalBias::Long, Direction::Long) | (DirectionalBias::Short, Direction::Short)
        );
        if bias_match {
            size_multiplier = (size_multiplier * 1.1).min(inputs.thresholds.lp_size_boost_cap);
            confidence = (confidence + inputs.thresholds.lp_confidence_boost_cap).min(1.0);
        }
        let extreme_conflict = (lp.long_level == PressureLevel::Extreme && direction == Direction::Long)
            || (lp.short_level == PressureLevel::Extreme && direction == Direction::Short);
        if extreme_conflict {
            return Decision::hold("liquidation_pressure_extreme_conflict");
        }
        if style == StrategyStyle::LpWhaleBurst {
            let extreme_aligned = (lp.long_level == PressureLevel::Extreme && direction == Direction::Short)
                || (lp.short_level == PressureLevel::Extreme && direction == Direction::Long);
            lp_whale_burst_extreme_aligned = extreme_aligned;
        }
    }

    let cascade_aligned = snapshot
        .cascade
        .as_ref()
        .map(|c| match (c.action, direction) {
            (crate::market::CascadeAction::Long, Direction::Long) => true,
            (crate::market::CascadeAction::Short, Direction::Short) => true,
            _ => false,
        })
        .unwrap_or(false);

    let action = match direction {
        Direction::Long => Action::Long,
        Direction::Short => Action::Short,
    };

    Decision {
        action,
        confidence,
        reason: reason.to_string(),
        size_multiplier,
        cascade_aligned,
        lp_whale_burst_extreme_aligned,
        is_pyramid_add: false,
    }
}

// =============================================================================
// AI override path (step 3)
// =============================================================================

fn decide_ai(ctx: &mut ModeContext, inputs: &DecisionInputs<'_>) -> Decision {
    let snapshot = inputs.snapshot;

    if snapshot.vpin_level == VpinLevel::Critical {
        return Decision::hold("hard_fuse_vpin_critical");
    }

    if let Some(whale) = inputs.recent_whale {
        let fresh = (inputs.now_utc - whale.ts).num_seconds() <= WHALE_SIGNAL_MAX_AGE_SECS;
        if fresh && whale.dominance_ratio >= WHALE_DOMINANCE_OVERRIDE_RATIO {
            return finalize_entry_delay(ctx, whale.direction, 0.9, "whale_dominance_override", inputs, false);
        }
    }

    let cmd = match inputs.ai_command {
        Some(cmd) => cmd,
        None => return Decision::hold("bridge_unavailable"),
    };
    if cmd.is_stale(inputs.now_utc) {
        return Decision::hold("stale_ai_command");
    }

    // Dead-market grid rules: in a Dead regime the AI bridge can only act on
    // a high-confidence directional read; everything else waits. The floor
    // itself can be nudged by an AI-recommended confidence adjustment from a
    // prior loss review.
    let dead_market_confidence_floor = (0.6 + ctx.ai_confidence_delta).clamp(0.0, 1.0);
    if inputs.regime == MarketRegime::Dead && cmd.confidence < dead_market_confidence_floor {
        return Decision::hold("dead_market_grid_insufficient_confidence");
    }

    let direction = match cmd.command {
        BridgeCommand::Long | BridgeCommand::AddLong => Direction::Long,
        BridgeCommand::Short | BridgeCommand::AddShort => Direction::Short,
        BridgeCommand::Hold | BridgeCommand::Wait | BridgeCommand::CutLoss => return Decision::hold("ai_hold"),
    };
    let is_pyramid_add = matches!(cmd.command, BridgeCommand::AddLong | BridgeCommand::AddShort);

    finalize_entry_delay(ctx, direction, cmd.confidence, "ai_command", inputs, is_pyramid_add)
}

// =============================================================================
// Step 10: entry-delay confirmation (AI styles only)
// =============================================================================

fn finalize_entry_delay(
    ctx: &mut ModeContext,
    direction: Direction,
    confidence: f64,
    reason: &str,
    inputs: &DecisionInputs<'_>,
    is_pyramid_add: bool,
) -> Decision {
    let mid = inputs.snapshot.mid_price;

    let pending = match ctx.pending_entry_signal.take() {
        None => {
            ctx.pending_entry_signal = Some(PendingEntry {
                direction,
                recorded_at: inputs.now,
                recorded_mid_price: mid,
            });
            return Decision::hold(format!("{reason}_pending_confirmation"));
        }
        Some(p) => p,
    };

    if pending.direction != direction {
        ctx.pending_entry_signal = Some(PendingEntry {
            direction,
            recorded_at: inputs.now,
            recorded_mid_price: mid,
        });
        return Decision::hold(format!("{reason}_direction_changed_restart"));
    }

    let move_pct = if pending.recorded_mid_price > 0.0 {
        ((mid - pending.recorded_mid_price) / pending.recorded_mid_price).abs() * 100.0
    } else {
        0.0
    };
    if move_pct > inputs.thresholds.entry_delay_max_move_pct {
        return Decision::hold(format!("{reason}_discarded_excess_move"));
    }

    if inputs.now.duration_since(pending.recorded_at).as_secs() < inputs.thresholds.entry_delay_secs {
        ctx.pending_entry_signal = Some(pending);
        return Decision::hold(format!("{reason}_awaiting_delay"));
    }

    if is_pyramid_add {
        let open_directions: Vec<Direction> = ctx.orders.iter().filter(|o| !o.is_closed()).map(|o| o.direction).collect();
        if open_directions.iter().any(|&d| d != direction) {
            return Decision::hold("pyramid_add_direction_conflict");
        }
        if open_directions.len() >= MAX_PYRAMID_ORDERS {
            return Decision::hold("pyramid_add_cap_reached");
        }
    }

    let action = match direction {
        Direction::Long => Action::Long,
        Direction::Short => Action::Short,
    };
    let mut decision = Decision::entry(action, confidence, reason);
    decision.is_pyramid_add = is_pyramid_add;
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_mode, ModeConfig};
    use crate::market::snapshot::MarketSnapshot;

    fn ctx_with(style: StrategyStyle, overrides: impl FnOnce(&mut ModeConfig)) -> ModeContext {
        let mut cfg = default_mode(style);
        overrides(&mut cfg);
        ModeContext::new("test", cfg, 1_000.0)
    }

    fn base_inputs(snapshot: &MarketSnapshot, thresholds: &DecisionThresholds, fees: &FeeSchedule) -> DecisionInputs<'_> {
        DecisionInputs {
            snapshot,
            regime: MarketRegime::Ranging,
            thresholds,
            fees,
            recent_whale: None,
            ai_command: None,
            whale_recommendation: None,
            whale_reversal_risk: ReversalRisk::None,
            whale_cooldown_remaining_secs: 0,
            now: Instant::now(),
            now_utc: Utc::now(),
        }
    }

    #[test]
    fn direction_probe_emits_unconditionally_once_regime_allows() {
        let mut ctx = ctx_with(StrategyStyle::DirectionProbeLong, |_| {});
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let mut inputs = base_inputs(&snapshot, &thresholds, &fees);
        inputs.regime = MarketRegime::Dead;
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.action, Action::Long);
    }

    #[test]
    fn direction_probe_holds_outside_dead_regime() {
        let mut ctx = ctx_with(StrategyStyle::DirectionProbeLong, |_| {});
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.reason.starts_with("regime_gate"));
    }

    #[test]
    fn open_position_holds_regardless_of_signal() {
        let mut ctx = ctx_with(StrategyStyle::Baseline, |_| {});
        ctx.orders.push(crate::orders::SimulatedOrder::new_taker(
            "baseline",
            Direction::Long,
            10.0,
            1.0,
            100.0,
            100.0,
            100.0,
            3.0,
            1.5,
            0.5,
            60,
            4.0,
            120,
            0.2,
            0.3,
            1.0,
            "prior",
        ));
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason, "position_open");
    }

    #[test]
    fn wide_spread_holds_before_signal_formation() {
        let mut ctx = ctx_with(StrategyStyle::Baseline, |_| {});
        let mut snapshot = MarketSnapshot::default();
        snapshot.spread_bps = 50.0;
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "spread_or_obi_gate");
    }

    #[test]
    fn ai_style_without_bridge_command_holds() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "bridge_unavailable");
    }

    #[test]
    fn ai_style_stages_pending_entry_before_confirming() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let cmd = AiCommand {
            command: BridgeCommand::Long,
            direction: crate::bridge::BridgeDirection::Bullish,
            confidence: 0.8,
            leverage: None,
            whale_reversal_price: None,
            stop_loss_pct: None,
            dynamic_params: None,
            timestamp: Utc::now(),
            recommended_adjustments: None,
        };
        let mut inputs = base_inputs(&snapshot, &thresholds, &fees);
        inputs.ai_command = Some(&cmd);
        let first = decide(&mut ctx, &inputs);
        assert_eq!(first.action, Action::Hold);
        assert!(ctx.pending_entry_signal.is_some());

        inputs.now = inputs.now + std::time::Duration::from_secs(thresholds.entry_delay_secs + 1);
        let second = decide(&mut ctx, &inputs);
        assert_eq!(second.action, Action::Long);
    }

    #[test]
    fn trend_holds_when_structure_not_persistent() {
        let mut ctx = ctx_with(StrategyStyle::Trend, |_| {});
        let mut snapshot = MarketSnapshot::default();
        snapshot.structure.persistence = 1;
        snapshot.trend_confidence = 0.5;
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "trend_structure_not_ready");
    }

    #[test]
    fn scalper_holds_on_weak_micro_impulse() {
        let mut ctx = ctx_with(StrategyStyle::Scalper, |_| {});
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "scalper_micro_impulse_too_weak");
    }

    #[test]
    fn reversion_holds_outside_range_edges() {
        let mut ctx = ctx_with(StrategyStyle::Reversion, |_| {});
        let mut snapshot = MarketSnapshot::default();
        snapshot.range_width = 0.5;
        snapshot.range_position = 0.5;
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "reversion_range_not_ready");
    }

    fn open_long_order(mode: &str) -> crate::orders::SimulatedOrder {
        crate::orders::SimulatedOrder::new_taker(
            mode,
            Direction::Long,
            10.0,
            1.0,
            100.0,
            100.0,
            100.0,
            3.0,
            1.5,
            0.5,
            60,
            4.0,
            120,
            0.2,
            0.3,
            1.0,
            "prior",
        )
    }

    fn ai_add_cmd(direction: crate::bridge::BridgeDirection, command: BridgeCommand) -> AiCommand {
        AiCommand {
            command,
            direction,
            confidence: 0.9,
            leverage: None,
            whale_reversal_price: None,
            stop_loss_pct: None,
            dynamic_params: None,
            timestamp: Utc::now(),
            recommended_adjustments: None,
        }
    }

    #[test]
    fn pyramid_add_stacks_same_direction_past_open_position_gate() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        ctx.orders.push(open_long_order("ai_dragon2"));
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let cmd = ai_add_cmd(crate::bridge::BridgeDirection::Bullish, BridgeCommand::AddLong);
        let mut inputs = base_inputs(&snapshot, &thresholds, &fees);
        inputs.ai_command = Some(&cmd);

        let first = decide(&mut ctx, &inputs);
        assert_eq!(first.action, Action::Hold);
        inputs.now = inputs.now + std::time::Duration::from_secs(thresholds.entry_delay_secs + 1);
        let second = decide(&mut ctx, &inputs);
        assert_eq!(second.action, Action::Long);
        assert!(second.is_pyramid_add);
    }

    #[test]
    fn pyramid_add_rejects_opposite_direction() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        ctx.orders.push(open_long_order("ai_dragon2"));
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let cmd = ai_add_cmd(crate::bridge::BridgeDirection::Bearish, BridgeCommand::AddShort);
        let mut inputs = base_inputs(&snapshot, &thresholds, &fees);
        inputs.ai_command = Some(&cmd);

        let _ = decide(&mut ctx, &inputs);
        inputs.now = inputs.now + std::time::Duration::from_secs(thresholds.entry_delay_secs + 1);
        let second = decide(&mut ctx, &inputs);
        assert_eq!(second.action, Action::Hold);
        assert_eq!(second.reason, "pyramid_add_direction_conflict");
    }

    #[test]
    fn pyramid_add_caps_at_three_open_orders() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        for _ in 0..3 {
            ctx.orders.push(open_long_order("ai_dragon2"));
        }
        let snapshot = MarketSnapshot::default();
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let cmd = ai_add_cmd(crate::bridge::BridgeDirection::Bullish, BridgeCommand::AddLong);
        let mut inputs = base_inputs(&snapshot, &thresholds, &fees);
        inputs.ai_command = Some(&cmd);

        let _ = decide(&mut ctx, &inputs);
        inputs.now = inputs.now + std::time::Duration::from_secs(thresholds.entry_delay_secs + 1);
        let second = decide(&mut ctx, &inputs);
        assert_eq!(second.action, Action::Hold);
        assert_eq!(second.reason, "pyramid_add_cap_reached");
    }

    #[test]
    fn vpin_critical_hard_fuses_ai_styles() {
        let mut ctx = ctx_with(StrategyStyle::AiDragon2, |_| {});
        let mut snapshot = MarketSnapshot::default();
        snapshot.vpin_level = VpinLevel::Critical;
        let thresholds = DecisionThresholds::default();
        let fees = FeeSchedule::default();
        let inputs = base_inputs(&snapshot, &thresholds, &fees);
        let decision = decide(&mut ctx, &inputs);
        assert_eq!(decision.reason, "hard_fuse_vpin_critical");
    }
}
