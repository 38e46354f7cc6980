// =============================================================================
// Order lifecycle — creation, maker fill state machine, exit evaluation,
// close accounting
// =============================================================================
//
// Evaluated once per tick, per open order:
//   1. Pending maker orders are checked for fill/timeout first.
//   2. Exit conditions run in priority order; no exit fires before
//      max(min_holding_seconds, 60) seconds have elapsed.
//   3. A fired exit produces close accounting and feeds the mode's
//      consecutive-loss / cooldown bookkeeping.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use crate::bridge::{AiCommand, BridgeCommand};
use crate::config::{FeeSchedule, MakerConfig};
use crate::market::snapshot::MarketSnapshot;
use crate::market::vpin::VpinLevel;
use crate::modes::{ModeContext, StrategyStyle};
use crate::types::{Direction, ExitReason, MakerStatus};

use super::simulated_order::SimulatedOrder;

/// Floor applied to `min_holding_seconds`: no exit is considered before this
/// many seconds regardless of configuration.
const ABSOLUTE_MIN_HOLDING_SECS: u64 = 60;

fn effective_min_holding(order: &SimulatedOrder) -> u64 {
    order.min_holding_seconds.max(ABSOLUTE_MIN_HOLDING_SECS)
}

// =============================================================================
// Maker state machine
// =============================================================================

/// Advance a PENDING maker order: fill, time out into a taker fallback, or
/// leave pending. Returns `true` if the order's state changed this tick.
pub fn tick_maker(order: &mut SimulatedOrder, snapshot: &MarketSnapshot, now: Instant, fee_maker_rate: f64, fee_taker_rate: f64) -> bool {
    if order.maker_status != MakerStatus::Pending {
        return false;
    }

    let elapsed = now.duration_since(order.maker_created_time);
    let timed_out = elapsed >= Duration::from_secs(order.maker_timeout_seconds);

    let limit_price = match order.maker_limit_price {
        Some(p) => p,
        None => return false,
    };

    let filled = match order.direction {
        Direction::Long => snapshot.best_ask <= limit_price,
        Direction::Short => snapshot.best_bid >= limit_price,
    };

    if filled {
        order.actual_entry_price = limit_price;
        order.entry_fee = Some(order.position_value * fee_maker_rate);
        order.maker_status = MakerStatus::Filled;
        order.maker_filled_time = Some(now);
        info!(order_id = %order.order_id, mode = %order.mode, "maker order filled");
        return true;
    }

    if timed_out {
        if order.maker_allow_taker_fallback {
            let mid = snapshot.mid_price;
            let slippage = mid * 0.0002;
            order.actual_entry_price = match order.direction {
                Direction::Long => mid + slippage,
                Direction::Short => mid - slippage,
            };
            order.entry_fee = Some(order.position_value * fee_taker_rate);
            order.maker_status = MakerStatus::TakerFallback;
            order.maker_filled_time = Some(now);
            info!(order_id = %order.order_id, mode = %order.mode, "maker timed out, falling back to taker");
        } else {
            order.maker_status = MakerStatus::Cancelled;
            order.exit_reason = Some(ExitReason::MakerTimeoutCancelled);
            order.exit_time = Some(Utc::now());
            debug!(order_id = %order.order_id, mode = %order.mode, "maker order cancelled on timeout");
        }
        return true;
    }

    false
}

// =============================================================================
// Exit evaluation
// =============================================================================

/// Result of evaluating exit conditions for one order on one tick.
pub struct ExitDecision {
    pub reason: ExitReason,
    pub exit_price: f64,
}

/// Evaluate the full exit priority ladder for one open, filled order.
/// Returns `None` when no exit condition fires this tick.
pub fn evaluate_exit(order: &mut SimulatedOrder, snapshot: &MarketSnapshot, now: chrono::DateTime<Utc>) -> Option<ExitDecision> {
    if order.maker_status == MakerStatus::Pending || order.is_closed() {
        return None;
    }

    let holding_secs = order.holding_seconds(now);
    if holding_secs < effective_min_holding(order) as i64 {
        return None;
    }

    let price = snapshot.mid_price;
    let pnl_pct = order.unrealized_pnl_pct(price);
    order.update_peak(pnl_pct);

    let fee_pct_roundtrip = order.entry_fee.map(|f| f / order.position_value * 100.0).unwrap_or(0.0) * 2.0;
    let net_pnl_pct = pnl_pct - fee_pct_roundtrip;

    // 1. Take profit — net of fees.
    if net_pnl_pct >= order.take_profit_pct {
        return Some(ExitDecision {
            reason: ExitReason::TakeProfit,
            exit_price: price,
        });
    }

    // 5. VPIN spike protection can tighten the stop before we check it.
    apply_vpin_risk_mode(order, snapshot, now);

    // 2. Stop loss — gross pnl against dynamic stop.
    if pnl_pct <= -order.dynamic_stop_loss_pct {
        let reason = if order.vpin_risk_mode {
            ExitReason::VpinProtectiveStop
        } else {
            ExitReason::StopLoss
        };
        return Some(ExitDecision {
            reason,
            exit_price: price,
        });
    }

    // 3. Trailing stop.
    if order.trailing_stop_pct != 0.0 && holding_secs >= 60 {
        let (distance, activation) = if order.trailing_stop_pct > 0.0 {
            (
                order.take_profit_pct * order.trailing_stop_pct,
                order.take_profit_pct * 0.3,
            )
        } else {
            (order.trailing_stop_pct.abs(), 5.0)
        };

        if order.peak_pnl_pct >= activation && (order.peak_pnl_pct - pnl_pct) >= distance {
            return Some(ExitDecision {
                reason: ExitReason::TrailingStop,
                exit_price: price,
            });
        }
    }

    // 4. Time limit.
    let holding_hours = order.holding_hours(now);
    if holding_hours >= order.max_holding_hours {
        let reason = if net_pnl_pct >= 0.0 {
            ExitReason::TimeLimit
        } else {
            ExitReason::TimeStop
        };
        return Some(ExitDecision {
            reason,
            exit_price: price,
        });
    }

    // 5. VPIN lock-profit, once in VPIN-risk mode.
    if order.vpin_risk_mode
        && pnl_pct >= 0.8 * order.take_profit_pct
        && holding_secs >= order.min_reverse_exit_seconds as i64
    {
        return Some(ExitDecision {
            reason: ExitReason::VpinLockProfit,
            exit_price: price,
        });
    }

    // 6. Reverse signal.
    if holding_secs >= order.min_reverse_exit_seconds as i64 && pnl_pct < order.take_profit_pct * 0.4 {
        let reverse = match order.direction {
            Direction::Long => snapshot.obi < -0.3 && order.entry_obi > 0.0,
            Direction::Short => snapshot.obi > 0.3 && order.entry_obi < 0.0,
        };
        if reverse {
            return Some(ExitDecision {
                reason: ExitReason::ReverseSignal,
                exit_price: price,
            });
        }
    }

    None
}

/// Enter or leave VPIN-risk mode (C11 step 5): tighten the dynamic stop
/// while VPIN is spiking, restore the original stop after 120s back below
/// the spike threshold.
fn apply_vpin_risk_mode(order: &mut SimulatedOrder, snapshot: &MarketSnapshot, now: chrono::DateTime<Utc>) {
    const VPIN_SPIKE: f64 = 0.85;
    const VPIN_RESTORE_SECS: i64 = 120;

    if snapshot.vpin_value > VPIN_SPIKE {
        if !order.vpin_risk_mode {
            order.vpin_risk_mode = true;
            order.vpin_risk_trigger_time = Some(Instant::now());
            let fee_cost_min = order
                .entry_fee
                .map(|f| f / order.position_value * 100.0 * 2.0)
                .unwrap_or(0.0);
            order.dynamic_stop_loss_pct = (0.7 * order.stop_loss_pct).max(fee_cost_min).max(1.5);
        }
    } else if order.vpin_risk_mode {
        let elapsed_ok = order
            .vpin_risk_trigger_time
            .map(|t| t.elapsed().as_secs() as i64 >= VPIN_RESTORE_SECS)
            .unwrap_or(true);
        if elapsed_ok {
            order.vpin_risk_mode = false;
            order.vpin_risk_trigger_time = None;
            order.dynamic_stop_loss_pct = order.stop_loss_pct;
        }
    }
    let _ = now;
}

/// AI-driven modes only: the bridge can force an immediate close ahead of
/// the generic priority ladder, on an explicit cut-loss command, on an
/// implied direction flip against the open position, or on a PnL breach of
/// the AI-supplied stop-loss percentage.
pub fn evaluate_ai_force_exit(order: &SimulatedOrder, ai_command: &AiCommand, snapshot: &MarketSnapshot, now: chrono::DateTime<Utc>) -> Option<ExitDecision> {
    if order.maker_status == MakerStatus::Pending || order.is_closed() {
        return None;
    }
    if ai_command.is_stale(now) {
        return None;
    }

    let price = snapshot.mid_price;

    if ai_command.command == BridgeCommand::CutLoss {
        return Some(ExitDecision {
            reason: ExitReason::AiCutLoss,
            exit_price: price,
        });
    }

    if let Some(implied) = ai_command.implied_direction() {
        if implied != order.direction {
            return Some(ExitDecision {
                reason: ExitReason::AiFlip,
                exit_price: price,
            });
        }
    }

    if let Some(stop_loss_pct) = ai_command.stop_loss_pct {
        let pnl_pct = order.unrealized_pnl_pct(price);
        if pnl_pct <= -stop_loss_pct {
            return Some(ExitDecision {
                reason: ExitReason::AiStopLoss,
                exit_price: price,
            });
        }
    }

    None
}

// =============================================================================
// Close accounting
// =============================================================================

/// Close an order at `exit_price` for `reason`, computing fees and pnl, and
/// returns the realized ROI percentage for the caller to feed into
/// `ModeContext::record_close`.
pub fn close_order(
    order: &mut SimulatedOrder,
    exit_price: f64,
    reason: ExitReason,
    now: chrono::DateTime<Utc>,
    maker_fee_rate: f64,
    taker_fee_rate: f64,
    funding_rate_per_8h: f64,
) -> f64 {
    let price_change = order.price_change_pct(exit_price);
    let gross_pnl_usdt = order.position_value * price_change * order.leverage;

    let entry_fee = order.entry_fee.unwrap_or(order.position_value * taker_fee_rate);
    let exit_fee = if order.entry_was_maker() {
        order.position_value * maker_fee_rate
    } else {
        order.position_value * taker_fee_rate
    };
    let holding_hours = order.holding_hours(now);
    let funding_fee = order.position_value * order.leverage * funding_rate_per_8h * holding_hours / 8.0;
    let total_fees = entry_fee + exit_fee + funding_fee;

    let pnl_usdt = gross_pnl_usdt - total_fees;
    let roi = pnl_usdt / order.position_value * 100.0;

    order.exit_price = Some(exit_price);
    order.exit_time = Some(now);
    order.exit_reason = Some(reason);
    order.entry_fee = Some(entry_fee);
    order.exit_fee = Some(exit_fee);
    order.funding_fee = Some(funding_fee);
    order.total_fees = Some(total_fees);
    order.pnl_usdt = Some(pnl_usdt);
    order.roi = Some(roi);

    roi
}

/// Apply C11's post-close hooks: loss-streak cooldown bookkeeping lives on
/// `ModeContext::record_close`; this just threads the ROI through.
pub fn apply_post_close(ctx: &mut ModeContext, roi: f64, now: Instant) {
    ctx.record_close(roi, now);
}

// =============================================================================
// Entry planning — sizing, dynamic leverage, fee-aware TP/SL, maker/taker choice
// =============================================================================

/// Minimal net-of-fee profit target baked into every take-profit, so a
/// position that merely clears its round-trip fees never counts as a win.
const BASE_NET_PROFIT_PCT: f64 = 1.5;
/// Spread above which a maker order would sit too far from touch to be
/// worth the wait; above this the entry goes out as an immediate taker.
const MAKER_URGENCY_SPREAD_BPS: f64 = 2.0;

/// Everything C10 needs decided before a `SimulatedOrder` can be built:
/// direction, size, leverage, and fee-aware exit targets.
pub struct EntryPlan {
    pub direction: Direction,
    pub leverage: f64,
    pub position_value: f64,
    pub size: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub trailing_stop_pct: f64,
    pub use_maker: bool,
    pub maker_limit_price: Option<f64>,
}

/// Compute sizing, dynamic leverage, and fee-aware TP/SL for a new entry.
/// `cascade_aligned` and `lp_whale_burst_extreme_aligned` are passed in by
/// the decision engine, which already knows whether the cascade/liquidation
/// readings it consulted line up with the chosen direction.
#[allow(clippy::too_many_arguments)]
pub fn plan_entry(
    ctx: &ModeContext,
    direction: Direction,
    confidence: f64,
    size_multiplier: f64,
    snapshot: &MarketSnapshot,
    fees: &FeeSchedule,
    maker_cfg: &MakerConfig,
    cascade_aligned: bool,
    lp_whale_burst_extreme_aligned: bool,
) -> EntryPlan {
    let raw_position_value = ctx.balance * ctx.config.base_position_pct * size_multiplier;
    let cap = ctx.balance * ctx.config.base_position_pct * ctx.config.max_size_multiplier;
    let position_value = raw_position_value.min(cap).max(0.0);

    let mode_cap = ctx.config.leverage_cap.min(125.0);
    let mut leverage = ctx.config.leverage_cap * 0.5;
    if confidence >= 0.9 {
        leverage *= 2.0;
    } else if confidence >= 0.8 {
        leverage *= 1.5;
    }
    if snapshot.volatility_pct < 0.001 {
        leverage *= 0.5;
    }
    if lp_whale_burst_extreme_aligned {
        leverage *= 1.5;
    }
    if cascade_aligned {
        leverage *= 1.3;
    }
    leverage *= ctx.ai_leverage_multiplier;
    leverage = leverage.clamp(1.0, mode_cap);

    let fee_cost_pct = fees.taker_rate * leverage * 2.0 * 100.0;
    let take_profit_pct = fee_cost_pct + BASE_NET_PROFIT_PCT;
    let stop_loss_floor = fee_cost_pct + 1.0;
    let stop_loss_pct = ctx
        .ai_stop_loss_override_pct
        .unwrap_or_else(|| (take_profit_pct * 0.5).max(stop_loss_floor));
    let trailing_stop_pct = 0.3;

    let low_urgency = snapshot.spread_bps <= MAKER_URGENCY_SPREAD_BPS
        && !matches!(snapshot.vpin_level, VpinLevel::Danger | VpinLevel::Critical);
    let use_maker = maker_cfg.enabled && low_urgency && ctx.style != StrategyStyle::Breakout;

    let maker_limit_price = use_maker.then(|| {
        let offset = snapshot.mid_price * maker_cfg.maker_offset_bps / 10_000.0;
        match direction {
            Direction::Long => snapshot.mid_price - offset,
            Direction::Short => snapshot.mid_price + offset,
        }
    });

    let size = if snapshot.mid_price > 0.0 {
        position_value * leverage / snapshot.mid_price
    } else {
        0.0
    };

    EntryPlan {
        direction,
        leverage,
        position_value,
        size,
        take_profit_pct,
        stop_loss_pct,
        trailing_stop_pct,
        use_maker,
        maker_limit_price,
    }
}

/// Build and register a `SimulatedOrder` from a finished `EntryPlan`, as
/// either a PENDING maker or a filled taker, and stamp the mode's entry
/// cooldown clock.
pub fn open_order(
    ctx: &mut ModeContext,
    plan: &EntryPlan,
    snapshot: &MarketSnapshot,
    fees: &FeeSchedule,
    maker_cfg: &MakerConfig,
    entry_reason: impl Into<String>,
    now: Instant,
) -> SimulatedOrder {
    let reason = entry_reason.into();
    let order = if plan.use_maker {
        SimulatedOrder::new_pending_maker(
            ctx.name.clone(),
            plan.direction,
            plan.leverage,
            plan.size,
            snapshot.mid_price,
            plan.position_value,
            plan.maker_limit_price.expect("maker plan always carries a limit price"),
            maker_cfg.maker_timeout_secs,
            maker_cfg.allow_taker_fallback,
            plan.take_profit_pct,
            plan.stop_loss_pct,
            plan.trailing_stop_pct,
            ctx.config.min_holding_seconds,
            ctx.config.max_holding_hours,
            ctx.config.min_reverse_exit_seconds,
            snapshot.obi,
            snapshot.vpin_value,
            snapshot.spread_bps,
            reason,
        )
    } else {
        let slippage = snapshot.mid_price * maker_cfg.taker_slippage_pct / 100.0;
        let actual_entry_price = match plan.direction {
            Direction::Long => snapshot.mid_price + slippage,
            Direction::Short => snapshot.mid_price - slippage,
        };
        let mut o = SimulatedOrder::new_taker(
            ctx.name.clone(),
            plan.direction,
            plan.leverage,
            plan.size,
            snapshot.mid_price,
            actual_entry_price,
            plan.position_value,
            plan.take_profit_pct,
            plan.stop_loss_pct,
            plan.trailing_stop_pct,
            ctx.config.min_holding_seconds,
            ctx.config.max_holding_hours,
            ctx.config.min_reverse_exit_seconds,
            snapshot.obi,
            snapshot.vpin_value,
            snapshot.spread_bps,
            reason,
        );
        o.entry_fee = Some(plan.position_value * fees.taker_rate);
        o
    };
    ctx.last_entry_time = Some(now);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn snapshot_at(mid: f64, obi: f64, vpin: f64) -> MarketSnapshot {
        let mut s = MarketSnapshot::default();
        s.mid_price = mid;
        s.best_bid = mid - 0.5;
        s.best_ask = mid + 0.5;
        s.obi = obi;
        s.vpin_value = vpin;
        s
    }

    fn long_order() -> SimulatedOrder {
        let mut o = SimulatedOrder::new_taker(
            "baseline",
            Direction::Long,
            10.0,
            100.0,
            50_000.0,
            50_000.0,
            1_000.0,
            3.0,
            1.5,
            0.5,
            60,
            4.0,
            120,
            0.2,
            0.3,
            1.5,
            "signal",
        );
        o.entry_fee = Some(0.5);
        o.entry_time = Utc::now() - chrono::Duration::seconds(120);
        o
    }

    #[test]
    fn take_profit_fires_when_net_pnl_exceeds_target() {
        let mut o = long_order();
        let snapshot = snapshot_at(51_600.0, 0.0, 0.1);
        let decision = evaluate_exit(&mut o, &snapshot, Utc::now());
        assert!(decision.is_some());
        assert_eq!(decision.unwrap().reason, ExitReason::TakeProfit);
    }

    #[test]
    fn no_exit_before_min_holding_elapses() {
        let mut o = long_order();
        o.entry_time = Utc::now();
        let snapshot = snapshot_at(60_000.0, 0.0, 0.1);
        assert!(evaluate_exit(&mut o, &snapshot, Utc::now()).is_none());
    }

    #[test]
    fn stop_loss_fires_on_adverse_move() {
        let mut o = long_order();
        let snapshot = snapshot_at(49_000.0, 0.0, 0.1);
        let decision = evaluate_exit(&mut o, &snapshot, Utc::now());
        assert!(decision.is_some());
        assert_eq!(decision.unwrap().reason, ExitReason::StopLoss);
    }

    #[test]
    fn close_order_computes_roi() {
        let mut o = long_order();
        let roi = close_order(&mut o, 51_000.0, ExitReason::TakeProfit, Utc::now(), 0.0002, 0.0005, 0.0001);
        assert!(o.is_closed());
        assert_eq!(o.roi, Some(roi));
        assert!(roi > 0.0);
    }

    fn test_ctx() -> ModeContext {
        ModeContext::new("baseline", crate::config::default_mode(crate::modes::StrategyStyle::Baseline), 1_000.0)
    }

    #[test]
    fn take_profit_always_clears_round_trip_fees() {
        let ctx = test_ctx();
        let snapshot = snapshot_at(50_000.0, 0.2, 0.2);
        let fees = FeeSchedule::default();
        let maker = MakerConfig::default();
        let plan = plan_entry(&ctx, Direction::Long, 0.6, 1.0, &snapshot, &fees, &maker, false, false);
        let fee_cost_pct = fees.taker_rate * plan.leverage * 2.0 * 100.0;
        assert!(plan.take_profit_pct > fee_cost_pct);
    }

    #[test]
    fn high_confidence_raises_leverage_within_cap() {
        let ctx = test_ctx();
        let snapshot = snapshot_at(50_000.0, 0.2, 0.2);
        let fees = FeeSchedule::default();
        let maker = MakerConfig::default();
        let low = plan_entry(&ctx, Direction::Long, 0.5, 1.0, &snapshot, &fees, &maker, false, false);
        let high = plan_entry(&ctx, Direction::Long, 0.95, 1.0, &snapshot, &fees, &maker, false, false);
        assert!(high.leverage > low.leverage);
        assert!(high.leverage <= ctx.config.leverage_cap.min(125.0));
    }

    #[test]
    fn wide_spread_forces_taker_entry() {
        let ctx = test_ctx();
        let mut snapshot = snapshot_at(50_000.0, 0.2, 0.2);
        snapshot.spread_bps = 10.0;
        let fees = FeeSchedule::default();
        let maker = MakerConfig::default();
        let plan = plan_entry(&ctx, Direction::Long, 0.6, 1.0, &snapshot, &fees, &maker, false, false);
        assert!(!plan.use_maker);
        assert!(plan.maker_limit_price.is_none());
    }

    fn ai_command(command: BridgeCommand, direction: crate::bridge::BridgeDirection, stop_loss_pct: Option<f64>) -> AiCommand {
        AiCommand {
            command,
            direction,
            confidence: 0.8,
            leverage: None,
            whale_reversal_price: None,
            stop_loss_pct,
            dynamic_params: None,
            timestamp: Utc::now(),
            recommended_adjustments: None,
        }
    }

    #[test]
    fn ai_cut_loss_command_forces_exit() {
        let o = long_order();
        let snapshot = snapshot_at(50_100.0, 0.0, 0.1);
        let cmd = ai_command(BridgeCommand::CutLoss, crate::bridge::BridgeDirection::Neutral, None);
        let decision = evaluate_ai_force_exit(&o, &cmd, &snapshot, Utc::now());
        assert_eq!(decision.unwrap().reason, ExitReason::AiCutLoss);
    }

    #[test]
    fn ai_direction_flip_forces_exit() {
        let o = long_order();
        let snapshot = snapshot_at(50_100.0, 0.0, 0.1);
        let cmd = ai_command(BridgeCommand::Short, crate::bridge::BridgeDirection::Bearish, None);
        let decision = evaluate_ai_force_exit(&o, &cmd, &snapshot, Utc::now());
        assert_eq!(decision.unwrap().reason, ExitReason::AiFlip);
    }

    #[test]
    fn ai_stop_loss_pct_forces_exit_on_breach() {
        let o = long_order();
        let snapshot = snapshot_at(49_000.0, 0.0, 0.1);
        let cmd = ai_command(BridgeCommand::Long, crate::bridge::BridgeDirection::Bullish, Some(1.0));
        let decision = evaluate_ai_force_exit(&o, &cmd, &snapshot, Utc::now());
        assert_eq!(decision.unwrap().reason, ExitReason::AiStopLoss);
    }

    #[test]
    fn ai_force_exit_is_none_when_command_aligned_and_within_stop() {
        let o = long_order();
        let snapshot = snapshot_at(50_100.0, 0.0, 0.1);
        let cmd = ai_command(BridgeCommand::Long, crate::bridge::BridgeDirection::Bullish, Some(5.0));
        assert!(evaluate_ai_force_exit(&o, &cmd, &snapshot, Utc::now()).is_none());
    }

    #[test]
    fn stale_ai_command_does_not_force_exit() {
        let o = long_order();
        let snapshot = snapshot_at(50_100.0, 0.0, 0.1);
        let mut cmd = ai_command(BridgeCommand::CutLoss, crate::bridge::BridgeDirection::Neutral, None);
        cmd.timestamp = Utc::now() - chrono::Duration::seconds(300);
        assert!(evaluate_ai_force_exit(&o, &cmd, &snapshot, Utc::now()).is_none());
    }

    #[test]
    fn open_order_stamps_entry_cooldown() {
        let mut ctx = test_ctx();
        let snapshot = snapshot_at(50_000.0, 0.2, 0.2);
        let fees = FeeSchedule::default();
        let maker = MakerConfig::default();
        let plan = plan_entry(&ctx, Direction::Long, 0.6, 1.0, &snapshot, &fees, &maker, false, false);
        let now = Instant::now();
        assert!(ctx.last_entry_time.is_none());
        let order = open_order(&mut ctx, &plan, &snapshot, &fees, &maker, "signal", now);
        assert_eq!(ctx.last_entry_time, Some(now));
        assert_eq!(order.direction, Direction::Long);
    }
}
