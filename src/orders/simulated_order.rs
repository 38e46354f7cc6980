// =============================================================================
// SimulatedOrder — state for one paper trade, from creation through close
// =============================================================================

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Direction, ExitReason, MakerStatus};

/// One simulated trade. Owns everything needed to evaluate exits and compute
/// close accounting; never touches another order or another mode's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedOrder {
    pub order_id: String,
    pub mode: String,
    pub direction: Direction,
    pub leverage: f64,
    pub size: f64,
    pub entry_time: DateTime<Utc>,

    pub entry_price: f64,
    pub actual_entry_price: f64,
    pub position_value: f64,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,

    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub dynamic_stop_loss_pct: f64,
    pub trailing_stop_pct: f64,
    pub min_holding_seconds: u64,
    pub max_holding_hours: f64,
    pub min_reverse_exit_seconds: u64,

    pub maker_status: MakerStatus,
    pub maker_limit_price: Option<f64>,
    pub maker_timeout_seconds: u64,
    pub maker_allow_taker_fallback: bool,
    #[serde(skip, default = "Instant::now")]
    pub maker_created_time: Instant,
    #[serde(skip)]
    pub maker_filled_time: Option<Instant>,

    pub peak_pnl_pct: f64,
    pub vpin_risk_mode: bool,
    #[serde(skip)]
    pub vpin_risk_trigger_time: Option<Instant>,
    pub entry_obi: f64,
    pub entry_vpin: f64,
    pub entry_spread_bps: f64,
    pub entry_reason: String,

    pub exit_reason: Option<ExitReason>,
    pub entry_fee: Option<f64>,
    pub exit_fee: Option<f64>,
    pub funding_fee: Option<f64>,
    pub total_fees: Option<f64>,
    pub pnl_usdt: Option<f64>,
    pub roi: Option<f64>,
}

impl SimulatedOrder {
    #[allow(clippy::too_many_arguments)]
    pub fn new_taker(
        mode: impl Into<String>,
        direction: Direction,
        leverage: f64,
        size: f64,
        entry_price: f64,
        actual_entry_price: f64,
        position_value: f64,
        take_profit_pct: f64,
        stop_loss_pct: f64,
        trailing_stop_pct: f64,
        min_holding_seconds: u64,
        max_holding_hours: f64,
        min_reverse_exit_seconds: u64,
        entry_obi: f64,
        entry_vpin: f64,
        entry_spread_bps: f64,
        entry_reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            mode: mode.into(),
            direction,
            leverage,
            size,
            entry_time: Utc::now(),
            entry_price,
            actual_entry_price,
            position_value,
            exit_price: None,
            exit_time: None,
            take_profit_pct,
            stop_loss_pct,
            dynamic_stop_loss_pct: stop_loss_pct,
            trailing_stop_pct,
            min_holding_seconds,
            max_holding_hours,
            min_reverse_exit_seconds,
            maker_status: MakerStatus::Filled,
            maker_limit_price: None,
            maker_timeout_seconds: 0,
            maker_allow_taker_fallback: false,
            maker_created_time: Instant::now(),
            maker_filled_time: Some(Instant::now()),
            peak_pnl_pct: f64::MIN,
            vpin_risk_mode: false,
            vpin_risk_trigger_time: None,
            entry_obi,
            entry_vpin,
            entry_spread_bps,
            entry_reason: entry_reason.into(),
            exit_reason: None,
            entry_fee: None,
            exit_fee: None,
            funding_fee: None,
            total_fees: None,
            pnl_usdt: None,
            roi: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_pending_maker(
        mode: impl Into<String>,
        direction: Direction,
        leverage: f64,
        size: f64,
        entry_price: f64,
        position_value: f64,
        maker_limit_price: f64,
        maker_timeout_seconds: u64,
        maker_allow_taker_fallback: bool,
        take_profit_pct: f64,
        stop_loss_pct: f64,
        trailing_stop_pct: f64,
        min_holding_seconds: u64,
        max_holding_hours: f64,
        min_reverse_exit_seconds: u64,
        entry_obi: f64,
        entry_vpin: f64,
        entry_spread_bps: f64,
        entry_reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            mode: mode.into(),
            direction,
            leverage,
            size,
            entry_time: Utc::now(),
            entry_price,
            actual_entry_price: maker_limit_price,
            position_value,
            exit_price: None,
            exit_time: None,
            take_profit_pct,
            stop_loss_pct,
            dynamic_stop_loss_pct: stop_loss_pct,
            trailing_stop_pct,
            min_holding_seconds,
            max_holding_hours,
            min_reverse_exit_seconds,
            maker_status: MakerStatus::Pending,
            maker_limit_price: Some(maker_limit_price),
            maker_timeout_seconds,
            maker_allow_taker_fallback,
            maker_created_time: Instant::now(),
            maker_filled_time: None,
            peak_pnl_pct: f64::MIN,
            vpin_risk_mode: false,
            vpin_risk_trigger_time: None,
            entry_obi,
            entry_vpin,
            entry_spread_bps,
            entry_reason: entry_reason.into(),
            exit_reason: None,
            entry_fee: None,
            exit_fee: None,
            funding_fee: None,
            total_fees: None,
            pnl_usdt: None,
            roi: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exit_time.is_some()
    }

    pub fn is_pending_maker(&self) -> bool {
        matches!(self.maker_status, MakerStatus::Pending)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.maker_status, MakerStatus::Cancelled)
    }

    /// Whether the entry itself filled at the maker rate. A plain taker
    /// entry starts `Filled` with no limit price; a maker entry that timed
    /// out into `TakerFallback` keeps its limit price but entered at taker.
    pub fn entry_was_maker(&self) -> bool {
        self.maker_status == MakerStatus::Filled && self.maker_limit_price.is_some()
    }

    /// `price_change = (price - entry) / entry` for LONG, inverted for SHORT.
    pub fn price_change_pct(&self, price: f64) -> f64 {
        let raw = (price - self.actual_entry_price) / self.actual_entry_price;
        match self.direction {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }

    pub fn unrealized_pnl_pct(&self, price: f64) -> f64 {
        self.price_change_pct(price) * self.leverage * 100.0
    }

    /// Update `peak_pnl_pct`, which is monotonically non-decreasing.
    pub fn update_peak(&mut self, pnl_pct: f64) {
        if pnl_pct > self.peak_pnl_pct {
            self.peak_pnl_pct = pnl_pct;
        }
    }

    pub fn holding_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_seconds().max(0)
    }

    pub fn holding_hours(&self, now: DateTime<Utc>) -> f64 {
        self.holding_seconds(now) as f64 / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> SimulatedOrder {
        SimulatedOrder::new_taker(
            "baseline",
            Direction::Long,
            10.0,
            100.0,
            50_000.0,
            50_010.0,
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
        )
    }

    #[test]
    fn long_price_up_is_positive_pnl() {
        let o = order();
        let pct = o.price_change_pct(51_010.0);
        assert!(pct > 0.0);
    }

    #[test]
    fn short_inverts_sign() {
        let mut o = order();
        o.direction = Direction::Short;
        o.actual_entry_price = 50_010.0;
        let pct = o.price_change_pct(51_010.0);
        assert!(pct < 0.0);
    }

    #[test]
    fn peak_pnl_never_decreases() {
        let mut o = order();
        o.update_peak(5.0);
        o.update_peak(2.0);
        assert_eq!(o.peak_pnl_pct, 5.0);
        o.update_peak(8.0);
        assert_eq!(o.peak_pnl_pct, 8.0);
    }

    #[test]
    fn not_closed_until_exit_time_set() {
        let mut o = order();
        assert!(!o.is_closed());
        o.exit_time = Some(Utc::now());
        assert!(o.is_closed());
    }
}
