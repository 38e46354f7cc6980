// =============================================================================
// Market snapshot builder (C8)
// =============================================================================
//
// `MarketSnapshot` is the single read-only view of current market state that
// the decision engine (C10) and order lifecycle (C11) consume each tick. It
// is assembled once per tick from every C2-C7 component and never mutated
// afterward — consumers only ever see a fresh snapshot next tick.

use serde::{Deserialize, Serialize};

use crate::market::cascade::CascadeSignal;
use crate::market::liquidation_pressure::LiquidationPressureSnapshot;
use crate::market::orderbook::OrderBookIndicators;
use crate::market::trend::TrendReading;
use crate::market::vpin::{VpinLevel, VpinState};
use crate::types::{SnapshotRegime, StructureDirection, StructureState, TrendState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ts_ms: i64,

    // Book & microstructure (C2).
    pub mid_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_abs: f64,
    pub spread_bps: f64,
    pub obi: f64,
    pub depth_imbalance: f64,
    pub microprice: f64,
    pub microprice_pressure: f64,
    pub signed_volume: f64,
    pub signed_volume_rate: f64,
    pub obi_velocity: f64,

    // VPIN (C2).
    pub vpin_value: f64,
    pub vpin_level: VpinLevel,

    // Funding proxy.
    pub funding_rate: f64,
    pub funding_zscore: f64,

    // Regime / trend / structure (C3/C4).
    pub regime: SnapshotRegime,
    pub trend_state: TrendState,
    pub trend_confidence: f64,
    pub structure: StructureState,

    // Momentum & volatility proxies.
    pub momentum_pct: f64,
    pub volatility_pct: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub ma20: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,

    // Cascade / liquidation pressure (C6/C7) — absent until enough data
    // has accumulated to produce a reading.
    pub cascade: Option<CascadeSignal>,
    pub liquidation_pressure: Option<LiquidationPressureSnapshot>,

    // Swing/structure context (C4) used by late-entry gating.
    pub recent_swing_high: Option<f64>,
    pub recent_swing_low: Option<f64>,
    pub range_position: f64,
    /// Width of the most recent swing range as a percentage of mid price.
    /// 0.0 absent both swings.
    pub range_width: f64,
    pub late_entry_risk: bool,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            ts_ms: 0,
            mid_price: 0.0,
            best_bid: 0.0,
            best_ask: 0.0,
            spread_abs: 0.0,
            spread_bps: 0.0,
            obi: 0.0,
            depth_imbalance: 0.0,
            microprice: 0.0,
            microprice_pressure: 0.0,
            signed_volume: 0.0,
            signed_volume_rate: 0.0,
            obi_velocity: 0.0,
            vpin_value: 0.0,
            vpin_level: VpinLevel::Low,
            funding_rate: 0.0,
            funding_zscore: 0.0,
            regime: SnapshotRegime::Neutral,
            trend_state: TrendState::Range,
            trend_confidence: 0.0,
            structure: StructureState {
                direction: StructureDirection::Range,
                persistence: 0,
                structure_break: false,
                pullback_ready: false,
            },
            momentum_pct: 0.0,
            volatility_pct: 0.0,
            rsi: 50.0,
            stoch_k: 50.0,
            stoch_d: 50.0,
            ma20: 0.0,
            bollinger_upper: 0.0,
            bollinger_middle: 0.0,
            bollinger_lower: 0.0,
            cascade: None,
            liquidation_pressure: None,
            recent_swing_high: None,
            recent_swing_low: None,
            range_position: 0.5,
            range_width: 0.0,
            late_entry_risk: false,
        }
    }
}

/// Everything needed to assemble one tick's `MarketSnapshot`, gathered from
/// the component trackers that own each reading. Kept as plain fields
/// (rather than borrowing the trackers themselves) so the engine loop can
/// build this cheaply after calling each tracker's own read method.
pub struct SnapshotInputs<'a> {
    pub ts_ms: i64,
    pub book: &'a OrderBookIndicators,
    pub vpin: &'a VpinState,
    pub funding_rate: f64,
    pub funding_zscore: f64,
    pub trend: TrendReading,
    pub structure: StructureState,
    pub momentum_pct: f64,
    pub volatility_pct: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub ma20: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub cascade: Option<CascadeSignal>,
    pub liquidation_pressure: Option<LiquidationPressureSnapshot>,
    pub recent_swing_high: Option<f64>,
    pub recent_swing_low: Option<f64>,
}

/// Classify coarse directional bias from trend state and structure, for the
/// `SnapshotRegime` field consumers use as a quick bull/bear/neutral read.
fn classify_snapshot_regime(trend: &TrendReading, structure: &StructureState) -> SnapshotRegime {
    match trend.state {
        TrendState::StrongUp | TrendState::LeanUp if structure.direction == StructureDirection::Bullish => {
            SnapshotRegime::Bull
        }
        TrendState::StrongDown | TrendState::LeanDown if structure.direction == StructureDirection::Bearish => {
            SnapshotRegime::Bear
        }
        TrendState::Range if structure.direction == StructureDirection::Range => SnapshotRegime::Consolidation,
        _ => SnapshotRegime::Neutral,
    }
}

/// Position of `mid_price` within the most recent swing range, 0.0 at the
/// swing low and 1.0 at the swing high. Defaults to 0.5 absent both swings.
fn range_position(mid_price: f64, swing_high: Option<f64>, swing_low: Option<f64>) -> f64 {
    match (swing_high, swing_low) {
        (Some(hi), Some(lo)) if hi > lo => ((mid_price - lo) / (hi - lo)).clamp(0.0, 1.0),
        _ => 0.5,
    }
}

/// Width of the most recent swing range as a percentage of mid price.
fn range_width(mid_price: f64, swing_high: Option<f64>, swing_low: Option<f64>) -> f64 {
    match (swing_high, swing_low) {
        (Some(hi), Some(lo)) if hi > lo && mid_price > 0.0 => (hi - lo) / mid_price * 100.0,
        _ => 0.0,
    }
}

/// A fresh breakout beyond the prior swing range, on top of an already
/// stretched trend, is the textbook "chasing a move that already happened"
/// setup this flag exists to surface to the decision engine.
fn late_entry_risk(range_pos: f64, trend: &TrendReading) -> bool {
    let stretched = range_pos <= 0.05 || range_pos >= 0.95;
    stretched && trend.confidence >= 0.67
}

pub fn build(inputs: SnapshotInputs<'_>) -> MarketSnapshot {
    let regime = classify_snapshot_regime(&inputs.trend, &inputs.structure);
    let range_pos = range_position(inputs.book.mid_price, inputs.recent_swing_high, inputs.recent_swing_low);
    let range_wid = range_width(inputs.book.mid_price, inputs.recent_swing_high, inputs.recent_swing_low);
    let late_risk = late_entry_risk(range_pos, &inputs.trend);

    MarketSnapshot {
        ts_ms: inputs.ts_ms,
        mid_price: inputs.book.mid_price,
        best_bid: inputs.book.best_bid,
        best_ask: inputs.book.best_ask,
        spread_abs: inputs.book.spread_abs,
        spread_bps: inputs.book.spread_bps,
        obi: inputs.book.obi,
        depth_imbalance: inputs.book.depth_imbalance,
        microprice: inputs.book.microprice,
        microprice_pressure: inputs.book.microprice_pressure,
        signed_volume: inputs.book.signed_volume,
        signed_volume_rate: inputs.book.signed_volume_rate,
        obi_velocity: inputs.book.obi_velocity,
        vpin_value: inputs.vpin.vpin,
        vpin_level: inputs.vpin.level,
        funding_rate: inputs.funding_rate,
        funding_zscore: inputs.funding_zscore,
        regime,
        trend_state: inputs.trend.state,
        trend_confidence: inputs.trend.confidence,
        structure: inputs.structure,
        momentum_pct: inputs.momentum_pct,
        volatility_pct: inputs.volatility_pct,
        rsi: inputs.rsi,
        stoch_k: inputs.stoch_k,
        stoch_d: inputs.stoch_d,
        ma20: inputs.ma20,
        bollinger_upper: inputs.bollinger_upper,
        bollinger_middle: inputs.bollinger_middle,
        bollinger_lower: inputs.bollinger_lower,
        cascade: inputs.cascade,
        liquidation_pressure: inputs.liquidation_pressure,
        recent_swing_high: inputs.recent_swing_high,
        recent_swing_low: inputs.recent_swing_low,
        range_position: range_pos,
        range_width: range_wid,
        late_entry_risk: late_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_neutral() {
        let snap = MarketSnapshot::default();
        assert_eq!(snap.regime, SnapshotRegime::Neutral);
        assert!(!snap.late_entry_risk);
        assert_eq!(snap.range_position, 0.5);
    }

    #[test]
    fn range_position_clamps_and_defaults() {
        assert_eq!(range_position(100.0, None, None), 0.5);
        assert_eq!(range_position(105.0, Some(110.0), Some(100.0)), 0.5);
        assert_eq!(range_position(115.0, Some(110.0), Some(100.0)), 1.0);
    }

    #[test]
    fn range_width_is_percentage_of_mid() {
        assert_eq!(range_width(100.0, None, None), 0.0);
        let width = range_width(100.0, Some(110.0), Some(100.0));
        assert!((width - 10.0).abs() < 1e-9);
    }

    #[test]
    fn late_entry_risk_requires_stretch_and_confidence() {
        let weak_trend = TrendReading { state: TrendState::LeanUp, confidence: 0.4 };
        assert!(!late_entry_risk(0.98, &weak_trend));
        let strong_trend = TrendReading { state: TrendState::StrongUp, confidence: 0.9 };
        assert!(late_entry_risk(0.98, &strong_trend));
        assert!(!late_entry_risk(0.5, &strong_trend));
    }
}
