// =============================================================================
// Liquidation pressure snapshot (C7)
// =============================================================================
//
// This component does not compute anything from the live trade stream: it
// parses the periodic snapshot an external collector writes to disk (open
// interest, global/top-trader long-short ratios, funding rate, force orders,
// taker buy/sell ratio) into two 0-100 pressure scores:
//
//   long_score  — how crowded/close-to-liquidation leveraged longs are
//                 (full bar => prefer SHORT setups)
//   short_score — the symmetric read for shorts (full bar => prefer LONG)
//
// When the exchange's force-order feed is empty (common — it needs elevated
// API access), pressure is estimated from open-interest drops coinciding
// with price moves: an OI drop alongside falling price looks like long
// liquidation, an OI drop alongside rising price looks like short
// liquidation. `ESTIMATION_FACTOR` discounts this proxy since not every OI
// drop is a forced close.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::Direction;

const ESTIMATION_FACTOR: f64 = 0.5;
const BASE_FORCE_USD: f64 = 4_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureLevel {
    VeryLow,
    Low,
    Medium,
    High,
    Extreme,
}

impl PressureLevel {
    fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            PressureLevel::Extreme
        } else if score >= 65.0 {
            PressureLevel::High
        } else if score >= 45.0 {
            PressureLevel::Medium
        } else if score >= 25.0 {
            PressureLevel::Low
        } else {
            PressureLevel::VeryLow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectionalBias {
    BothHigh,
    Neutral,
    Balanced,
    Long,
    Short,
}

fn bias_from_scores(long_score: f64, short_score: f64) -> (DirectionalBias, f64) {
    let diff = (long_score - short_score).abs();
    let confidence = diff / 100.0;
    if long_score >= 65.0 && short_score >= 65.0 {
        return (DirectionalBias::BothHigh, confidence);
    }
    if long_score <= 25.0 && short_score <= 25.0 {
        return (DirectionalBias::Neutral, confidence);
    }
    if diff < 10.0 {
        return (DirectionalBias::Balanced, confidence);
    }
    if long_score > short_score {
        (DirectionalBias::Short, confidence)
    } else {
        (DirectionalBias::Long, confidence)
    }
}

/// The side at risk of being forced out, derived from which side's pressure
/// score dominates. `None` when pressure is balanced, neutral, or both-high.
pub fn at_risk_direction(bias: DirectionalBias) -> Option<Direction> {
    match bias {
        DirectionalBias::Short => Some(Direction::Long),
        DirectionalBias::Long => Some(Direction::Short),
        DirectionalBias::BothHigh | DirectionalBias::Neutral | DirectionalBias::Balanced => None,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PressureComponents {
    pub crowding: f64,
    pub top_crowding: f64,
    pub funding: f64,
    pub oi_trend: f64,
    pub force_share: f64,
    pub force_volume: f64,
    pub taker_pressure: f64,
    pub oi_velocity: f64,
}

impl PressureComponents {
    fn combine(self) -> f64 {
        let total = self.crowding * 18.0
            + self.top_crowding * 15.0
            + self.funding * 15.0
            + self.oi_trend * 12.0
            + self.force_share * 10.0
            + self.force_volume * 12.0
            + self.taker_pressure * 10.0
            + self.oi_velocity * 8.0;
        total.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationPressureSnapshot {
    pub symbol: String,
    pub collected_at: String,
    pub long_score: f64,
    pub short_score: f64,
    pub long_level: PressureLevel,
    pub short_level: PressureLevel,
    pub bias: DirectionalBias,
    pub bias_confidence: f64,
    pub long_components: PressureComponents,
    pub short_components: PressureComponents,
    pub sell_force_usd: f64,
    pub buy_force_usd: f64,
    pub oi_change_pct: f64,
    pub funding_rate: f64,
    pub taker_buy_sell_ratio: f64,
}

// --- Raw collector JSON shape -----------------------------------------------

#[derive(Debug, Deserialize)]
struct RatioPoint {
    #[serde(rename = "longShortRatio")]
    long_short_ratio: f64,
}

#[derive(Debug, Deserialize)]
struct OiPoint {
    #[serde(rename = "sumOpenInterest", default)]
    sum_open_interest: f64,
    #[serde(rename = "sumOpenInterestValue", default)]
    sum_open_interest_value: f64,
}

#[derive(Debug, Deserialize)]
struct FundingPoint {
    #[serde(rename = "fundingRate", default)]
    funding_rate: f64,
}

#[derive(Debug, Deserialize)]
struct ForceOrder {
    #[serde(rename = "executedQty")]
    executed_qty: Option<f64>,
    #[serde(rename = "origQty")]
    orig_qty: Option<f64>,
    #[serde(rename = "averagePrice")]
    average_price: Option<f64>,
    price: Option<f64>,
    side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TakerPoint {
    #[serde(rename = "buySellRatio", default = "default_ratio")]
    buy_sell_ratio: f64,
}

fn default_ratio() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct RawLeverageSnapshot {
    #[serde(default = "default_symbol")]
    symbol: String,
    #[serde(default)]
    collected_at: String,
    #[serde(default)]
    global_long_short: Vec<RatioPoint>,
    #[serde(default)]
    top_long_short: Vec<RatioPoint>,
    #[serde(default)]
    open_interest: Vec<OiPoint>,
    #[serde(default)]
    funding_rate: Vec<FundingPoint>,
    #[serde(default)]
    force_orders: Vec<ForceOrder>,
    #[serde(default)]
    taker_long_short: Vec<TakerPoint>,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Convert one collector snapshot into long/short pressure scores. Returns
/// `None` when the snapshot is missing the minimum series needed to compute
/// anything meaningful (global/top ratio, open interest).
pub fn compute_liquidation_pressure(raw: &RawLeverageSnapshot) -> Option<LiquidationPressureSnapshot> {
    if raw.global_long_short.is_empty() || raw.top_long_short.is_empty() || raw.open_interest.is_empty() {
        return None;
    }

    let global_ratio = raw.global_long_short.last().unwrap().long_short_ratio;
    let top_ratio = raw.top_long_short.last().unwrap().long_short_ratio;
    let funding_rate = raw.funding_rate.last().map(|f| f.funding_rate).unwrap_or(0.0);
    let taker_buy_sell_ratio = raw.taker_long_short.last().map(|t| t.buy_sell_ratio).unwrap_or(1.0);

    let oi_start = raw.open_interest.first().unwrap().sum_open_interest;
    let oi_end = raw.open_interest.last().unwrap().sum_open_interest;
    let oi_change_pct = if oi_start > 0.0 { (oi_end - oi_start) / oi_start } else { 0.0 };

    let (mut sell_force_usd, mut buy_force_usd) = (0.0, 0.0);
    let mut real_force_orders_found = false;
    for order in &raw.force_orders {
        real_force_orders_found = true;
        let qty = order.executed_qty.or(order.orig_qty).unwrap_or(0.0);
        let price = order.average_price.or(order.price).unwrap_or(0.0);
        let usd = qty * price;
        match order.side.as_deref().unwrap_or("").to_ascii_uppercase().as_str() {
            "SELL" => sell_force_usd += usd,
            "BUY" => buy_force_usd += usd,
            _ => {}
        }
    }

    if !real_force_orders_found && raw.open_interest.len() >= 2 {
        let (mut sim_sell, mut sim_buy) = (0.0, 0.0);
        for w in raw.open_interest.windows(2) {
            let (prev, curr) = (&w[0], &w[1]);
            if curr.sum_open_interest <= 0.0 || prev.sum_open_interest <= 0.0 {
                continue;
            }
            let curr_price = if curr.sum_open_interest > 0.0 {
                curr.sum_open_interest_value / curr.sum_open_interest
            } else {
                0.0
            };
            let prev_price = if prev.sum_open_interest > 0.0 {
                prev.sum_open_interest_value / prev.sum_open_interest
            } else {
                0.0
            };
            if curr_price == 0.0 || prev_price == 0.0 {
                continue;
            }
            let delta_oi = curr.sum_open_interest - prev.sum_open_interest;
            let price_change_pct = (curr_price - prev_price) / prev_price;
            if delta_oi < 0.0 {
                let delta_usd = delta_oi.abs() * curr_price;
                if price_change_pct < -0.0005 {
                    sim_sell += delta_usd;
                } else if price_change_pct > 0.0005 {
                    sim_buy += delta_usd;
                }
            }
        }
        sell_force_usd = sim_sell * ESTIMATION_FACTOR;
        buy_force_usd = sim_buy * ESTIMATION_FACTOR;
    }

    let total_force = sell_force_usd + buy_force_usd;
    let sell_share = if total_force > 0.0 { sell_force_usd / total_force } else { 0.0 };
    let buy_share = if total_force > 0.0 { buy_force_usd / total_force } else { 0.0 };

    let taker_long_pressure = if taker_buy_sell_ratio > 0.0 {
        clamp01((1.0 / taker_buy_sell_ratio - 0.8) / 0.7)
    } else {
        0.0
    };
    let taker_short_pressure = clamp01((taker_buy_sell_ratio - 0.8) / 0.7);

    let mut oi_roc = 0.0;
    if raw.open_interest.len() >= 5 {
        let recent_oi = raw.open_interest.last().unwrap().sum_open_interest;
        let past_oi = raw.open_interest[raw.open_interest.len() - 5].sum_open_interest;
        if past_oi > 0.0 {
            oi_roc = (recent_oi - past_oi) / past_oi;
        }
    }
    let oi_velocity_component = clamp01((-oi_roc).max(0.0) / 0.02);

    let long_components = PressureComponents {
        crowding: clamp01((global_ratio - 1.0) / 1.2),
        top_crowding: clamp01((top_ratio - 1.0) / 1.1),
        funding: clamp01(funding_rate.max(0.0) / 0.015),
        oi_trend: clamp01(oi_change_pct.max(0.0) / 0.25),
        force_share: clamp01(sell_share / 0.7),
        force_volume: clamp01(sell_force_usd / BASE_FORCE_USD),
        taker_pressure: taker_long_pressure,
        oi_velocity: oi_velocity_component,
    };
    let short_components = PressureComponents {
        crowding: if global_ratio > 0.0 { clamp01((1.0 / global_ratio - 1.0) / 1.2) } else { 0.0 },
        top_crowding: if top_ratio > 0.0 { clamp01((1.0 / top_ratio - 1.0) / 1.1) } else { 0.0 },
        funding: clamp01((-funding_rate).max(0.0) / 0.015),
        oi_trend: if global_ratio < 1.0 {
            clamp01(oi_change_pct.max(0.0) / 0.25)
        } else {
            clamp01((-oi_change_pct).max(0.0) / 0.25)
        },
        force_share: clamp01(buy_share / 0.7),
        force_volume: clamp01(buy_force_usd / BASE_FORCE_USD),
        taker_pressure: taker_short_pressure,
        oi_velocity: oi_velocity_component,
    };

    let long_score = long_components.combine();
    let short_score = short_components.combine();
    let long_level = PressureLevel::from_score(long_score);
    let short_level = PressureLevel::from_score(short_score);
    let (bias, bias_confidence) = bias_from_scores(long_score, short_score);

    Some(LiquidationPressureSnapshot {
        symbol: raw.symbol.clone(),
        collected_at: raw.collected_at.clone(),
        long_score,
        short_score,
        long_level,
        short_level,
        bias,
        bias_confidence,
        long_components,
        short_components,
        sell_force_usd,
        buy_force_usd,
        oi_change_pct,
        funding_rate,
        taker_buy_sell_ratio,
    })
}

/// Debounced file reader: only re-parses when the file's mtime has advanced,
/// and keeps serving the last good snapshot across a transient read/parse
/// failure rather than dropping pressure data for one tick.
pub struct LiquidationPressureReader {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    cached: Option<LiquidationPressureSnapshot>,
}

impl LiquidationPressureReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
            cached: None,
        }
    }

    pub fn refresh(&mut self) -> Option<&LiquidationPressureSnapshot> {
        if let Ok(meta) = fs::metadata(&self.path) {
            if let Ok(modified) = meta.modified() {
                if self.last_modified != Some(modified) {
                    if let Some(snapshot) = read_snapshot(&self.path) {
                        self.cached = Some(snapshot);
                        self.last_modified = Some(modified);
                    }
                }
            }
        }
        self.cached.as_ref()
    }
}

fn read_snapshot(path: &Path) -> Option<LiquidationPressureSnapshot> {
    let raw_text = fs::read_to_string(path).ok()?;
    let raw: RawLeverageSnapshot = serde_json::from_str(&raw_text).ok()?;
    compute_liquidation_pressure(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(v: f64) -> RatioPoint {
        RatioPoint { long_short_ratio: v }
    }

    fn oi(sum: f64, value: f64) -> OiPoint {
        OiPoint {
            sum_open_interest: sum,
            sum_open_interest_value: value,
        }
    }

    #[test]
    fn missing_series_returns_none() {
        let raw = RawLeverageSnapshot {
            symbol: "BTCUSDT".into(),
            collected_at: "".into(),
            global_long_short: vec![],
            top_long_short: vec![],
            open_interest: vec![],
            funding_rate: vec![],
            force_orders: vec![],
            taker_long_short: vec![],
        };
        assert!(compute_liquidation_pressure(&raw).is_none());
    }

    #[test]
    fn crowded_longs_favor_short_bias() {
        let raw = RawLeverageSnapshot {
            symbol: "BTCUSDT".into(),
            collected_at: "2026-01-01".into(),
            global_long_short: vec![ratio(2.2)],
            top_long_short: vec![ratio(2.0)],
            open_interest: (0..6).map(|i| oi(1000.0 - i as f64 * 50.0, (1000.0 - i as f64 * 50.0) * 50_000.0)).collect(),
            funding_rate: vec![FundingPoint { funding_rate: 0.01 }],
            force_orders: vec![],
            taker_long_short: vec![TakerPoint { buy_sell_ratio: 0.6 }],
        };
        let snapshot = compute_liquidation_pressure(&raw).unwrap();
        assert!(snapshot.long_score > snapshot.short_score);
        assert_eq!(at_risk_direction(snapshot.bias), Some(Direction::Long));
    }

    #[test]
    fn scores_never_exceed_hundred() {
        let raw = RawLeverageSnapshot {
            symbol: "BTCUSDT".into(),
            collected_at: "".into(),
            global_long_short: vec![ratio(10.0)],
            top_long_short: vec![ratio(10.0)],
            open_interest: vec![oi(1000.0, 1.0), oi(1.0, 1.0)],
            funding_rate: vec![FundingPoint { funding_rate: 1.0 }],
            force_orders: vec![],
            taker_long_short: vec![TakerPoint { buy_sell_ratio: 0.01 }],
        };
        let snapshot = compute_liquidation_pressure(&raw).unwrap();
        assert!(snapshot.long_score <= 100.0);
        assert!(snapshot.short_score <= 100.0);
    }

    #[test]
    fn level_thresholds_map_correctly() {
        assert_eq!(PressureLevel::from_score(90.0), PressureLevel::Extreme);
        assert_eq!(PressureLevel::from_score(70.0), PressureLevel::High);
        assert_eq!(PressureLevel::from_score(50.0), PressureLevel::Medium);
        assert_eq!(PressureLevel::from_score(30.0), PressureLevel::Low);
        assert_eq!(PressureLevel::from_score(10.0), PressureLevel::VeryLow);
    }
}
