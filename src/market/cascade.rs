// =============================================================================
// Liquidation cascade detector (C6)
// =============================================================================
//
// Thresholds and the signal-synthesis formula below are carried over
// verbatim from the dual-AI trader's liquidation_cascade_detector module.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LiquidationEvent, LiquidationSide};

const MIN_CASCADE_USD: f64 = 3_000_000.0;
const CRITICAL_CASCADE_USD: f64 = 10_000_000.0;
const MEGA_CASCADE_USD: f64 = 50_000_000.0;
const MINOR_CASCADE_USD: f64 = 1_000_000.0;
const BUILDING_CASCADE_USD: f64 = 500_000.0;
/// Reported alongside a cascade signal but not itself used to gate the
/// level ladder or the contrarian/trend signal split below.
#[allow(dead_code)]
const PRICE_VELOCITY_PCT: f64 = 0.3;
const SIGNAL_PRICE_THRESHOLD_PCT: f64 = 0.5;
const BURST_VELOCITY_USD_PER_SEC: f64 = 50_000.0;
const MAJOR_VELOCITY_USD_PER_SEC: f64 = 500_000.0;

const BURST_WINDOW_SECS: i64 = 10;
const MINUTE_WINDOW_SECS: i64 = 60;
const FIVE_MIN_WINDOW_SECS: i64 = 300;

const ALERT_COOLDOWN_SECS: u64 = 30;
const SNAPSHOT_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeLevel {
    Quiet,
    Building,
    Minor,
    Significant,
    Major,
    Extreme,
}

impl CascadeLevel {
    fn base_strength(self) -> f64 {
        match self {
            CascadeLevel::Quiet => 0.0,
            CascadeLevel::Building => 20.0,
            CascadeLevel::Minor => 40.0,
            CascadeLevel::Significant => 60.0,
            CascadeLevel::Major => 80.0,
            CascadeLevel::Extreme => 95.0,
        }
    }

    fn alert_eligible(self) -> bool {
        matches!(self, CascadeLevel::Significant | CascadeLevel::Major | CascadeLevel::Extreme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeDirection {
    LongLiquidation,
    ShortLiquidation,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeAction {
    Long,
    Short,
    Hold,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct WindowAggregate {
    total_usd: f64,
    long_usd: f64,
    short_usd: f64,
    count: u64,
}

impl WindowAggregate {
    fn velocity(self, window_secs: i64) -> f64 {
        if window_secs > 0 {
            self.total_usd / window_secs as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CascadeSignal {
    pub active: bool,
    pub action: CascadeAction,
    pub strength: f64,
    pub level: CascadeLevel,
    pub direction: CascadeDirection,
}

struct TimedEvent {
    ts: DateTime<Utc>,
    usd_value: f64,
    side: LiquidationSide,
}

pub struct CascadeDetector {
    events: VecDeque<TimedEvent>,
    price_history: VecDeque<(DateTime<Utc>, f64)>,
    last_alert_at: Option<Instant>,
    last_snapshot_at: Option<Instant>,
}

impl CascadeDetector {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            price_history: VecDeque::new(),
            last_alert_at: None,
            last_snapshot_at: None,
        }
    }

    pub fn on_liquidation(&mut self, event: LiquidationEvent, ts: DateTime<Utc>) {
        self.events.push_back(TimedEvent {
            ts,
            usd_value: event.usd_value(),
            side: event.side,
        });
        self.prune(ts);
    }

    pub fn on_price(&mut self, ts: DateTime<Utc>, price: f64) {
        self.price_history.push_back((ts, price));
        let cutoff = ts - chrono::Duration::seconds(FIVE_MIN_WINDOW_SECS);
        while self.price_history.front().map(|(t, _)| *t < cutoff).unwrap_or(false) {
            self.price_history.pop_front();
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(FIVE_MIN_WINDOW_SECS);
        while self.events.front().map(|e| e.ts < cutoff).unwrap_or(false) {
            self.events.pop_front();
        }
    }

    fn aggregate(&self, now: DateTime<Utc>, window_secs: i64) -> WindowAggregate {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        let mut agg = WindowAggregate::default();
        for e in self.events.iter().filter(|e| e.ts >= cutoff) {
            agg.total_usd += e.usd_value;
            agg.count += 1;
            match e.side {
                LiquidationSide::Sell => agg.long_usd += e.usd_value,
                LiquidationSide::Buy => agg.short_usd += e.usd_value,
            }
        }
        agg
    }

    fn price_change_pct(&self, window_secs: i64, now: DateTime<Utc>) -> f64 {
        let cutoff = now - chrono::Duration::seconds(window_secs);
        let start = self.price_history.iter().find(|(t, _)| *t >= cutoff).map(|(_, p)| *p);
        let end = self.price_history.back().map(|(_, p)| *p);
        match (start, end) {
            (Some(s), Some(e)) if s != 0.0 => (e - s) / s * 100.0,
            _ => 0.0,
        }
    }

    fn classify_level(&self, minute_agg: WindowAggregate, burst_agg: WindowAggregate) -> CascadeLevel {
        let burst_velocity = burst_agg.velocity(BURST_WINDOW_SECS);
        if minute_agg.total_usd >= MEGA_CASCADE_USD {
            CascadeLevel::Extreme
        } else if minute_agg.total_usd >= CRITICAL_CASCADE_USD {
            CascadeLevel::Major
        } else if minute_agg.total_usd >= MIN_CASCADE_USD {
            CascadeLevel::Significant
        } else if minute_agg.total_usd >= MINOR_CASCADE_USD {
            CascadeLevel::Minor
        } else if minute_agg.total_usd >= BUILDING_CASCADE_USD || burst_velocity >= BURST_VELOCITY_USD_PER_SEC {
            CascadeLevel::Building
        } else {
            CascadeLevel::Quiet
        }
    }

    fn classify_direction(&self, minute_agg: WindowAggregate) -> (CascadeDirection, f64) {
        if minute_agg.total_usd <= 0.0 {
            return (CascadeDirection::Mixed, 0.5);
        }
        let long_ratio = minute_agg.long_usd / minute_agg.total_usd;
        let direction = if long_ratio >= 0.7 {
            CascadeDirection::LongLiquidation
        } else if long_ratio <= 0.3 {
            CascadeDirection::ShortLiquidation
        } else {
            CascadeDirection::Mixed
        };
        (direction, long_ratio)
    }

    /// Evaluate the current tick: recomputes level/direction/signal from the
    /// rolling windows. Does not gate on cooldown — call `should_alert`
    /// separately to decide whether to emit a discrete alert.
    pub fn evaluate(&self, now: DateTime<Utc>) -> CascadeSignal {
        let minute_agg = self.aggregate(now, MINUTE_WINDOW_SECS);
        let burst_agg = self.aggregate(now, BURST_WINDOW_SECS);

        let level = self.classify_level(minute_agg, burst_agg);
        let (direction, long_ratio) = self.classify_direction(minute_agg);
        let price_change_pct = self.price_change_pct(MINUTE_WINDOW_SECS, now);

        let action = match (level, direction) {
            (CascadeLevel::Quiet | CascadeLevel::Building, _) => CascadeAction::Hold,
            (_, CascadeDirection::Mixed) => CascadeAction::Hold,
            (_, CascadeDirection::LongLiquidation) => {
                if price_change_pct <= -SIGNAL_PRICE_THRESHOLD_PCT {
                    CascadeAction::Long
                } else {
                    CascadeAction::Short
                }
            }
            (_, CascadeDirection::ShortLiquidation) => {
                if price_change_pct >= SIGNAL_PRICE_THRESHOLD_PCT {
                    CascadeAction::Short
                } else {
                    CascadeAction::Long
                }
            }
        };

        let dominant_ratio = long_ratio.max(1.0 - long_ratio);
        let direction_bonus = (dominant_ratio - 0.5) * 20.0;
        let velocity_bonus = if burst_agg.velocity(BURST_WINDOW_SECS) >= MAJOR_VELOCITY_USD_PER_SEC {
            10.0
        } else {
            0.0
        };
        let strength = (level.base_strength() + direction_bonus + velocity_bonus).clamp(0.0, 100.0);

        CascadeSignal {
            active: !matches!(action, CascadeAction::Hold),
            action,
            strength,
            level,
            direction,
        }
    }

    /// `true` at most once per `ALERT_COOLDOWN_SECS`, and only for
    /// alert-eligible levels.
    pub fn should_alert(&mut self, signal: &CascadeSignal, now: Instant) -> bool {
        if !signal.level.alert_eligible() {
            return false;
        }
        let ready = self
            .last_alert_at
            .map(|t| now.duration_since(t).as_secs() >= ALERT_COOLDOWN_SECS)
            .unwrap_or(true);
        if ready {
            self.last_alert_at = Some(now);
        }
        ready
    }

    /// `true` once every `SNAPSHOT_INTERVAL_SECS`, independent of alerts.
    pub fn should_snapshot(&mut self, now: Instant) -> bool {
        let ready = self
            .last_snapshot_at
            .map(|t| now.duration_since(t).as_secs() >= SNAPSHOT_INTERVAL_SECS)
            .unwrap_or(true);
        if ready {
            self.last_snapshot_at = Some(now);
        }
        ready
    }
}

impl Default for CascadeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liq(side: LiquidationSide, usd: f64) -> LiquidationEvent {
        LiquidationEvent {
            ts_ms: 0,
            side,
            qty: usd / 50_000.0,
            price: 50_000.0,
        }
    }

    #[test]
    fn quiet_by_default() {
        let detector = CascadeDetector::new();
        let signal = detector.evaluate(Utc::now());
        assert_eq!(signal.level, CascadeLevel::Quiet);
        assert_eq!(signal.action, CascadeAction::Hold);
    }

    #[test]
    fn long_liquidation_contrarian_after_price_drop() {
        let mut detector = CascadeDetector::new();
        let now = Utc::now();
        detector.on_price(now - chrono::Duration::seconds(50), 50_000.0);
        detector.on_price(now, 49_500.0);
        detector.on_liquidation(liq(LiquidationSide::Sell, 4_000_000.0), now);
        let signal = detector.evaluate(now);
        assert_eq!(signal.direction, CascadeDirection::LongLiquidation);
        assert_eq!(signal.action, CascadeAction::Long);
    }

    #[test]
    fn extreme_level_at_mega_threshold() {
        let mut detector = CascadeDetector::new();
        let now = Utc::now();
        detector.on_liquidation(liq(LiquidationSide::Sell, 60_000_000.0), now);
        let signal = detector.evaluate(now);
        assert_eq!(signal.level, CascadeLevel::Extreme);
    }

    #[test]
    fn alert_cooldown_gates_repeated_alerts() {
        let mut detector = CascadeDetector::new();
        let now = Utc::now();
        detector.on_liquidation(liq(LiquidationSide::Sell, 4_000_000.0), now);
        let signal = detector.evaluate(now);
        let t0 = Instant::now();
        assert!(detector.should_alert(&signal, t0));
        assert!(!detector.should_alert(&signal, t0));
    }
}
