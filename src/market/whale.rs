// =============================================================================
// Whale tracker (C5)
// =============================================================================
//
// No upstream analogue exists for this component; it is built in the idiom
// of the trade-stream processor (rolling windows of parsed trades) and the
// exit monitor's VecDeque bookkeeping, generalized to large-trade direction
// aggregation instead of price-bar history.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::types::{Direction, LargeTradeRecord, WhaleSignal};

const SHORT_WINDOW_SECS: i64 = 30;
const LONG_WINDOW_CAP: usize = 800;
const REVERSAL_WINDOW_MINS: i64 = 30;
const REVERSAL_TIERS_MINS: [i64; 4] = [2, 5, 10, 20];

const EFFECTIVENESS_CHECK_SECS: [i64; 4] = [15, 30, 60, 120];
const EFFECTIVENESS_MIN_IMPACT_PCT: f64 = 0.05;
const EFFECTIVENESS_MIN_DOMINANCE: f64 = 0.6;
const EFFECTIVENESS_MIN_NET_QTY: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectivenessVerdict {
    Effective,
    Ineffective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Trust,
    Cautious,
    Wait,
    Ignore,
}

impl Grade {
    fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Grade::A
        } else if score >= 60.0 {
            Grade::B
        } else if score >= 40.0 {
            Grade::C
        } else {
            Grade::D
        }
    }

    fn recommendation(self) -> Recommendation {
        match self {
            Grade::A => Recommendation::Trust,
            Grade::B => Recommendation::Cautious,
            Grade::C => Recommendation::Wait,
            Grade::D => Recommendation::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalRisk {
    Warning,
    Prediction,
    Decay,
    None,
}

struct PendingEffectivenessCheck {
    signal_ts: DateTime<Utc>,
    direction: Direction,
    entry_price: f64,
    checked_offsets: Vec<i64>,
}

#[derive(Default)]
struct DirectionEffectiveness {
    effective: u32,
    ineffective: u32,
}

impl DirectionEffectiveness {
    fn rolling_rate(&self) -> f64 {
        let total = self.effective + self.ineffective;
        if total == 0 {
            0.5
        } else {
            self.effective as f64 / total as f64
        }
    }
}

pub struct WhaleTracker {
    threshold_btc: f64,
    min_count: usize,
    min_total: f64,
    min_dominance: f64,
    window_secs: i64,
    min_impact_pct: f64,

    short_window: VecDeque<LargeTradeRecord>,
    long_window: VecDeque<LargeTradeRecord>,
    flip_timestamps: VecDeque<Instant>,
    last_direction: Option<Direction>,

    pending_checks: Vec<PendingEffectivenessCheck>,
    effectiveness_long: DirectionEffectiveness,
    effectiveness_short: DirectionEffectiveness,

    last_dominance: f64,
    last_signal_direction: Option<Direction>,
    last_reversal_risk: ReversalRisk,
}

impl WhaleTracker {
    pub fn new(threshold_btc: f64, min_count: usize, min_total: f64, min_dominance: f64, window_secs: i64, min_impact_pct: f64) -> Self {
        Self {
            threshold_btc,
            min_count,
            min_total,
            min_dominance,
            window_secs,
            min_impact_pct,
            short_window: VecDeque::new(),
            long_window: VecDeque::new(),
            flip_timestamps: VecDeque::new(),
            last_direction: None,
            pending_checks: Vec::new(),
            effectiveness_long: DirectionEffectiveness::default(),
            effectiveness_short: DirectionEffectiveness::default(),
            last_dominance: 0.0,
            last_signal_direction: None,
            last_reversal_risk: ReversalRisk::None,
        }
    }

    /// Ingest a trade. Only trades with `qty >= threshold_btc` are tracked.
    pub fn on_trade(&mut self, ts: DateTime<Utc>, qty: f64, price: f64, buyer_is_maker: bool) -> Option<WhaleSignal> {
        if qty < self.threshold_btc {
            return None;
        }

        let direction = if buyer_is_maker { Direction::Short } else { Direction::Long };
        let record = LargeTradeRecord { ts, qty, price, direction };

        self.short_window.push_back(record);
        self.long_window.push_back(record);
        if self.long_window.len() > LONG_WINDOW_CAP {
            self.long_window.pop_front();
        }

        let cutoff = ts - chrono::Duration::seconds(self.window_secs.max(SHORT_WINDOW_SECS));
        while self.short_window.front().map(|r| r.ts < cutoff).unwrap_or(false) {
            self.short_window.pop_front();
        }

        self.prune_flip_window();

        let count = self.short_window.len();
        let total_qty: f64 = self.short_window.iter().map(|r| r.qty).sum();
        if count < self.min_count || total_qty < self.min_total {
            return None;
        }

        let long_qty: f64 = self.short_window.iter().filter(|r| r.direction == Direction::Long).map(|r| r.qty).sum();
        let short_qty: f64 = self.short_window.iter().filter(|r| r.direction == Direction::Short).map(|r| r.qty).sum();
        let net_qty = long_qty - short_qty;
        let dominance = (net_qty.abs() / total_qty).min(1.0);
        self.last_dominance = dominance;

        if dominance < self.min_dominance {
            return None;
        }

        let signal_direction = if net_qty >= 0.0 { Direction::Long } else { Direction::Short };
        self.last_reversal_risk = self.reversal_risk(signal_direction, dominance, self.min_dominance);
        self.record_flip(signal_direction);

        let whale_vwap = {
            let notional: f64 = self.short_window.iter().map(|r| r.qty * r.price).sum();
            if total_qty > 0.0 { notional / total_qty } else { price }
        };

        if dominance >= EFFECTIVENESS_MIN_DOMINANCE && net_qty.abs() >= EFFECTIVENESS_MIN_NET_QTY {
            self.pending_checks.push(PendingEffectivenessCheck {
                signal_ts: ts,
                direction: signal_direction,
                entry_price: price,
                checked_offsets: Vec::new(),
            });
        }

        self.last_signal_direction = Some(signal_direction);

        Some(WhaleSignal {
            direction: signal_direction,
            ts,
            net_qty,
            dominance_ratio: dominance,
            long_qty,
            short_qty,
            total_qty,
            whale_vwap,
        })
    }

    fn record_flip(&mut self, direction: Direction) {
        if let Some(prev) = self.last_direction {
            if prev != direction {
                self.flip_timestamps.push_back(Instant::now());
            }
        }
        self.last_direction = Some(direction);
    }

    fn prune_flip_window(&mut self) {
        let cutoff = Instant::now().checked_sub(Duration::from_secs((REVERSAL_WINDOW_MINS * 60) as u64));
        if let Some(cutoff) = cutoff {
            while self.flip_timestamps.front().map(|t| *t < cutoff).unwrap_or(false) {
                self.flip_timestamps.pop_front();
            }
        }
    }

    /// Cooldown penalty (seconds) applied to whale-driven entries based on
    /// how many direction flips occurred in the last 30 minutes.
    pub fn reversal_cooldown_secs(&self) -> i64 {
        let flips = self.flip_timestamps.len();
        if flips < 2 {
            return 0;
        }
        let tier_index = (flips - 2).min(REVERSAL_TIERS_MINS.len() - 1);
        REVERSAL_TIERS_MINS[tier_index] * 60
    }

    /// Seconds remaining on the reversal cooldown, 0 if none is active.
    pub fn reversal_cooldown_remaining_secs(&self, now: Instant) -> i64 {
        let required = self.reversal_cooldown_secs();
        if required == 0 {
            return 0;
        }
        match self.flip_timestamps.back() {
            Some(&last_flip) => {
                let elapsed = now.saturating_duration_since(last_flip).as_secs() as i64;
                (required - elapsed).max(0)
            }
            None => 0,
        }
    }

    /// Reversal-risk classification from the most recent signal-bearing update.
    pub fn latest_reversal_risk(&self) -> ReversalRisk {
        self.last_reversal_risk
    }

    /// Evaluate any pending effectiveness checks against the current price,
    /// resolving those whose check offsets have all elapsed.
    pub fn check_effectiveness(&mut self, now: DateTime<Utc>, current_price: f64) {
        let mut resolved_indices = Vec::new();

        for (idx, check) in self.pending_checks.iter_mut().enumerate() {
            let elapsed = (now - check.signal_ts).num_seconds();
            for &offset in EFFECTIVENESS_CHECK_SECS.iter() {
                if elapsed >= offset && !check.checked_offsets.contains(&offset) {
                    check.checked_offsets.push(offset);
                    let move_pct = (current_price - check.entry_price) / check.entry_price * 100.0
                        * check.direction.sign();
                    let verdict = if move_pct >= EFFECTIVENESS_MIN_IMPACT_PCT {
                        EffectivenessVerdict::Effective
                    } else {
                        EffectivenessVerdict::Ineffective
                    };
                    let bucket = match check.direction {
                        Direction::Long => &mut self.effectiveness_long,
                        Direction::Short => &mut self.effectiveness_short,
                    };
                    match verdict {
                        EffectivenessVerdict::Effective => bucket.effective += 1,
                        EffectivenessVerdict::Ineffective => bucket.ineffective += 1,
                    }
                }
            }
            if elapsed >= *EFFECTIVENESS_CHECK_SECS.last().unwrap() {
                resolved_indices.push(idx);
            }
        }

        for idx in resolved_indices.into_iter().rev() {
            self.pending_checks.remove(idx);
        }
    }

    pub fn effectiveness_rate(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.effectiveness_long.rolling_rate(),
            Direction::Short => self.effectiveness_short.rolling_rate(),
        }
    }

    /// 0-100 quality score from weighted features of the current window.
    pub fn quality_score(&self, obi: f64, vpin: f64, mid_price: f64) -> f64 {
        if self.short_window.is_empty() {
            return 0.0;
        }

        let mut score = 0.0;

        let recent: Vec<&LargeTradeRecord> = self.short_window.iter().rev().take(10).collect();
        if !recent.is_empty() {
            let majority_dir = recent[0].direction;
            let same = recent.iter().filter(|r| r.direction == majority_dir).count();
            score += 25.0 * (same as f64 / recent.len() as f64);
        }

        if let Some(dir) = self.last_signal_direction {
            let obi_agrees = match dir {
                Direction::Long => obi > 0.05,
                Direction::Short => obi < -0.05,
            };
            score += if obi_agrees { 20.0 } else { -10.0 };
        }

        if vpin > 0.6 {
            score += 15.0;
        }

        let total_qty: f64 = self.short_window.iter().map(|r| r.qty).sum();
        score += size_bucket_score(total_qty);
        score += dominance_bucket_score(self.last_dominance);

        let freq_secs = self.short_window.len() as f64;
        score += if freq_secs >= 20.0 { 15.0 } else if freq_secs >= 10.0 { 10.0 } else { 0.0 };

        if let Some(dir) = self.last_signal_direction {
            let whale_vwap = {
                let notional: f64 = self.short_window.iter().map(|r| r.qty * r.price).sum();
                if total_qty > 0.0 { notional / total_qty } else { mid_price }
            };
            let price_ahead = match dir {
                Direction::Long => mid_price > whale_vwap,
                Direction::Short => mid_price < whale_vwap,
            };
            score += if price_ahead { 10.0 } else { -10.0 };
        }

        score.clamp(0.0, 100.0)
    }

    pub fn grade(&self, quality_score: f64) -> (Grade, Recommendation) {
        let grade = Grade::from_score(quality_score);
        (grade, grade.recommendation())
    }

    /// Classify this dominance update as a reversal-risk event.
    pub fn reversal_risk(&self, new_direction: Direction, new_dominance: f64, reversal_sensitivity: f64) -> ReversalRisk {
        let direction_changed = self.last_direction.map(|d| d != new_direction).unwrap_or(false);

        if direction_changed && new_dominance >= reversal_sensitivity {
            return ReversalRisk::Warning;
        }
        if new_dominance >= EFFECTIVENESS_MIN_DOMINANCE && self.effectiveness_rate(new_direction) >= 0.6 {
            return ReversalRisk::Prediction;
        }
        if new_dominance < self.last_dominance || (direction_changed && new_dominance < EFFECTIVENESS_MIN_DOMINANCE) {
            return ReversalRisk::Decay;
        }
        ReversalRisk::None
    }
}

fn size_bucket_score(total_qty: f64) -> f64 {
    if total_qty >= 20.0 {
        20.0
    } else if total_qty >= 10.0 {
        15.0
    } else if total_qty >= 3.0 {
        10.0
    } else {
        0.0
    }
}

fn dominance_bucket_score(dominance: f64) -> f64 {
    if dominance >= 0.85 {
        20.0
    } else if dominance >= 0.75 {
        15.0
    } else if dominance >= 0.6 {
        10.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> WhaleTracker {
        WhaleTracker::new(1.0, 5, 3.0, 0.6, 30, 0.05)
    }

    #[test]
    fn no_signal_below_count_threshold() {
        let mut t = tracker();
        let now = Utc::now();
        assert!(t.on_trade(now, 1.5, 50_000.0, false).is_none());
    }

    #[test]
    fn dominant_long_flow_emits_signal() {
        let mut t = tracker();
        let now = Utc::now();
        for i in 0..6 {
            let ts = now + chrono::Duration::seconds(i);
            let signal = t.on_trade(ts, 1.2, 50_000.0, false);
            if i == 5 {
                let signal = signal.expect("signal should fire once thresholds hold");
                assert_eq!(signal.direction, Direction::Long);
                assert!(signal.dominance_ratio >= 0.6);
            }
        }
    }

    #[test]
    fn reversal_cooldown_escalates_with_flips() {
        let mut t = tracker();
        assert_eq!(t.reversal_cooldown_secs(), 0);
        t.last_direction = Some(Direction::Long);
        t.record_flip(Direction::Short);
        t.record_flip(Direction::Long);
        t.record_flip(Direction::Short);
        assert!(t.reversal_cooldown_secs() > 0);
    }

    #[test]
    fn grade_maps_score_to_recommendation() {
        let t = tracker();
        assert_eq!(t.grade(90.0).1, Recommendation::Trust);
        assert_eq!(t.grade(10.0).1, Recommendation::Ignore);
    }
}
