// =============================================================================
// Trend & structure analyzer (C4)
// =============================================================================
//
// Three concurrent trend windows (short 45s/35 samples, medium 180s/60,
// long 900s/80) each score {price, obi, flow, vpin} into a direction; the
// combination of window directions yields a global TrendState. A separate
// swing-structure tracker derives BULLISH/BEARISH/RANGE structure from
// local highs and lows in the bar series.

use std::collections::VecDeque;

use crate::types::{Bar, StructureDirection, StructureState, TrendState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowDirection {
    Up,
    Down,
    Neutral,
}

struct TrendSample {
    ts_ms: i64,
    price: f64,
    obi: f64,
    large_trade_bias: f64,
    vpin: f64,
}

struct TrendWindow {
    duration_ms: i64,
    min_samples: usize,
    samples: VecDeque<TrendSample>,
}

const PRICE_THRESHOLD_PCT: f64 = 0.15;
const SCORE_THRESHOLD: f64 = 0.25;
const W_PRICE: f64 = 0.45;
const W_OBI: f64 = 0.25;
const W_FLOW: f64 = 0.20;
const W_VPIN: f64 = 0.10;

impl TrendWindow {
    fn new(duration_ms: i64, min_samples: usize) -> Self {
        Self {
            duration_ms,
            min_samples,
            samples: VecDeque::new(),
        }
    }

    fn push(&mut self, sample: TrendSample) {
        let cutoff = sample.ts_ms - self.duration_ms;
        self.samples.push_back(sample);
        while self.samples.front().map(|s| s.ts_ms < cutoff).unwrap_or(false) {
            self.samples.pop_front();
        }
    }

    fn direction(&self) -> WindowDirection {
        if self.samples.len() < self.min_samples {
            return WindowDirection::Neutral;
        }

        let first = self.samples.front().unwrap().price;
        let last = self.samples.back().unwrap().price;
        let delta_pct = if first != 0.0 { (last - first) / first * 100.0 } else { 0.0 };

        let n = self.samples.len() as f64;
        let avg_obi: f64 = self.samples.iter().map(|s| s.obi).sum::<f64>() / n;
        let avg_flow: f64 = self.samples.iter().map(|s| s.large_trade_bias).sum::<f64>() / n;
        let avg_vpin: f64 = self.samples.iter().map(|s| s.vpin).sum::<f64>() / n;

        let score = W_PRICE * (delta_pct / PRICE_THRESHOLD_PCT).tanh()
            + W_OBI * (avg_obi * 2.5).tanh()
            + W_FLOW * avg_flow.tanh()
            - W_VPIN * (avg_vpin - 0.55).max(0.0) * 2.0;

        if score >= SCORE_THRESHOLD {
            WindowDirection::Up
        } else if score <= -SCORE_THRESHOLD {
            WindowDirection::Down
        } else {
            WindowDirection::Neutral
        }
    }
}

/// A detected swing point.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy)]
struct Swing {
    kind: SwingKind,
    price: f64,
}

const SWING_CONFIRM_BARS: usize = 4;
const MIN_SWING_DISTANCE_PCT: f64 = 0.08;

pub struct TrendAnalyzer {
    short: TrendWindow,
    medium: TrendWindow,
    long: TrendWindow,
    swings: VecDeque<Swing>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendReading {
    pub state: TrendState,
    pub confidence: f64,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self {
            short: TrendWindow::new(45_000, 35),
            medium: TrendWindow::new(180_000, 60),
            long: TrendWindow::new(900_000, 80),
            swings: VecDeque::with_capacity(16),
        }
    }

    pub fn on_sample(&mut self, ts_ms: i64, price: f64, obi: f64, large_trade_bias: f64, vpin: f64) {
        let sample = TrendSample {
            ts_ms,
            price,
            obi,
            large_trade_bias,
            vpin,
        };
        self.short.push(TrendSample { ts_ms, price, obi, large_trade_bias, vpin });
        self.medium.push(TrendSample { ts_ms, price, obi, large_trade_bias, vpin });
        self.long.push(sample);
    }

    pub fn trend_reading(&self) -> TrendReading {
        let dirs = [self.short.direction(), self.medium.direction(), self.long.direction()];
        let up = dirs.iter().filter(|d| **d == WindowDirection::Up).count();
        let down = dirs.iter().filter(|d| **d == WindowDirection::Down).count();
        let consensus = up.max(down) as f64 / 3.0;

        let state = if consensus < 0.34 {
            TrendState::Range
        } else if up >= 2 && down == 0 {
            TrendState::StrongUp
        } else if down >= 2 && up == 0 {
            TrendState::StrongDown
        } else if up > down {
            TrendState::LeanUp
        } else if down > up {
            TrendState::LeanDown
        } else {
            TrendState::Range
        };

        TrendReading {
            state,
            confidence: consensus,
        }
    }

    /// Feed a newly closed bar series (oldest first) and recompute swing
    /// structure. Call after the bar aggregator rolls a new closed bar.
    pub fn on_bars_closed(&mut self, bars: &[Bar]) {
        if bars.len() < SWING_CONFIRM_BARS * 2 + 1 {
            return;
        }

        let mut detected: Vec<Swing> = Vec::new();
        for i in SWING_CONFIRM_BARS..bars.len() - SWING_CONFIRM_BARS {
            let window = &bars[i - SWING_CONFIRM_BARS..=i + SWING_CONFIRM_BARS];
            let center = bars[i];
            let is_high = window.iter().all(|b| b.high <= center.high);
            let is_low = window.iter().all(|b| b.low >= center.low);
            if is_high {
                detected.push(Swing { kind: SwingKind::High, price: center.high });
            } else if is_low {
                detected.push(Swing { kind: SwingKind::Low, price: center.low });
            }
        }

        self.swings.clear();
        for swing in detected {
            if let Some(last) = self.swings.back() {
                let dist_pct = (swing.price - last.price).abs() / last.price.max(1e-9) * 100.0;
                if last.kind == swing.kind {
                    // Same type adjacent — keep the more extreme.
                    let more_extreme = match swing.kind {
                        SwingKind::High => swing.price > last.price,
                        SwingKind::Low => swing.price < last.price,
                    };
                    if more_extreme {
                        self.swings.pop_back();
                        self.swings.push_back(swing);
                    }
                    continue;
                }
                if dist_pct < MIN_SWING_DISTANCE_PCT {
                    continue;
                }
            }
            self.swings.push_back(swing);
            if self.swings.len() > 16 {
                self.swings.pop_front();
            }
        }
    }

    pub fn structure_state(&self, mid_price: f64, atr: f64) -> StructureState {
        let highs: Vec<&Swing> = self.swings.iter().filter(|s| s.kind == SwingKind::High).collect();
        let lows: Vec<&Swing> = self.swings.iter().filter(|s| s.kind == SwingKind::Low).collect();

        if highs.len() < 2 || lows.len() < 2 {
            return StructureState {
                direction: StructureDirection::Range,
                persistence: 0,
                structure_break: false,
                pullback_ready: false,
            };
        }

        let hh = highs[highs.len() - 1].price > highs[highs.len() - 2].price;
        let hl = lows[lows.len() - 1].price > lows[lows.len() - 2].price;
        let lh = highs[highs.len() - 1].price < highs[highs.len() - 2].price;
        let ll = lows[lows.len() - 1].price < lows[lows.len() - 2].price;

        let direction = if hh && hl {
            StructureDirection::Bullish
        } else if lh && ll {
            StructureDirection::Bearish
        } else {
            StructureDirection::Range
        };

        let persistence = match direction {
            StructureDirection::Bullish => count_streak(&highs, true).min(count_streak(&lows, true)),
            StructureDirection::Bearish => count_streak(&highs, false).min(count_streak(&lows, false)),
            StructureDirection::Range => 0,
        };

        let structure_break = match direction {
            StructureDirection::Bullish => {
                let last_low = lows.last().unwrap().price;
                mid_price < last_low - atr * 0.35
            }
            StructureDirection::Bearish => {
                let last_high = highs.last().unwrap().price;
                mid_price > last_high + atr * 0.35
            }
            StructureDirection::Range => false,
        };

        StructureState {
            direction,
            persistence,
            structure_break,
            pullback_ready: !structure_break && persistence >= 2,
        }
    }

    /// Most recent confirmed swing high, if any.
    pub fn recent_swing_high(&self) -> Option<f64> {
        self.swings.iter().rev().find(|s| s.kind == SwingKind::High).map(|s| s.price)
    }

    /// Most recent confirmed swing low, if any.
    pub fn recent_swing_low(&self) -> Option<f64> {
        self.swings.iter().rev().find(|s| s.kind == SwingKind::Low).map(|s| s.price)
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn count_streak(swings: &[&Swing], increasing: bool) -> u32 {
    let mut streak = 0u32;
    for w in swings.windows(2).rev() {
        let up = w[1].price > w[0].price;
        if up == increasing {
            streak += 1;
        } else {
            break;
        }
    }
    streak + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_samples_yield_range() {
        let mut analyzer = TrendAnalyzer::new();
        analyzer.on_sample(0, 100.0, 0.1, 0.1, 0.2);
        assert_eq!(analyzer.trend_reading().state, TrendState::Range);
    }

    #[test]
    fn strong_uptrend_detected_across_windows() {
        let mut analyzer = TrendAnalyzer::new();
        for i in 0..100 {
            let ts = i * 1_000;
            let price = 100.0 + i as f64 * 0.5;
            analyzer.on_sample(ts, price, 0.3, 0.3, 0.1);
        }
        let reading = analyzer.trend_reading();
        assert!(matches!(reading.state, TrendState::StrongUp | TrendState::LeanUp));
    }

    #[test]
    fn structure_defaults_to_range_with_few_swings() {
        let analyzer = TrendAnalyzer::new();
        let state = analyzer.structure_state(100.0, 1.0);
        assert_eq!(state.direction, StructureDirection::Range);
        assert!(!state.structure_break);
    }

    fn bar(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            start_ts: ts,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn recent_swing_accessors_report_latest_confirmed_points() {
        let mut analyzer = TrendAnalyzer::new();
        let mut bars = Vec::new();
        let mut ts = 0;
        // ramp up into a peak, then back down, then up into a trough, then up again
        let closes = [
            100.0, 101.0, 102.0, 103.0, 104.0, 110.0, 104.0, 103.0, 102.0, 101.0, 100.0, 95.0, 90.0, 91.0, 92.0,
            93.0, 94.0, 95.0,
        ];
        for c in closes {
            bars.push(bar(ts, c, c + 0.5, c - 0.5, c));
            ts += 3_000;
        }
        analyzer.on_bars_closed(&bars);
        assert!(analyzer.recent_swing_high().is_some());
        assert!(analyzer.recent_swing_low().is_some());
    }
}
