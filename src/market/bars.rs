// =============================================================================
// Bar aggregator (C3)
// =============================================================================
//
// A single "current bar" is rolled every 3 seconds. High/low/close are
// sampled from mid-price only — never from bid or ask alone, or ATR would
// degenerate into a measure of spread. Volume accumulates trade quantity
// between rolls. The last 200 closed bars are kept in a ring.

use std::collections::VecDeque;

use crate::types::Bar;

pub const BAR_INTERVAL_SECS: i64 = 3;
const RING_CAPACITY: usize = 200;

pub struct BarAggregator {
    current: Option<Bar>,
    current_start_ts: i64,
    closed: VecDeque<Bar>,
}

impl BarAggregator {
    pub fn new() -> Self {
        Self {
            current: None,
            current_start_ts: 0,
            closed: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    /// Feed a mid-price sample at `ts_ms` (milliseconds). Rolls the current
    /// bar into the ring once `BAR_INTERVAL_SECS` have elapsed since its
    /// `start_ts`, starting a fresh bar seeded at `mid`.
    pub fn on_mid_price(&mut self, ts_ms: i64, mid: f64) {
        let bucket_start = (ts_ms / 1000 / BAR_INTERVAL_SECS) * BAR_INTERVAL_SECS;

        match &mut self.current {
            None => {
                self.current_start_ts = bucket_start;
                self.current = Some(Bar {
                    start_ts: bucket_start,
                    open: mid,
                    high: mid,
                    low: mid,
                    close: mid,
                    volume: 0.0,
                });
            }
            Some(bar) => {
                if bucket_start != self.current_start_ts {
                    self.closed.push_back(*bar);
                    if self.closed.len() > RING_CAPACITY {
                        self.closed.pop_front();
                    }
                    self.current_start_ts = bucket_start;
                    self.current = Some(Bar {
                        start_ts: bucket_start,
                        open: mid,
                        high: mid,
                        low: mid,
                        close: mid,
                        volume: 0.0,
                    });
                } else {
                    bar.high = bar.high.max(mid);
                    bar.low = bar.low.min(mid);
                    bar.close = mid;
                }
            }
        }
    }

    /// Add traded quantity to the currently open bar's volume.
    pub fn on_trade_volume(&mut self, qty: f64) {
        if let Some(bar) = &mut self.current {
            bar.volume += qty;
        }
    }

    pub fn current(&self) -> Option<Bar> {
        self.current
    }

    /// All closed bars, oldest first.
    pub fn closed_bars(&self) -> &VecDeque<Bar> {
        &self.closed
    }

    /// Closed bars plus the in-progress bar, for indicators that want the
    /// freshest possible read.
    pub fn bars_including_current(&self) -> Vec<Bar> {
        let mut v: Vec<Bar> = self.closed.iter().copied().collect();
        if let Some(bar) = self.current {
            v.push(bar);
        }
        v
    }
}

impl Default for BarAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bar_tracks_high_low_close() {
        let mut agg = BarAggregator::new();
        agg.on_mid_price(0, 100.0);
        agg.on_mid_price(500, 105.0);
        agg.on_mid_price(1000, 98.0);
        let bar = agg.current().unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 98.0);
    }

    #[test]
    fn bar_rolls_after_interval() {
        let mut agg = BarAggregator::new();
        agg.on_mid_price(0, 100.0);
        agg.on_mid_price(3_500, 110.0);
        assert_eq!(agg.closed_bars().len(), 1);
        assert_eq!(agg.closed_bars()[0].close, 100.0);
        assert_eq!(agg.current().unwrap().open, 110.0);
    }

    #[test]
    fn ring_is_bounded() {
        let mut agg = BarAggregator::new();
        for i in 0..(RING_CAPACITY as i64 + 50) {
            agg.on_mid_price(i * BAR_INTERVAL_SECS * 1000, 100.0 + i as f64);
        }
        assert!(agg.closed_bars().len() <= RING_CAPACITY);
    }

    #[test]
    fn volume_accumulates_within_a_bar() {
        let mut agg = BarAggregator::new();
        agg.on_mid_price(0, 100.0);
        agg.on_trade_volume(1.5);
        agg.on_trade_volume(2.5);
        assert_eq!(agg.current().unwrap().volume, 4.0);
    }
}
