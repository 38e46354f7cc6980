// =============================================================================
// VPIN — Volume-Synchronized Probability of Informed Trading (C2)
// =============================================================================
//
// Fixed-volume buckets (20,000 USD, 40 trailing buckets). Each bucket holds
// buy and sell volume; VPIN is the mean absolute imbalance across buckets,
// normalised by bucket size. Recomputed whenever a trade closes a bucket.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpinLevel {
    Low,
    Normal,
    Elevated,
    Danger,
    Critical,
}

impl VpinLevel {
    fn from_value(vpin: f64) -> Self {
        if vpin >= 0.85 {
            VpinLevel::Critical
        } else if vpin >= 0.7 {
            VpinLevel::Danger
        } else if vpin >= 0.5 {
            VpinLevel::Elevated
        } else if vpin >= 0.3 {
            VpinLevel::Normal
        } else {
            VpinLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VpinState {
    pub vpin: f64,
    pub level: VpinLevel,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl Default for VpinState {
    fn default() -> Self {
        Self {
            vpin: 0.0,
            level: VpinLevel::Low,
            buy_volume: 0.0,
            sell_volume: 0.0,
        }
    }
}

pub struct VpinCalculator {
    bucket_usd: f64,
    num_buckets: usize,
    current_buy: f64,
    current_sell: f64,
    current_bucket_usd: f64,
    buckets: VecDeque<(f64, f64)>,
    state: VpinState,
}

impl VpinCalculator {
    pub fn new(bucket_usd: f64, num_buckets: usize) -> Self {
        Self {
            bucket_usd,
            num_buckets,
            current_buy: 0.0,
            current_sell: 0.0,
            current_bucket_usd: 0.0,
            buckets: VecDeque::with_capacity(num_buckets),
            state: VpinState::default(),
        }
    }

    /// Feed one trade's notional USD value; `is_buy` = aggressor bought.
    pub fn add_trade(&mut self, usd_value: f64, is_buy: bool) {
        if is_buy {
            self.current_buy += usd_value;
        } else {
            self.current_sell += usd_value;
        }
        self.current_bucket_usd += usd_value;

        while self.current_bucket_usd >= self.bucket_usd {
            let overflow = self.current_bucket_usd - self.bucket_usd;
            let ratio = if self.current_bucket_usd > 0.0 {
                (self.current_bucket_usd - overflow) / self.current_bucket_usd
            } else {
                1.0
            };

            let bucket_buy = self.current_buy * ratio;
            let bucket_sell = self.current_sell * ratio;
            self.buckets.push_back((bucket_buy, bucket_sell));
            if self.buckets.len() > self.num_buckets {
                self.buckets.pop_front();
            }

            self.current_buy *= 1.0 - ratio;
            self.current_sell *= 1.0 - ratio;
            self.current_bucket_usd = overflow;

            self.recompute();
        }
    }

    fn recompute(&mut self) {
        if self.buckets.is_empty() {
            self.state = VpinState::default();
            return;
        }

        let total_imbalance: f64 = self.buckets.iter().map(|(b, s)| (b - s).abs()).sum();
        let vpin = total_imbalance / (self.buckets.len() as f64 * self.bucket_usd);

        let buy_volume: f64 = self.buckets.iter().map(|(b, _)| b).sum();
        let sell_volume: f64 = self.buckets.iter().map(|(_, s)| s).sum();

        self.state = VpinState {
            vpin,
            level: VpinLevel::from_value(vpin),
            buy_volume,
            sell_volume,
        };
    }

    pub fn state(&self) -> VpinState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_flow_gives_low_vpin() {
        let mut calc = VpinCalculator::new(1000.0, 10);
        for _ in 0..20 {
            calc.add_trade(50.0, true);
            calc.add_trade(50.0, false);
        }
        assert_eq!(calc.state().level, VpinLevel::Low);
    }

    #[test]
    fn one_sided_flow_raises_vpin() {
        let mut calc = VpinCalculator::new(1000.0, 10);
        for _ in 0..30 {
            calc.add_trade(200.0, true);
        }
        assert!(calc.state().vpin > 0.5);
    }

    #[test]
    fn level_thresholds_match_spec() {
        assert_eq!(VpinLevel::from_value(0.2), VpinLevel::Low);
        assert_eq!(VpinLevel::from_value(0.35), VpinLevel::Normal);
        assert_eq!(VpinLevel::from_value(0.55), VpinLevel::Elevated);
        assert_eq!(VpinLevel::from_value(0.75), VpinLevel::Danger);
        assert_eq!(VpinLevel::from_value(0.9), VpinLevel::Critical);
    }
}
