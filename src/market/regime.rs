// =============================================================================
// Market regime classifier (C4)
// =============================================================================
//
// Classifies the last 60 bars into one of five regimes via a priority
// ladder: Dead > Volatile > Squeeze > Trending > Ranging. Distinct from
// `SnapshotRegime` on `MarketSnapshot`, which is a coarse directional bias
// derived from trend state and consolidation — this classifier exists only
// to gate which mode styles are allowed to trade (C9/C10).
//
// Detection hierarchy (evaluated top-to-bottom; first match wins):
//   1. DEAD      — entropy >= 0.95 (pure noise, no edge)
//   2. VOLATILE  — bbw > 5.0
//   3. SQUEEZE   — bbw < 1.5 AND adx < 20
//   4. TRENDING  — adx > 25 AND hurst > 0.55
//   5. RANGING   — adx < 20 AND hurst < 0.45
// If no rule fires, the regime defaults to RANGING at low confidence.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::market::entropy::ShannonEntropyFilter;
use crate::market::hurst::calculate_hurst_exponent;
use crate::types::Bar;

const REGIME_WINDOW_BARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Squeeze,
    Dead,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Volatile => write!(f, "VOLATILE"),
            Self::Squeeze => write!(f, "SQUEEZE"),
            Self::Dead => write!(f, "DEAD"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    pub ma_distance: f64,
    pub volatility: f64,
    pub volume_ratio: f64,
    pub entropy: f64,
    pub bbw: f64,
    pub hurst: f64,
    pub adx: f64,
    pub confidence: f64,
    pub regime_age_secs: f64,
    pub recommended_rr: (f64, f64),
    pub max_position_pct: f64,
}

impl MarketRegime {
    fn risk_params(self) -> ((f64, f64), f64) {
        match self {
            Self::Trending => ((3.0, 1.0), 100.0),
            Self::Ranging => ((1.5, 1.0), 60.0),
            Self::Volatile => ((2.5, 1.0), 40.0),
            Self::Squeeze => ((4.0, 1.0), 30.0),
            Self::Dead => ((0.0, 0.0), 0.0),
        }
    }

    /// Mode styles permitted to trade under this regime (C10 step 2's
    /// regime-gating table). Styles not named here HOLD unconditionally
    /// while this regime is active.
    pub fn allowed_mode_styles(self) -> &'static [&'static str] {
        match self {
            Self::Trending => &["trend", "breakout", "baseline", "whale", "ai_dragon2", "ai_lion"],
            Self::Ranging => &["reversion", "scalper", "baseline", "whale"],
            Self::Volatile => &["volatility", "whale", "lp_whale_burst"],
            Self::Squeeze => &["breakout", "volume"],
            Self::Dead => &["direction_probe_long", "direction_probe_short"],
        }
    }
}

pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
    last_change_time: RwLock<Instant>,
}

impl RegimeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
        })
    }

    pub fn update(&self, bars: &[Bar]) -> Option<RegimeState> {
        let window_start = bars.len().saturating_sub(REGIME_WINDOW_BARS);
        let window = &bars[window_start..];
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();

        let adx_value = calculate_adx(window, 14).unwrap_or(0.0);
        let bb_result = calculate_bollinger(&closes, 20, 2.0)?;
        let bbw_value = bb_result.width;
        let hurst_value = calculate_hurst_exponent(&closes).unwrap_or(0.50);
        let entropy_value = ShannonEntropyFilter::calculate(window, 50).unwrap_or(0.0);

        let (regime, confidence) = classify(adx_value, bbw_value, hurst_value, entropy_value);
        let (recommended_rr, max_position_pct) = regime.risk_params();

        let now = Instant::now();
        let prev_regime = self.state.read().as_ref().map(|s| s.regime);
        if prev_regime != Some(regime) {
            *self.last_change_time.write() = now;
        }
        let regime_age_secs = now.duration_since(*self.last_change_time.read()).as_secs_f64();

        let last_close = closes.last().copied().unwrap_or(0.0);
        let ma_distance = if last_close > 0.0 {
            (last_close - bb_result.middle) / last_close
        } else {
            0.0
        };
        let volume_ratio = {
            let recent: f64 = window.iter().rev().take(5).map(|b| b.volume).sum::<f64>() / 5.0;
            let baseline: f64 = window.iter().map(|b| b.volume).sum::<f64>() / window.len().max(1) as f64;
            if baseline > 0.0 { recent / baseline } else { 1.0 }
        };

        let new_state = RegimeState {
            regime,
            ma_distance,
            volatility: bbw_value,
            volume_ratio,
            entropy: entropy_value,
            bbw: bbw_value,
            hurst: hurst_value,
            adx: adx_value,
            confidence,
            regime_age_secs,
            recommended_rr,
            max_position_pct,
        };

        debug!(regime = %regime, adx = format!("{:.2}", adx_value), bbw = format!("{:.2}", bbw_value), "regime detected");

        *self.state.write() = Some(new_state.clone());
        Some(new_state)
    }

    pub fn current_regime(&self) -> Option<RegimeState> {
        self.state.read().clone()
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
        }
    }
}

fn classify(adx: f64, bbw: f64, hurst: f64, entropy: f64) -> (MarketRegime, f64) {
    if entropy >= 0.95 {
        return (MarketRegime::Dead, remap(entropy, 0.95, 1.0, 0.70, 1.0));
    }
    if bbw > 5.0 {
        return (MarketRegime::Volatile, remap(bbw, 5.0, 10.0, 0.65, 1.0));
    }
    if bbw < 1.5 && adx < 20.0 {
        let bbw_conf = remap(bbw, 1.5, 0.5, 0.50, 1.0);
        let adx_conf = remap(adx, 20.0, 5.0, 0.50, 1.0);
        return (MarketRegime::Squeeze, (bbw_conf + adx_conf) / 2.0);
    }
    if adx > 25.0 && hurst > 0.55 {
        let adx_conf = remap(adx, 25.0, 50.0, 0.60, 1.0);
        let hurst_conf = remap(hurst, 0.55, 0.80, 0.60, 1.0);
        return (MarketRegime::Trending, (adx_conf + hurst_conf) / 2.0);
    }
    if adx < 20.0 && hurst < 0.45 {
        let adx_conf = remap(adx, 20.0, 5.0, 0.50, 1.0);
        let hurst_conf = remap(hurst, 0.45, 0.20, 0.50, 1.0);
        return (MarketRegime::Ranging, (adx_conf + hurst_conf) / 2.0);
    }
    trace!(adx, bbw, hurst, entropy, "regime: no rule matched, defaulting to ranging");
    (MarketRegime::Ranging, 0.30)
}

fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    out_lo + t.clamp(0.0, 1.0) * (out_hi - out_lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_dead_has_priority_over_trending() {
        let (regime, _) = classify(40.0, 3.0, 0.70, 0.97);
        assert_eq!(regime, MarketRegime::Dead);
    }

    #[test]
    fn classify_default_is_ranging_low_confidence() {
        let (regime, conf) = classify(22.0, 3.0, 0.50, 0.50);
        assert_eq!(regime, MarketRegime::Ranging);
        assert!((conf - 0.30).abs() < 1e-10);
    }

    #[test]
    fn allowed_modes_exclude_direction_probes_outside_dead() {
        assert!(!MarketRegime::Trending.allowed_mode_styles().contains(&"direction_probe_long"));
        assert!(MarketRegime::Dead.allowed_mode_styles().contains(&"direction_probe_long"));
    }
}
