// =============================================================================
// Stochastic Oscillator (%K / %D)
// =============================================================================
//
// %K measures where the current close sits within the recent high/low range:
//   %K = (close - lowest_low) / (highest_high - lowest_low) * 100
//
// %D is a simple moving average of %K (smoothing period, default 3).

use crate::types::Bar;

#[derive(Debug, Clone, Copy)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent %K/%D pair from OHLC bars.
///
/// Returns `None` when there are fewer than `k_period + d_period - 1` bars,
/// or the high/low range is degenerate (zero width).
pub fn calculate_stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> Option<Stochastic> {
    if k_period == 0 || d_period == 0 || bars.len() < k_period + d_period - 1 {
        return None;
    }

    let mut k_values = Vec::with_capacity(d_period);
    for end in (bars.len() - d_period + 1)..=bars.len() {
        let window = &bars[end - k_period..end];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        let close = window.last()?.close;

        let k = if range == 0.0 {
            50.0
        } else {
            (close - lowest) / range * 100.0
        };
        if !k.is_finite() {
            return None;
        }
        k_values.push(k);
    }

    let d = k_values.iter().sum::<f64>() / k_values.len() as f64;
    let k = *k_values.last()?;

    Some(Stochastic { k, d })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> Bar {
        Bar {
            start_ts: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn insufficient_data_returns_none() {
        let bars = vec![bar(10.0, 9.0, 9.5); 3];
        assert!(calculate_stochastic(&bars, 14, 3).is_none());
    }

    #[test]
    fn close_at_high_gives_k_near_100() {
        let mut bars = vec![bar(100.0, 90.0, 95.0); 16];
        bars.push(bar(100.0, 90.0, 100.0));
        let result = calculate_stochastic(&bars, 14, 3).unwrap();
        assert!(result.k > 90.0, "expected %K near 100, got {}", result.k);
    }

    #[test]
    fn close_at_low_gives_k_near_0() {
        let mut bars = vec![bar(100.0, 90.0, 95.0); 16];
        bars.push(bar(100.0, 90.0, 90.0));
        let result = calculate_stochastic(&bars, 14, 3).unwrap();
        assert!(result.k < 10.0, "expected %K near 0, got {}", result.k);
    }

    #[test]
    fn flat_range_defaults_to_midpoint() {
        let bars = vec![bar(100.0, 100.0, 100.0); 20];
        let result = calculate_stochastic(&bars, 14, 3).unwrap();
        assert!((result.k - 50.0).abs() < 1e-9);
        assert!((result.d - 50.0).abs() < 1e-9);
    }

    #[test]
    fn k_and_d_in_range() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin() * 10.0;
                bar(base + 2.0, base - 2.0, base)
            })
            .collect();
        let result = calculate_stochastic(&bars, 14, 3).unwrap();
        assert!((0.0..=100.0).contains(&result.k));
        assert!((0.0..=100.0).contains(&result.d));
    }
}
