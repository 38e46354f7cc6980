// =============================================================================
// Order book & microstructure indicators (C2)
// =============================================================================

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::types::{OrderBook, PriceLevel, Trade};

/// Number of top-of-book levels used for OBI.
const OBI_LEVELS: usize = 20;
/// Number of top-of-book levels used for depth imbalance.
const DEPTH_LEVELS: usize = 10;
/// Sliding window size (in trade events) for signed volume.
const SIGNED_VOLUME_WINDOW: usize = 150;

/// Snapshot of the microstructure indicators derived from the current book
/// and the trailing trade window. Recomputed on every depth event (OBI,
/// spread, depth imbalance, microprice) and refreshed for signed volume on
/// every trade event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrderBookIndicators {
    pub obi: f64,
    pub spread_abs: f64,
    pub spread_bps: f64,
    pub depth_imbalance: f64,
    pub microprice: f64,
    pub microprice_pressure: f64,
    pub signed_volume: f64,
    pub signed_volume_rate: f64,
    /// Rate of change of `obi`, 1/s. Near zero in a quiet book, large
    /// during a sudden imbalance shift.
    pub obi_velocity: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub mid_price: f64,
}

/// Owns the current order book plus the trailing signed-volume window and
/// recomputes `OrderBookIndicators` on every update.
pub struct OrderBookTracker {
    book: OrderBook,
    signed_volume_window: VecDeque<f64>,
    last_signed_volume: f64,
    last_rate_sample: Option<(Instant, f64)>,
    last_obi_sample: Option<(Instant, f64)>,
    indicators: OrderBookIndicators,
}

impl OrderBookTracker {
    pub fn new() -> Self {
        Self {
            book: OrderBook::default(),
            signed_volume_window: VecDeque::with_capacity(SIGNED_VOLUME_WINDOW),
            last_signed_volume: 0.0,
            last_rate_sample: None,
            last_obi_sample: None,
            indicators: OrderBookIndicators::default(),
        }
    }

    /// Overwrite the book with a fresh depth snapshot and recompute the
    /// book-derived indicators (OBI, spread, depth imbalance, microprice).
    /// The book is fully replaced — there is no delta merging.
    pub fn on_depth_snapshot(&mut self, book: OrderBook) {
        self.book = book;
        self.recompute_book_indicators();
    }

    /// Feed a trade into the signed-volume window and recompute the rate.
    pub fn on_trade(&mut self, trade: &Trade) {
        let signed = trade.signed_qty();
        self.signed_volume_window.push_back(signed);
        if self.signed_volume_window.len() > SIGNED_VOLUME_WINDOW {
            self.signed_volume_window.pop_front();
        }

        let total: f64 = self.signed_volume_window.iter().sum();
        self.indicators.signed_volume = total;

        let now = Instant::now();
        if let Some((prev_t, prev_v)) = self.last_rate_sample {
            let dt = now.duration_since(prev_t).as_secs_f64();
            if dt > 0.0 {
                self.indicators.signed_volume_rate = (total - prev_v) / dt;
            }
        }
        self.last_rate_sample = Some((now, total));
        self.last_signed_volume = total;
    }

    pub fn indicators(&self) -> OrderBookIndicators {
        self.indicators
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    fn recompute_book_indicators(&mut self) {
        let bids = top_levels(&self.book.bids, OBI_LEVELS);
        let asks = top_levels(&self.book.asks, OBI_LEVELS);

        let bid_qty: f64 = bids.iter().map(|l| l.quantity).sum();
        let ask_qty: f64 = asks.iter().map(|l| l.quantity).sum();
        let total_qty = bid_qty + ask_qty;
        self.indicators.obi = if total_qty > 0.0 {
            (bid_qty - ask_qty) / total_qty
        } else {
            0.0
        };

        let now = Instant::now();
        if let Some((prev_t, prev_obi)) = self.last_obi_sample {
            let dt = now.duration_since(prev_t).as_secs_f64();
            if dt > 0.0 {
                self.indicators.obi_velocity = (self.indicators.obi - prev_obi) / dt;
            }
        }
        self.last_obi_sample = Some((now, self.indicators.obi));

        let depth_bids = top_levels(&self.book.bids, DEPTH_LEVELS);
        let depth_asks = top_levels(&self.book.asks, DEPTH_LEVELS);
        let bid_depth: f64 = depth_bids.iter().map(|l| l.quantity).sum();
        let ask_depth: f64 = depth_asks.iter().map(|l| l.quantity).sum();
        let total_depth = bid_depth + ask_depth;
        self.indicators.depth_imbalance = if total_depth > 0.0 {
            (bid_depth - ask_depth) / total_depth
        } else {
            0.0
        };

        if let (Some(best_bid), Some(best_ask)) = (self.book.best_bid(), self.book.best_ask()) {
            let mid = (best_bid.price + best_ask.price) / 2.0;
            self.indicators.best_bid = best_bid.price;
            self.indicators.best_ask = best_ask.price;
            self.indicators.mid_price = mid;
            self.indicators.spread_abs = best_ask.price - best_bid.price;
            self.indicators.spread_bps = if mid > 0.0 {
                self.indicators.spread_abs / mid * 1e4
            } else {
                0.0
            };

            let qty_sum = best_bid.quantity + best_ask.quantity;
            self.indicators.microprice = if qty_sum > 0.0 {
                (best_bid.price * best_ask.quantity + best_ask.price * best_bid.quantity) / qty_sum
            } else {
                mid
            };
            self.indicators.microprice_pressure = if mid > 0.0 {
                (self.indicators.microprice - mid) / mid
            } else {
                0.0
            };
        }
    }
}

impl Default for OrderBookTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn top_levels(levels: &[PriceLevel], n: usize) -> &[PriceLevel] {
    &levels[..levels.len().min(n)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bid: f64, ask: f64, bid_qty: f64, ask_qty: f64) -> OrderBook {
        OrderBook {
            bids: vec![PriceLevel { price: bid, quantity: bid_qty }],
            asks: vec![PriceLevel { price: ask, quantity: ask_qty }],
            update_ts: 0,
        }
    }

    #[test]
    fn obi_favors_heavier_side() {
        let mut tracker = OrderBookTracker::new();
        tracker.on_depth_snapshot(book(100.0, 100.1, 8.0, 2.0));
        assert!(tracker.indicators().obi > 0.0);
    }

    #[test]
    fn spread_bps_matches_formula() {
        let mut tracker = OrderBookTracker::new();
        tracker.on_depth_snapshot(book(100.0, 100.1, 1.0, 1.0));
        let ind = tracker.indicators();
        let expected = 0.1 / 100.05 * 1e4;
        assert!((ind.spread_bps - expected).abs() < 1e-6);
    }

    #[test]
    fn signed_volume_accumulates_and_clips_window() {
        let mut tracker = OrderBookTracker::new();
        for _ in 0..(SIGNED_VOLUME_WINDOW + 10) {
            tracker.on_trade(&Trade {
                ts_ms: 0,
                price: 100.0,
                qty: 1.0,
                buyer_is_maker: false,
            });
        }
        assert_eq!(tracker.indicators().signed_volume, SIGNED_VOLUME_WINDOW as f64);
    }

    #[test]
    fn empty_book_indicators_default_to_zero() {
        let tracker = OrderBookTracker::new();
        assert_eq!(tracker.indicators().obi, 0.0);
    }
}
