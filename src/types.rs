// =============================================================================
// Core data model shared across the engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price level in an order book.
///
/// Invariant: `price > 0.0`, `quantity >= 0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Full order book snapshot. Bids are ordered descending by price, asks
/// ascending. The book is fully overwritten on each depth snapshot — there
/// is no delta merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub update_ts: i64,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    pub fn mid_price(&self) -> Option<f64> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid.price + ask.price) / 2.0)
    }

    /// `true` when top-of-book is crossed or locked — the book should be
    /// treated as stale/unusable until the next overwrite.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b.price >= a.price,
            _ => false,
        }
    }
}

/// A fixed-interval OHLCV bar. Invariant: `low <= open, close <= high`;
/// `volume >= 0`. Highs/lows must come from mid-price samples, never from
/// bid or ask alone, or ATR degenerates into a measure of spread.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub start_ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A single executed trade. `buyer_is_maker = true` means the aggressor was
/// the seller (short-initiated trade).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trade {
    pub ts_ms: i64,
    pub price: f64,
    pub qty: f64,
    pub buyer_is_maker: bool,
}

impl Trade {
    /// Signed quantity used by signed-volume / CVD accumulators: positive
    /// when the aggressor bought, negative when the aggressor sold.
    pub fn signed_qty(&self) -> f64 {
        if self.buyer_is_maker {
            -self.qty
        } else {
            self.qty
        }
    }
}

/// Which side of the market was forcibly closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationSide {
    /// A long position was force-closed (the engine sold into the market).
    Sell,
    /// A short position was force-closed (the engine bought into the market).
    Buy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub ts_ms: i64,
    pub side: LiquidationSide,
    pub qty: f64,
    pub price: f64,
}

impl LiquidationEvent {
    pub fn usd_value(&self) -> f64 {
        self.qty * self.price
    }
}

/// Directional tag shared by whale trades, cascade classification, and
/// decision-engine actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// A single large ("whale") trade retained in the whale-tracker windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LargeTradeRecord {
    pub ts: DateTime<Utc>,
    pub qty: f64,
    pub price: f64,
    pub direction: Direction,
}

/// Emitted by the whale tracker when count/total/dominance bounds all hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WhaleSignal {
    pub direction: Direction,
    pub ts: DateTime<Utc>,
    pub net_qty: f64,
    pub dominance_ratio: f64,
    pub long_qty: f64,
    pub short_qty: f64,
    pub total_qty: f64,
    pub whale_vwap: f64,
}

/// Coarse directional bias recorded on the market snapshot. Distinct from
/// the richer 5-variant `MarketRegime` used for mode-gating — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotRegime {
    Bull,
    Bear,
    Neutral,
    Consolidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendState {
    StrongUp,
    LeanUp,
    Range,
    LeanDown,
    StrongDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureDirection {
    Bullish,
    Bearish,
    Range,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StructureState {
    pub direction: StructureDirection,
    pub persistence: u32,
    pub structure_break: bool,
    pub pullback_ready: bool,
}

/// `PENDING` may only transition to `FILLED`, `TAKER_FALLBACK`, or
/// `CANCELLED` — no other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MakerStatus {
    Pending,
    Filled,
    Cancelled,
    TakerFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    VpinProtectiveStop,
    TrailingStop,
    TimeLimit,
    TimeStop,
    VpinLockProfit,
    ReverseSignal,
    AiCutLoss,
    AiFlip,
    AiStopLoss,
    MakerTimeoutCancelled,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::VpinProtectiveStop => "VPIN_PROTECTIVE_STOP",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TimeLimit => "TIME_LIMIT",
            ExitReason::TimeStop => "TIME_STOP",
            ExitReason::VpinLockProfit => "VPIN_LOCK_PROFIT",
            ExitReason::ReverseSignal => "REVERSE_SIGNAL",
            ExitReason::AiCutLoss => "AI_CUT_LOSS",
            ExitReason::AiFlip => "AI_FLIP",
            ExitReason::AiStopLoss => "AI_STOP_LOSS",
            ExitReason::MakerTimeoutCancelled => "MAKER_TIMEOUT_CANCELLED",
        };
        write!(f, "{s}")
    }
}
