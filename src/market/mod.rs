// =============================================================================
// Market microstructure, structure, and risk modules (C2-C8)
// =============================================================================

pub mod bars;
pub mod cascade;
pub mod entropy;
pub mod hurst;
pub mod liquidation_pressure;
pub mod orderbook;
pub mod regime;
pub mod snapshot;
pub mod trend;
pub mod vpin;
pub mod whale;

pub use bars::BarAggregator;
pub use cascade::{CascadeAction, CascadeDetector, CascadeDirection, CascadeLevel, CascadeSignal};
pub use liquidation_pressure::{DirectionalBias, LiquidationPressureReader, LiquidationPressureSnapshot, PressureLevel};
pub use orderbook::{OrderBookIndicators, OrderBookTracker};
pub use regime::{MarketRegime, RegimeDetector, RegimeState};
pub use snapshot::{build as build_snapshot, MarketSnapshot, SnapshotInputs};
pub use trend::{TrendAnalyzer, TrendReading};
pub use vpin::{VpinCalculator, VpinLevel, VpinState};
pub use whale::{Grade, Recommendation, ReversalRisk, WhaleTracker};
