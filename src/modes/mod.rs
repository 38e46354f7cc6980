// =============================================================================
// Mode Registry
// =============================================================================
//
// Each configured trading mode runs the same C10 decision pipeline against an
// isolated slice of state: its own balance, its own open orders, its own
// cooldowns. No mode ever reads or mutates another mode's balance or orders;
// the only thing modes share is the read-only MarketSnapshot produced by C8.

mod context;

pub use context::{ModeContext, ModeRegistry, PendingEntry, StrategyStyle};
