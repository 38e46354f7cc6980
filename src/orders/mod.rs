// =============================================================================
// Order lifecycle (C11)
// =============================================================================

pub mod lifecycle;
pub mod simulated_order;

pub use lifecycle::{apply_post_close, close_order, evaluate_ai_force_exit, evaluate_exit, open_order, plan_entry, tick_maker, EntryPlan, ExitDecision};
pub use simulated_order::SimulatedOrder;
