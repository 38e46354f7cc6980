// =============================================================================
// Error taxonomy
// =============================================================================
//
// Distinguishes recoverable-and-logged kinds from the one fatal kind. The
// main loop matches on `EngineError::kind()` rather than string-matching
// messages; `anyhow` wraps these at the outer I/O boundary for
// context-carrying propagation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market data fault: {0}")]
    MarketDataFault(String),

    #[error("bridge/config file fault: {0}")]
    FileFault(String),

    #[error("stale AI command (age {age_secs}s > 120s)")]
    StaleAiCommand { age_secs: i64 },

    #[error("position accounting invariant violated: {0}")]
    PositionInvariantViolation(String),

    #[error("loss-review application failed: {0}")]
    LossReviewFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Log and continue the next tick.
    Recoverable,
    /// Halt the offending mode, write a diagnostic, continue other modes.
    Fatal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PositionInvariantViolation(_) => ErrorKind::Fatal,
            _ => ErrorKind::Recoverable,
        }
    }
}
