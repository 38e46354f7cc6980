// =============================================================================
// Control surface shared state
// =============================================================================
//
// The engine tick loop is the sole writer; the HTTP/WS API (`api/`) only
// ever reads a snapshot or flips a control flag. Nothing here originates a
// trading decision — `ControlState` is observational and administrative
// only, mirroring the read/write split `app_state.rs` draws between the
// strategy loop and the REST layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::decision::Action;
use crate::modes::{ModeRegistry, StrategyStyle};

const DECISION_LOG_CAPACITY: usize = 200;
const WS_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct ModeSnapshot {
    pub name: String,
    pub style: StrategyStyle,
    pub enabled: bool,
    pub balance: f64,
    pub open_position_count: usize,
    pub consecutive_losses: u32,
    pub in_loss_cooldown: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionLogEntry {
    pub ts_ms: i64,
    pub mode: String,
    pub action: String,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStateSnapshot {
    pub paused: bool,
    pub kill_requested: bool,
    pub tick_count: u64,
    pub uptime_secs: u64,
    pub state_version: u64,
    pub symbol: String,
    pub mid_price: f64,
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::Long => "LONG",
        Action::Short => "SHORT",
        Action::Hold => "HOLD",
    }
}

/// Shared, lock-protected control state mounted as axum `State`. Cheap to
/// clone (it's an `Arc` in practice via `Arc<ControlState>`), read-heavy,
/// written once per tick from the engine loop.
pub struct ControlState {
    started_at: Instant,
    paused: AtomicBool,
    kill_requested: AtomicBool,
    tick_count: AtomicU64,
    state_version: AtomicU64,
    last_tick_ts_ms: AtomicI64,
    symbol: RwLock<String>,
    mid_price: RwLock<f64>,
    modes: RwLock<Vec<ModeSnapshot>>,
    decisions: RwLock<VecDeque<DecisionLogEntry>>,
    ws_tx: broadcast::Sender<String>,
}

impl ControlState {
    pub fn new(symbol: impl Into<String>) -> Self {
        let (ws_tx, _rx) = broadcast::channel(WS_BROADCAST_CAPACITY);
        Self {
            started_at: Instant::now(),
            paused: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            state_version: AtomicU64::new(0),
            last_tick_ts_ms: AtomicI64::new(0),
            symbol: RwLock::new(symbol.into()),
            mid_price: RwLock::new(0.0),
            modes: RwLock::new(Vec::new()),
            decisions: RwLock::new(VecDeque::with_capacity(DECISION_LOG_CAPACITY)),
            ws_tx,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn is_kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::Relaxed)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn kill(&self) {
        self.kill_requested.store(true, Ordering::Relaxed);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.ws_tx.subscribe()
    }

    pub fn snapshot(&self) -> EngineStateSnapshot {
        EngineStateSnapshot {
            paused: self.is_paused(),
            kill_requested: self.is_kill_requested(),
            tick_count: self.tick_count.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            state_version: self.state_version.load(Ordering::Relaxed),
            symbol: self.symbol.read().clone(),
            mid_price: *self.mid_price.read(),
        }
    }

    pub fn modes(&self) -> Vec<ModeSnapshot> {
        self.modes.read().clone()
    }

    pub fn decisions(&self) -> Vec<DecisionLogEntry> {
        self.decisions.read().iter().cloned().collect()
    }

    /// Called once per tick from the engine loop: refreshes the mode table,
    /// bumps the tick counter and state version, and pushes a compact delta
    /// to any connected WebSocket clients.
    pub fn publish_tick(&self, ts_ms: i64, mid_price: f64, registry: &ModeRegistry) {
        *self.mid_price.write() = mid_price;
        self.last_tick_ts_ms.store(ts_ms, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.state_version.fetch_add(1, Ordering::Relaxed);

        let snapshots: Vec<ModeSnapshot> = registry
            .iter()
            .map(|ctx| ModeSnapshot {
                name: ctx.name.clone(),
                style: ctx.style,
                enabled: ctx.config.enabled,
                balance: ctx.balance,
                open_position_count: ctx.open_position_count(),
                consecutive_losses: ctx.consecutive_losses,
                in_loss_cooldown: ctx.in_loss_cooldown(std::time::Instant::now()),
            })
            .collect();
        *self.modes.write() = snapshots;

        if self.ws_tx.receiver_count() > 0 {
            let delta = self.snapshot();
            if let Ok(json) = serde_json::to_string(&delta) {
                let _ = self.ws_tx.send(json);
            }
        }
    }

    /// Records one mode's decision for the tick into the bounded log,
    /// dropping the oldest entry once the ring fills.
    pub fn record_decision(&self, ts_ms: i64, mode: &str, action: Action, confidence: f64, reason: &str) {
        let mut log = self.decisions.write();
        if log.len() >= DECISION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(DecisionLogEntry {
            ts_ms,
            mode: mode.to_string(),
            action: action_label(action).to_string(),
            confidence,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_resume_round_trips() {
        let state = ControlState::new("BTCUSDT");
        assert!(!state.is_paused());
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn decision_log_is_bounded() {
        let state = ControlState::new("BTCUSDT");
        for i in 0..(DECISION_LOG_CAPACITY + 10) {
            state.record_decision(i as i64, "baseline", Action::Hold, 0.0, "test");
        }
        assert_eq!(state.decisions().len(), DECISION_LOG_CAPACITY);
    }
}
