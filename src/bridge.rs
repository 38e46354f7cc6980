// =============================================================================
// AI bridge I/O (C12)
// =============================================================================
//
// One JSON file per AI-driven mode. The engine reads the AI's command block
// at most once per tick (debounced on mtime) and writes its own status and
// feedback blocks after every decision/status change, using the same
// write-to-temp-then-rename atomicity as `runtime_config.rs::save`. A parse
// error on read returns the previously cached value and logs once; it never
// panics — the external AI process can always leave the file partially
// written mid-rewrite.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::Direction;

/// AI commands are rejected once older than this.
pub const STALE_COMMAND_SECS: i64 = 120;
/// `maker_timeout_event` is aged out of the written file after this long.
const MAKER_TIMEOUT_EVENT_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeCommand {
    Long,
    Short,
    Hold,
    Wait,
    AddLong,
    AddShort,
    CutLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DynamicParams {
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub trailing_activation: Option<f64>,
    #[serde(default)]
    pub trailing_distance: Option<f64>,
    #[serde(default)]
    pub max_holding_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct RecommendedAdjustments {
    #[serde(default)]
    pub confidence_threshold_delta: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub leverage_multiplier: Option<f64>,
    #[serde(default)]
    pub cooldown_minutes: Option<f64>,
}

/// The `ai_to_<mode>` command block, read by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCommand {
    pub command: BridgeCommand,
    pub direction: BridgeDirection,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub whale_reversal_price: Option<f64>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub dynamic_params: Option<DynamicParams>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub recommended_adjustments: Option<RecommendedAdjustments>,
}

impl AiCommand {
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds()
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_secs(now) > STALE_COMMAND_SECS
    }

    /// `None` for HOLD/WAIT or a stale command; direction otherwise.
    pub fn implied_direction(&self) -> Option<Direction> {
        match self.direction {
            BridgeDirection::Bullish => Some(Direction::Long),
            BridgeDirection::Bearish => Some(Direction::Short),
            BridgeDirection::Neutral => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineStatus {
    Idle,
    Opening,
    InPosition,
    Closing,
}

/// Engine-written status block (`<mode>_to_ai`), refreshed every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBlock {
    pub status: EngineStatus,
    #[serde(default)]
    pub position: Option<Direction>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub current_pnl_usdt: Option<f64>,
    #[serde(default)]
    pub current_pnl_pct: Option<f64>,
    #[serde(default)]
    pub holding_seconds: Option<i64>,
    pub whale_status: String,
    pub market_microstructure: String,
    pub volatility: f64,
    pub liquidation_cascade: String,
    pub risk_indicators: String,
    pub direction_probes: String,
    #[serde(default)]
    pub loss_review: Option<LossReviewRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossReviewRequest {
    pub roi_pct: f64,
    pub consecutive_losses: u32,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedbackLoop {
    pub total_trades: u64,
    pub wins: u64,
    pub win_rate: f64,
    pub success_streak: u32,
    pub failure_streak: u32,
    pub best_trade_pnl: f64,
    pub worst_trade_pnl: f64,
    pub avg_holding_time_secs: f64,
    pub last_trade_result: Option<f64>,
    #[serde(default)]
    pub recent_predictions: VecDeque<f64>,
    pub prediction_accuracy: f64,
}

impl FeedbackLoop {
    pub fn record_close(&mut self, roi_pct: f64, holding_secs: i64) {
        self.total_trades += 1;
        if roi_pct > 0.0 {
            self.wins += 1;
            self.success_streak += 1;
            self.failure_streak = 0;
        } else {
            self.success_streak = 0;
            self.failure_streak += 1;
        }
        self.win_rate = self.wins as f64 / self.total_trades as f64;
        self.best_trade_pnl = self.best_trade_pnl.max(roi_pct);
        self.worst_trade_pnl = self.worst_trade_pnl.min(roi_pct);
        let n = self.total_trades as f64;
        self.avg_holding_time_secs += (holding_secs as f64 - self.avg_holding_time_secs) / n;
        self.last_trade_result = Some(roi_pct);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerTimeoutEvent {
    pub order_id: String,
    pub at: DateTime<Utc>,
}

/// Full contents of one mode's bridge JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeFile {
    #[serde(default)]
    pub ai_command: Option<AiCommand>,
    #[serde(default)]
    pub engine_status: Option<StatusBlock>,
    #[serde(default)]
    pub feedback_loop: FeedbackLoop,
    #[serde(default)]
    pub maker_timeout_event: Option<MakerTimeoutEvent>,
    pub last_updated: DateTime<Utc>,
}

impl Default for BridgeFile {
    fn default() -> Self {
        Self {
            ai_command: None,
            engine_status: None,
            feedback_loop: FeedbackLoop::default(),
            maker_timeout_event: None,
            last_updated: Utc::now(),
        }
    }
}

/// Debounced reader/writer for one mode's bridge file. Reads are gated on
/// mtime, matching `RuntimeConfig::is_modified_since`'s idiom; a parse
/// failure logs once and keeps serving the last good value rather than
/// propagating an error up to the decision pipeline.
pub struct BridgeStore {
    path: PathBuf,
    last_read_mtime: Option<SystemTime>,
    cached: BridgeFile,
    warned_once: bool,
}

impl BridgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_read_mtime: None,
            cached: BridgeFile::default(),
            warned_once: false,
        }
    }

    /// Re-read the file if its mtime advanced since the last read. Returns
    /// the (possibly stale) cached contents either way.
    pub fn refresh(&mut self) -> &BridgeFile {
        let mtime = Path::new(&self.path).metadata().and_then(|m| m.modified()).ok();
        let changed = match (mtime, self.last_read_mtime) {
            (Some(m), Some(last)) => m > last,
            (Some(_), None) => true,
            _ => false,
        };
        if changed {
            match std::fs::read_to_string(&self.path) {
                Ok(contents) => match serde_json::from_str::<BridgeFile>(&contents) {
                    Ok(parsed) => {
                        self.cached = parsed;
                        self.last_read_mtime = mtime;
                        self.warned_once = false;
                    }
                    Err(e) => {
                        if !self.warned_once {
                            warn!(path = %self.path.display(), error = %e, "bridge file parse failed, keeping previous value");
                            self.warned_once = true;
                        }
                    }
                },
                Err(_) => {
                    // Not yet written by the AI process; keep defaults.
                }
            }
        }
        &self.cached
    }

    pub fn command(&self) -> Option<&AiCommand> {
        self.cached.ai_command.as_ref()
    }

    /// Write the engine's status and feedback blocks back to the file,
    /// preserving whatever `ai_command` the AI process most recently wrote.
    /// Atomic write-to-temp-then-rename, matching `RuntimeConfig::save`.
    pub fn write_status(
        &mut self,
        status: StatusBlock,
        feedback: FeedbackLoop,
        maker_timeout: Option<MakerTimeoutEvent>,
    ) -> anyhow::Result<()> {
        self.cached.engine_status = Some(status);
        self.cached.feedback_loop = feedback;
        let now = Utc::now();
        self.cached.maker_timeout_event = maker_timeout.or_else(|| {
            self.cached.maker_timeout_event.clone().filter(|e| (now - e.at).num_seconds() < MAKER_TIMEOUT_EVENT_TTL_SECS)
        });
        self.cached.last_updated = now;

        let json = serde_json::to_string_pretty(&self.cached)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Reader for the externally-collected liquidation-pressure-adjacent bridge
/// concept doesn't apply here; this module only owns per-mode AI bridges.
/// The liquidation pressure snapshot itself is read by
/// `market::liquidation_pressure::LiquidationPressureReader`, rate-limited
/// to once every 10 s even if its mtime changes faster than that.
pub const LIQUIDATION_SNAPSHOT_MIN_REFRESH_SECS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let mut store = BridgeStore::new("/nonexistent/bridge/does/not/exist.json");
        let file = store.refresh();
        assert!(file.ai_command.is_none());
    }

    #[test]
    fn stale_command_is_detected() {
        let cmd = AiCommand {
            command: BridgeCommand::Long,
            direction: BridgeDirection::Bullish,
            confidence: 0.8,
            leverage: None,
            whale_reversal_price: None,
            stop_loss_pct: None,
            dynamic_params: None,
            timestamp: Utc::now() - chrono::Duration::seconds(200),
            recommended_adjustments: None,
        };
        assert!(cmd.is_stale(Utc::now()));
    }

    #[test]
    fn round_trips_through_write_and_refresh() {
        let dir = std::env::temp_dir().join(format!("bridge_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("baseline_bridge.json");

        let mut store = BridgeStore::new(&path);
        let status = StatusBlock {
            status: EngineStatus::Idle,
            position: None,
            entry_price: None,
            current_pnl_usdt: None,
            current_pnl_pct: None,
            holding_seconds: None,
            whale_status: "none".into(),
            market_microstructure: "neutral".into(),
            volatility: 0.1,
            liquidation_cascade: "quiet".into(),
            risk_indicators: "ok".into(),
            direction_probes: "none".into(),
            loss_review: None,
        };
        store.write_status(status, FeedbackLoop::default(), None).unwrap();

        let mut reader = BridgeStore::new(&path);
        let file = reader.refresh();
        assert!(file.engine_status.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn feedback_loop_tracks_win_rate() {
        let mut fb = FeedbackLoop::default();
        fb.record_close(2.0, 300);
        fb.record_close(-1.0, 120);
        assert_eq!(fb.total_trades, 2);
        assert_eq!(fb.wins, 1);
        assert!((fb.win_rate - 0.5).abs() < 1e-9);
    }
}
