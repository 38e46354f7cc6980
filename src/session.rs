// =============================================================================
// Persisted session artifacts (ambient)
// =============================================================================
//
// Three flat files, written alongside `runtime_config.json` in the working
// directory, all append-only for the lifetime of one run:
//
//   signal_diagnostics.csv — one row per mode per tick: the full decision
//                            pipeline's inputs and outcome, for offline
//                            strategy review.
//   trade_ledger.json      — one JSON object per line (JSON Lines), appended
//                            on every order close.
//   whale_flips.csv        — one row per whale-tracker direction flip.
//
// CSV rows are written by hand rather than pulled in through a table-writer
// crate: the column set is fixed and every field is already a primitive,
// so the only real job is comma-joining and quoting anything that might
// itself contain a comma (entry/exit reason strings).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::decision::Action;
use crate::market::snapshot::MarketSnapshot;
use crate::modes::StrategyStyle;
use crate::orders::SimulatedOrder;
use crate::types::{Direction, WhaleSignal};

const SIGNAL_CSV_HEADER: &str = "timestamp,mode,style,decision_stage,action,reason,signal_score,funding_zscore,obi,vpin,spread_bps,microprice_pressure,micro_signal,micro_confidence,large_trade_boost,large_trade_direction,large_trade_net_qty,entry_reason,price,rsi_14,stoch_k,stoch_d,ma_20,boll_upper,boll_lower,market_regime,is_consolidating,momentum_pct,volatility_pct,trend_strength,range_position,ma_distance,volume_ratio";

const WHALE_FLIP_CSV_HEADER: &str = "timestamp,mode,direction,net_qty,dominance_ratio,whale_vwap";

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::Long => "LONG",
        Action::Short => "SHORT",
        Action::Hold => "HOLD",
    }
}

fn style_label(style: StrategyStyle) -> &'static str {
    match style {
        StrategyStyle::Baseline => "baseline",
        StrategyStyle::Trend => "trend",
        StrategyStyle::Scalper => "scalper",
        StrategyStyle::Reversion => "reversion",
        StrategyStyle::Breakout => "breakout",
        StrategyStyle::Volume => "volume",
        StrategyStyle::Volatility => "volatility",
        StrategyStyle::Whale => "whale",
        StrategyStyle::LpWhaleBurst => "lp_whale_burst",
        StrategyStyle::AiWhaleHunter => "ai_whale_hunter",
        StrategyStyle::AiDragon2 => "ai_dragon2",
        StrategyStyle::AiShrimp => "ai_shrimp",
        StrategyStyle::AiLion => "ai_lion",
        StrategyStyle::DirectionProbeLong => "direction_probe_long",
        StrategyStyle::DirectionProbeShort => "direction_probe_short",
    }
}

/// One row of the per-tick, per-mode signal diagnostics log.
pub struct SignalLogRow<'a> {
    pub ts: DateTime<Utc>,
    pub mode: &'a str,
    pub style: StrategyStyle,
    pub decision_stage: &'a str,
    pub action: Action,
    pub reason: &'a str,
    pub signal_score: f64,
    pub snapshot: &'a MarketSnapshot,
    pub micro_signal: &'a str,
    pub micro_confidence: f64,
    pub large_trade_boost: f64,
    pub large_trade_direction: Option<Direction>,
    pub large_trade_net_qty: f64,
    pub entry_reason: &'a str,
    pub ma_distance: f64,
    pub volume_ratio: f64,
}

impl<'a> SignalLogRow<'a> {
    fn to_csv_line(&self) -> String {
        let snap = self.snapshot;
        let large_trade_direction = match self.large_trade_direction {
            Some(Direction::Long) => "LONG",
            Some(Direction::Short) => "SHORT",
            None => "",
        };
        let is_consolidating = matches!(snap.structure.direction, crate::types::StructureDirection::Range);
        [
            self.ts.to_rfc3339(),
            csv_escape(self.mode),
            style_label(self.style).to_string(),
            csv_escape(self.decision_stage),
            action_label(self.action).to_string(),
            csv_escape(self.reason),
            format!("{:.6}", self.signal_score),
            format!("{:.6}", snap.funding_zscore),
            format!("{:.6}", snap.obi),
            format!("{:.6}", snap.vpin_value),
            format!("{:.4}", snap.spread_bps),
            format!("{:.6}", snap.microprice_pressure),
            csv_escape(self.micro_signal),
            format!("{:.4}", self.micro_confidence),
            format!("{:.4}", self.large_trade_boost),
            large_trade_direction.to_string(),
            format!("{:.6}", self.large_trade_net_qty),
            csv_escape(self.entry_reason),
            format!("{:.2}", snap.mid_price),
            format!("{:.2}", snap.rsi),
            format!("{:.2}", snap.stoch_k),
            format!("{:.2}", snap.stoch_d),
            format!("{:.2}", snap.ma20),
            format!("{:.2}", snap.bollinger_upper),
            format!("{:.2}", snap.bollinger_lower),
            format!("{:?}", snap.regime).to_uppercase(),
            is_consolidating.to_string(),
            format!("{:.4}", snap.momentum_pct),
            format!("{:.4}", snap.volatility_pct),
            format!("{:.4}", snap.trend_confidence),
            format!("{:.4}", snap.range_position),
            format!("{:.4}", self.ma_distance),
            format!("{:.4}", self.volume_ratio),
        ]
        .join(",")
    }
}

/// One JSON-Lines entry per closed trade, appended to `trade_ledger.json`.
#[derive(Debug, Serialize)]
pub struct TradeLedgerEntry {
    pub mode: String,
    pub order_id: String,
    pub direction: Direction,
    pub leverage: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: String,
    pub pnl_usdt: f64,
    pub roi: f64,
    pub total_fees: f64,
}

impl TradeLedgerEntry {
    pub fn from_order(order: &SimulatedOrder) -> Option<Self> {
        Some(Self {
            mode: order.mode.clone(),
            order_id: order.order_id.clone(),
            direction: order.direction,
            leverage: order.leverage,
            entry_price: order.actual_entry_price,
            exit_price: order.exit_price?,
            entry_time: order.entry_time,
            exit_time: order.exit_time?,
            exit_reason: order.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
            pnl_usdt: order.pnl_usdt.unwrap_or(0.0),
            roi: order.roi.unwrap_or(0.0),
            total_fees: order.total_fees.unwrap_or(0.0),
        })
    }
}

/// Owns the three append-only session files for one run. Every append opens
/// in append mode and flushes immediately — this is paper-trading
/// diagnostics, not a high-throughput log, so durability wins over batching.
pub struct SessionRecorder {
    signals_path: PathBuf,
    trades_path: PathBuf,
    whale_flips_path: PathBuf,
}

fn ensure_header(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(f, "{header}")?;
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    writeln!(f, "{line}")?;
    Ok(())
}

impl SessionRecorder {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create session directory {}", dir.display()))?;

        let signals_path = dir.join("signal_diagnostics.csv");
        let trades_path = dir.join("trade_ledger.json");
        let whale_flips_path = dir.join("whale_flips.csv");

        ensure_header(&signals_path, SIGNAL_CSV_HEADER)?;
        ensure_header(&whale_flips_path, WHALE_FLIP_CSV_HEADER)?;
        if !trades_path.exists() {
            File::create(&trades_path)?;
        }

        Ok(Self {
            signals_path,
            trades_path,
            whale_flips_path,
        })
    }

    pub fn record_signal(&self, row: &SignalLogRow<'_>) {
        if let Err(e) = append_line(&self.signals_path, &row.to_csv_line()) {
            tracing::warn!(error = %e, "failed to append signal diagnostics row");
        }
    }

    pub fn record_trade_close(&self, order: &SimulatedOrder) {
        let Some(entry) = TradeLedgerEntry::from_order(order) else {
            return;
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                if let Err(e) = append_line(&self.trades_path, &json) {
                    tracing::warn!(error = %e, "failed to append trade ledger entry");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize trade ledger entry"),
        }
    }

    pub fn record_whale_flip(&self, mode: &str, signal: &WhaleSignal) {
        let direction = match signal.direction {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        };
        let line = format!(
            "{},{},{},{:.6},{:.4},{:.2}",
            signal.ts.to_rfc3339(),
            csv_escape(mode),
            direction,
            signal.net_qty,
            signal.dominance_ratio,
            signal.whale_vwap,
        );
        if let Err(e) = append_line(&self.whale_flips_path, &line) {
            tracing::warn!(error = %e, "failed to append whale flip row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escape_wraps_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("has \"quote\""), "\"has \"\"quote\"\"\"");
    }

    #[test]
    fn session_recorder_creates_files_with_headers() {
        let dir = std::env::temp_dir().join(format!("session_test_{}", uuid::Uuid::new_v4()));
        let recorder = SessionRecorder::new(&dir).unwrap();
        assert!(recorder.signals_path.exists());
        assert!(recorder.whale_flips_path.exists());
        assert!(recorder.trades_path.exists());

        let contents = std::fs::read_to_string(&recorder.signals_path).unwrap();
        assert!(contents.starts_with("timestamp,mode,style"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
