// =============================================================================
// Runtime configuration
// =============================================================================
//
// Mirrors the load/save discipline used throughout this codebase: every
// field carries a `#[serde(default)]` fallback so a partially-written or
// older-version file degrades to sane defaults instead of failing to parse,
// and `save()` writes to a temp file then renames over the target for
// atomicity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::modes::StrategyStyle;

fn default_maker_rate() -> f64 {
    0.0002
}
fn default_taker_rate() -> f64 {
    0.0005
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default = "default_maker_rate")]
    pub maker_rate: f64,
    #[serde(default = "default_taker_rate")]
    pub taker_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_rate: default_maker_rate(),
            taker_rate: default_taker_rate(),
        }
    }
}

fn default_maker_offset_bps() -> f64 {
    1.0
}
fn default_maker_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_taker_slippage_pct() -> f64 {
    0.02
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_maker_offset_bps")]
    pub maker_offset_bps: f64,
    #[serde(default = "default_maker_timeout_secs")]
    pub maker_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub allow_taker_fallback: bool,
    #[serde(default = "default_taker_slippage_pct")]
    pub taker_slippage_pct: f64,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maker_offset_bps: default_maker_offset_bps(),
            maker_timeout_secs: default_maker_timeout_secs(),
            allow_taker_fallback: true,
            taker_slippage_pct: default_taker_slippage_pct(),
        }
    }
}

fn default_whale_threshold_btc() -> f64 {
    1.0
}
fn default_whale_min_count() -> usize {
    5
}
fn default_whale_min_total() -> f64 {
    3.0
}
fn default_whale_min_dominance() -> f64 {
    0.6
}
fn default_whale_window_secs() -> i64 {
    30
}
fn default_whale_min_impact_pct() -> f64 {
    0.05
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleConfig {
    #[serde(default = "default_whale_threshold_btc")]
    pub trade_threshold_btc: f64,
    #[serde(default = "default_whale_min_count")]
    pub min_count: usize,
    #[serde(default = "default_whale_min_total")]
    pub min_total: f64,
    #[serde(default = "default_whale_min_dominance")]
    pub min_dominance: f64,
    #[serde(default = "default_whale_window_secs")]
    pub window_secs: i64,
    #[serde(default = "default_whale_min_impact_pct")]
    pub min_impact_pct: f64,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        Self {
            trade_threshold_btc: default_whale_threshold_btc(),
            min_count: default_whale_min_count(),
            min_total: default_whale_min_total(),
            min_dominance: default_whale_min_dominance(),
            window_secs: default_whale_window_secs(),
            min_impact_pct: default_whale_min_impact_pct(),
        }
    }
}

fn default_vpin_bucket_usd() -> f64 {
    20_000.0
}
fn default_vpin_num_buckets() -> usize {
    40
}
fn default_bar_interval_secs() -> i64 {
    3
}
fn default_tick_interval_secs() -> u64 {
    2
}
fn default_initial_capital() -> f64 {
    100.0
}
fn default_duration_hours() -> f64 {
    8.0
}
fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_entry_cooldown_secs() -> u64 {
    120
}
fn default_leverage_cap() -> f64 {
    75.0
}
fn default_base_position_pct() -> f64 {
    0.25
}
fn default_max_size_multiplier() -> f64 {
    1.5
}
fn default_min_holding_seconds() -> u64 {
    60
}
fn default_max_holding_hours() -> f64 {
    4.0
}
fn default_min_reverse_exit_seconds() -> u64 {
    120
}

/// Per-mode configuration. One entry per active mode in `RuntimeConfig::modes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub style: StrategyStyle,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_entry_cooldown_secs")]
    pub entry_cooldown_secs: u64,
    #[serde(default = "default_leverage_cap")]
    pub leverage_cap: f64,
    #[serde(default = "default_base_position_pct")]
    pub base_position_pct: f64,
    #[serde(default = "default_max_size_multiplier")]
    pub max_size_multiplier: f64,
    #[serde(default = "default_min_holding_seconds")]
    pub min_holding_seconds: u64,
    #[serde(default = "default_max_holding_hours")]
    pub max_holding_hours: f64,
    #[serde(default = "default_min_reverse_exit_seconds")]
    pub min_reverse_exit_seconds: u64,
    #[serde(default)]
    pub allow_relaxed: bool,
    #[serde(default)]
    pub invert_signal: bool,
    /// Path to this mode's AI bridge file. `None` for non-AI modes.
    #[serde(default)]
    pub bridge_path: Option<String>,
}

fn default_modes() -> HashMap<String, ModeConfig> {
    let mut m = HashMap::new();
    m.insert(
        "baseline".to_string(),
        ModeConfig {
            style: StrategyStyle::Baseline,
            enabled: true,
            entry_cooldown_secs: 120,
            leverage_cap: 50.0,
            base_position_pct: default_base_position_pct(),
            max_size_multiplier: default_max_size_multiplier(),
            min_holding_seconds: default_min_holding_seconds(),
            max_holding_hours: default_max_holding_hours(),
            min_reverse_exit_seconds: default_min_reverse_exit_seconds(),
            allow_relaxed: false,
            invert_signal: false,
            bridge_path: None,
        },
    );
    m.insert(
        "trend".to_string(),
        ModeConfig {
            style: StrategyStyle::Trend,
            entry_cooldown_secs: 75,
            leverage_cap: 60.0,
            ..default_mode(StrategyStyle::Trend)
        },
    );
    m.insert(
        "scalper".to_string(),
        ModeConfig {
            style: StrategyStyle::Scalper,
            entry_cooldown_secs: 90,
            leverage_cap: 75.0,
            ..default_mode(StrategyStyle::Scalper)
        },
    );
    m.insert(
        "whale".to_string(),
        ModeConfig {
            style: StrategyStyle::Whale,
            entry_cooldown_secs: 30,
            leverage_cap: 75.0,
            ..default_mode(StrategyStyle::Whale)
        },
    );
    m.insert(
        "reversion".to_string(),
        ModeConfig {
            style: StrategyStyle::Reversion,
            entry_cooldown_secs: 60,
            leverage_cap: 50.0,
            ..default_mode(StrategyStyle::Reversion)
        },
    );
    m.insert(
        "breakout".to_string(),
        ModeConfig {
            style: StrategyStyle::Breakout,
            entry_cooldown_secs: 2700,
            leverage_cap: 60.0,
            ..default_mode(StrategyStyle::Breakout)
        },
    );
    m.insert(
        "volume".to_string(),
        ModeConfig {
            style: StrategyStyle::Volume,
            entry_cooldown_secs: 1800,
            leverage_cap: 60.0,
            ..default_mode(StrategyStyle::Volume)
        },
    );
    m.insert(
        "volatility".to_string(),
        ModeConfig {
            style: StrategyStyle::Volatility,
            entry_cooldown_secs: 1200,
            leverage_cap: 50.0,
            ..default_mode(StrategyStyle::Volatility)
        },
    );
    m.insert(
        "lp_whale_burst".to_string(),
        ModeConfig {
            style: StrategyStyle::LpWhaleBurst,
            entry_cooldown_secs: 25,
            leverage_cap: 75.0,
            ..default_mode(StrategyStyle::LpWhaleBurst)
        },
    );
    m.insert(
        "ai_whale_hunter".to_string(),
        ModeConfig {
            style: StrategyStyle::AiWhaleHunter,
            entry_cooldown_secs: 180,
            leverage_cap: 75.0,
            bridge_path: Some("bridge/ai_whale_hunter.json".to_string()),
            ..default_mode(StrategyStyle::AiWhaleHunter)
        },
    );
    m.insert(
        "ai_dragon2".to_string(),
        ModeConfig {
            style: StrategyStyle::AiDragon2,
            entry_cooldown_secs: 180,
            leverage_cap: 75.0,
            bridge_path: Some("bridge/ai_dragon2.json".to_string()),
            ..default_mode(StrategyStyle::AiDragon2)
        },
    );
    m.insert(
        "ai_shrimp".to_string(),
        ModeConfig {
            style: StrategyStyle::AiShrimp,
            entry_cooldown_secs: 180,
            leverage_cap: 50.0,
            bridge_path: Some("bridge/ai_shrimp.json".to_string()),
            ..default_mode(StrategyStyle::AiShrimp)
        },
    );
    m.insert(
        "ai_lion".to_string(),
        ModeConfig {
            style: StrategyStyle::AiLion,
            entry_cooldown_secs: 180,
            leverage_cap: 75.0,
            bridge_path: Some("bridge/ai_lion.json".to_string()),
            ..default_mode(StrategyStyle::AiLion)
        },
    );
    m.insert(
        "direction_probe_long".to_string(),
        ModeConfig {
            style: StrategyStyle::DirectionProbeLong,
            entry_cooldown_secs: 60,
            leverage_cap: 25.0,
            ..default_mode(StrategyStyle::DirectionProbeLong)
        },
    );
    m.insert(
        "direction_probe_short".to_string(),
        ModeConfig {
            style: StrategyStyle::DirectionProbeShort,
            entry_cooldown_secs: 60,
            leverage_cap: 25.0,
            ..default_mode(StrategyStyle::DirectionProbeShort)
        },
    );
    m
}

pub(crate) fn default_mode(style: StrategyStyle) -> ModeConfig {
    ModeConfig {
        style,
        enabled: true,
        entry_cooldown_secs: default_entry_cooldown_secs(),
        leverage_cap: default_leverage_cap(),
        base_position_pct: default_base_position_pct(),
        max_size_multiplier: default_max_size_multiplier(),
        min_holding_seconds: default_min_holding_seconds(),
        max_holding_hours: default_max_holding_hours(),
        min_reverse_exit_seconds: default_min_reverse_exit_seconds(),
        allow_relaxed: false,
        invert_signal: false,
        bridge_path: None,
    }
}

fn default_max_spread_bps() -> f64 {
    3.0
}
fn default_min_obi_abs() -> f64 {
    0.1
}
fn default_vpin_relaxed_gate() -> f64 {
    0.75
}
fn default_funding_threshold() -> f64 {
    1.5
}
fn default_signal_threshold() -> f64 {
    0.2
}
fn default_threshold_discount() -> f64 {
    0.85
}
fn default_min_net_profit_usd() -> f64 {
    3.0
}
fn default_min_net_profit_fee_ratio() -> f64 {
    0.30
}
fn default_lp_size_boost_cap() -> f64 {
    1.35
}
fn default_lp_confidence_boost_cap() -> f64 {
    0.12
}
fn default_entry_delay_secs() -> u64 {
    5
}
fn default_entry_delay_max_move_pct() -> f64 {
    0.3
}

/// Decision-engine thresholds that are not per-mode: gating levels shared
/// across every style's pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionThresholds {
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,
    #[serde(default = "default_min_obi_abs")]
    pub min_obi_abs: f64,
    #[serde(default = "default_vpin_relaxed_gate")]
    pub vpin_relaxed_gate: f64,
    #[serde(default = "default_funding_threshold")]
    pub funding_threshold: f64,
    #[serde(default = "default_signal_threshold")]
    pub signal_threshold: f64,
    #[serde(default = "default_threshold_discount")]
    pub threshold_discount: f64,
    #[serde(default = "default_min_net_profit_usd")]
    pub min_net_profit_usd: f64,
    #[serde(default = "default_min_net_profit_fee_ratio")]
    pub min_net_profit_fee_ratio: f64,
    #[serde(default = "default_lp_size_boost_cap")]
    pub lp_size_boost_cap: f64,
    #[serde(default = "default_lp_confidence_boost_cap")]
    pub lp_confidence_boost_cap: f64,
    #[serde(default = "default_entry_delay_secs")]
    pub entry_delay_secs: u64,
    #[serde(default = "default_entry_delay_max_move_pct")]
    pub entry_delay_max_move_pct: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            max_spread_bps: default_max_spread_bps(),
            min_obi_abs: default_min_obi_abs(),
            vpin_relaxed_gate: default_vpin_relaxed_gate(),
            funding_threshold: default_funding_threshold(),
            signal_threshold: default_signal_threshold(),
            threshold_discount: default_threshold_discount(),
            min_net_profit_usd: default_min_net_profit_usd(),
            min_net_profit_fee_ratio: default_min_net_profit_fee_ratio(),
            lp_size_boost_cap: default_lp_size_boost_cap(),
            lp_confidence_boost_cap: default_lp_confidence_boost_cap(),
            entry_delay_secs: default_entry_delay_secs(),
            entry_delay_max_move_pct: default_entry_delay_max_move_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_initial_capital")]
    pub initial_capital_usdt: f64,
    #[serde(default = "default_duration_hours")]
    pub duration_hours: f64,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub maker: MakerConfig,
    #[serde(default)]
    pub whale: WhaleConfig,
    #[serde(default = "default_vpin_bucket_usd")]
    pub vpin_bucket_usd: f64,
    #[serde(default = "default_vpin_num_buckets")]
    pub vpin_num_buckets: usize,
    #[serde(default = "default_bar_interval_secs")]
    pub bar_interval_secs: i64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub thresholds: DecisionThresholds,
    #[serde(default = "default_modes")]
    pub modes: HashMap<String, ModeConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            initial_capital_usdt: default_initial_capital(),
            duration_hours: default_duration_hours(),
            fees: FeeSchedule::default(),
            maker: MakerConfig::default(),
            whale: WhaleConfig::default(),
            vpin_bucket_usd: default_vpin_bucket_usd(),
            vpin_num_buckets: default_vpin_num_buckets(),
            bar_interval_secs: default_bar_interval_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            thresholds: DecisionThresholds::default(),
            modes: default_modes(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `path`, falling back to defaults on any I/O or parse error.
    /// Never fails — a missing or corrupt config file is not fatal.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to parse runtime config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path, "no runtime config found, using defaults");
                Self::default()
            }
        }
    }

    /// Atomic write-to-temp-then-rename save.
    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = format!("{path}.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// `true` if `path`'s mtime is newer than `since`.
    pub fn is_modified_since(path: &str, since: std::time::SystemTime) -> bool {
        Path::new(path)
            .metadata()
            .and_then(|m| m.modified())
            .map(|mtime| mtime > since)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.modes.contains_key("baseline"));
        assert!(cfg.fees.taker_rate > cfg.fees.maker_rate);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = std::env::temp_dir().join(format!("cfg_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime_config.json");
        let path_str = path.to_str().unwrap();

        let mut cfg = RuntimeConfig::default();
        cfg.symbol = "ETHUSDT".to_string();
        cfg.save(path_str).unwrap();

        let loaded = RuntimeConfig::load(path_str);
        assert_eq!(loaded.symbol, "ETHUSDT");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let loaded = RuntimeConfig::load("/nonexistent/path/does/not/exist.json");
        assert_eq!(loaded.symbol, default_symbol());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("cfg_test_partial_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let loaded = RuntimeConfig::load(path.to_str().unwrap());
        assert_eq!(loaded.symbol, default_symbol());

        std::fs::remove_dir_all(&dir).ok();
    }
}
