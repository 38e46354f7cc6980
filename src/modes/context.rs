// =============================================================================
// Per-mode state — ModeContext / ModeRegistry
// =============================================================================
//
// A ModeRegistry holds one ModeContext per configured mode. Modes never touch
// each other's balance or orders; the decision engine (C10) and order
// lifecycle (C11) operate on exactly one ModeContext per tick per mode, with
// the MarketSnapshot as the only shared input.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bridge::RecommendedAdjustments;
use crate::config::ModeConfig;
use crate::orders::SimulatedOrder;
use crate::types::Direction;

/// The trading style a mode runs under. Drives which branch of the C10
/// pipeline (mode filters, regime gating, signal formation) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStyle {
    Baseline,
    Trend,
    Scalper,
    Reversion,
    Breakout,
    Volume,
    Volatility,
    Whale,
    LpWhaleBurst,
    AiWhaleHunter,
    AiDragon2,
    AiShrimp,
    AiLion,
    DirectionProbeLong,
    DirectionProbeShort,
}

impl StrategyStyle {
    /// AI-driven styles read a bridge file and skip the generic sniper
    /// filters entirely (C10 step 3).
    pub fn is_ai_driven(self) -> bool {
        matches!(
            self,
            StrategyStyle::AiWhaleHunter
                | StrategyStyle::AiDragon2
                | StrategyStyle::AiShrimp
                | StrategyStyle::AiLion
        )
    }

    /// Direction probes issue an unconditional LONG or SHORT once their
    /// cooldown elapses, bypassing signal formation entirely.
    pub fn is_direction_probe(self) -> bool {
        matches!(
            self,
            StrategyStyle::DirectionProbeLong | StrategyStyle::DirectionProbeShort
        )
    }

    /// Fixed direction for probe styles; `None` for everything else.
    pub fn probe_direction(self) -> Option<Direction> {
        match self {
            StrategyStyle::DirectionProbeLong => Some(Direction::Long),
            StrategyStyle::DirectionProbeShort => Some(Direction::Short),
            _ => None,
        }
    }
}

/// A candidate entry awaiting the AI entry-delay confirmation window
/// (C10 step 10): first tick records it and holds, subsequent ticks wait
/// out `entry_delay_secs` unless direction changes or price moves too far.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub direction: Direction,
    pub recorded_at: Instant,
    pub recorded_mid_price: f64,
}

/// Isolated per-mode state. No field here is ever read or written by any
/// mode other than the one it belongs to.
pub struct ModeContext {
    pub name: String,
    pub style: StrategyStyle,
    pub config: ModeConfig,

    pub balance: f64,
    pub orders: Vec<SimulatedOrder>,

    pub consecutive_losses: u32,
    pub loss_cooldown_until: Option<Instant>,

    pub last_entry_time: Option<Instant>,
    pub pending_entry_signal: Option<PendingEntry>,

    /// Set while C11's VPIN-risk mode is active for this mode's open order;
    /// cleared after 120 s of VPIN back below the spike threshold.
    pub high_vpin_cooldown_until: Option<Instant>,

    /// Direction flip timestamps for the reversal-tier escalation feeding
    /// back into this mode's whale-driven entry cooldown (C5).
    pub recent_flips: Vec<Instant>,

    /// ROI of the most recently closed order, consumed by the next
    /// loss-review request written to this mode's AI bridge.
    pub last_close_roi_pct: Option<f64>,
    /// Set when a loss-review request has been emitted and not yet answered
    /// by a bridge command carrying `recommended_adjustments`.
    pub awaiting_loss_review: bool,

    /// Additive delta the AI bridge has recommended against this mode's
    /// baseline confidence gates.
    pub ai_confidence_delta: f64,
    /// Stop-loss percentage the AI bridge has recommended overriding onto
    /// every new entry, taking precedence over the computed default.
    pub ai_stop_loss_override_pct: Option<f64>,
    /// Multiplier the AI bridge has recommended applying to this mode's
    /// leverage.
    pub ai_leverage_multiplier: f64,
}

impl ModeContext {
    pub fn new(name: impl Into<String>, config: ModeConfig, initial_balance: f64) -> Self {
        Self {
            name: name.into(),
            style: config.style,
            config,
            balance: initial_balance,
            orders: Vec::new(),
            consecutive_losses: 0,
            loss_cooldown_until: None,
            last_entry_time: None,
            pending_entry_signal: None,
            high_vpin_cooldown_until: None,
            recent_flips: Vec::new(),
            last_close_roi_pct: None,
            awaiting_loss_review: false,
            ai_confidence_delta: 0.0,
            ai_stop_loss_override_pct: None,
            ai_leverage_multiplier: 1.0,
        }
    }

    pub fn in_loss_cooldown(&self, now: Instant) -> bool {
        self.loss_cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn in_entry_cooldown(&self, now: Instant) -> bool {
        self.last_entry_time
            .map(|t| now.duration_since(t).as_secs() < self.config.entry_cooldown_secs)
            .unwrap_or(false)
    }

    pub fn has_open_position(&self) -> bool {
        self.orders.iter().any(|o| !o.is_closed())
    }

    pub fn open_position_count(&self) -> usize {
        self.orders.iter().filter(|o| !o.is_closed()).count()
    }

    /// Registers a win/loss outcome against the consecutive-loss counter and
    /// returns the cooldown (if any) that should now apply, per C11's
    /// post-close hooks: 2+ losses or a single loss deeper than 2% ROI gets
    /// a 30s cooldown; 5 consecutive losses escalate to 30 minutes.
    pub fn record_close(&mut self, roi_pct: f64, now: Instant) {
        self.last_close_roi_pct = Some(roi_pct);
        if roi_pct < 0.0 {
            self.consecutive_losses += 1;
            let severe = self.consecutive_losses >= 2 || roi_pct <= -2.0;
            self.awaiting_loss_review = severe;
            if self.consecutive_losses >= 5 {
                self.loss_cooldown_until = Some(now + std::time::Duration::from_secs(30 * 60));
            } else if severe {
                self.loss_cooldown_until = Some(now + std::time::Duration::from_secs(30));
            }
        } else {
            self.consecutive_losses = 0;
            self.loss_cooldown_until = None;
            self.awaiting_loss_review = false;
        }
    }

    /// Apply AI-recommended adjustments received in answer to a loss-review
    /// request, then clear the pending flag so they are not reapplied.
    pub fn apply_ai_adjustments(&mut self, adjustments: &RecommendedAdjustments, now: Instant) {
        if let Some(delta) = adjustments.confidence_threshold_delta {
            self.ai_confidence_delta += delta;
        }
        if let Some(stop_loss_pct) = adjustments.stop_loss_pct {
            self.ai_stop_loss_override_pct = Some(stop_loss_pct);
        }
        if let Some(multiplier) = adjustments.leverage_multiplier {
            self.ai_leverage_multiplier = multiplier;
        }
        if let Some(minutes) = adjustments.cooldown_minutes {
            self.loss_cooldown_until = Some(now + std::time::Duration::from_secs_f64((minutes * 60.0).max(0.0)));
        }
        self.awaiting_loss_review = false;
    }
}

/// Owns every configured mode's isolated context.
pub struct ModeRegistry {
    modes: HashMap<String, ModeContext>,
}

impl ModeRegistry {
    pub fn from_configs(configs: &HashMap<String, ModeConfig>, initial_balance: f64) -> Self {
        let modes = configs
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, cfg)| (name.clone(), ModeContext::new(name.clone(), cfg.clone(), initial_balance)))
            .collect();
        Self { modes }
    }

    pub fn get(&self, name: &str) -> Option<&ModeContext> {
        self.modes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModeContext> {
        self.modes.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModeContext> {
        self.modes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ModeContext> {
        self.modes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_mode;

    #[test]
    fn loss_cooldown_escalates_at_five() {
        let mut ctx = ModeContext::new("baseline", default_mode(StrategyStyle::Baseline), 100.0);
        let now = Instant::now();
        for _ in 0..4 {
            ctx.record_close(-1.0, now);
        }
        assert_eq!(ctx.consecutive_losses, 4);
        ctx.record_close(-1.0, now);
        assert_eq!(ctx.consecutive_losses, 5);
        let until = ctx.loss_cooldown_until.expect("cooldown should be set");
        assert!(until.duration_since(now).as_secs() >= 30 * 60 - 1);
    }

    #[test]
    fn win_resets_loss_counter() {
        let mut ctx = ModeContext::new("baseline", default_mode(StrategyStyle::Baseline), 100.0);
        let now = Instant::now();
        ctx.record_close(-1.0, now);
        ctx.record_close(2.5, now);
        assert_eq!(ctx.consecutive_losses, 0);
        assert!(ctx.loss_cooldown_until.is_none());
    }

    #[test]
    fn direction_probe_styles_report_fixed_direction() {
        assert_eq!(
            StrategyStyle::DirectionProbeLong.probe_direction(),
            Some(Direction::Long)
        );
        assert_eq!(
            StrategyStyle::DirectionProbeShort.probe_direction(),
            Some(Direction::Short)
        );
        assert_eq!(StrategyStyle::Baseline.probe_direction(), None);
    }
}
