//! Business parameters for monthly scoring, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Monthly pipeline-potential target (tons).
pub const TARGET_PP: i64 = 30;
/// Monthly live-volume target (tons).
pub const TARGET_LVP: i64 = 20;
/// A target counts as beaten by a stretch once it reaches `target * STRETCH_MULTIPLIER`.
pub const STRETCH_MULTIPLIER: f64 = 1.3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read scoring config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scoring config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid scoring config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub target_pp: i64,
    pub target_lvp: i64,
    pub stretch_multiplier: f64,

    /// Awarded when PP added reaches `target_pp`.
    pub pp_gain: i64,
    /// Awarded instead of `pp_gain` at the stretch threshold.
    pub pp_stretch_gain: i64,
    /// Awarded when LVP reaches `target_lvp`.
    pub lvp_gain: i64,
    /// Awarded instead of `lvp_gain` at the stretch threshold.
    pub lvp_stretch_gain: i64,

    /// Points lost per ton of EST_AY decrease on a carried project.
    pub volume_decrease_factor: i64,
    /// Points lost per ton of pipeline shortfall.
    pub pp_shortfall_factor: i64,
    /// Flat penalty for a month with no new projects.
    pub no_new_project_penalty: i64,

    /// Status code of pipeline projects.
    pub pipeline_status: String,
    /// Status code of projects converted to live volume.
    pub live_status: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            target_pp: TARGET_PP,
            target_lvp: TARGET_LVP,
            stretch_multiplier: STRETCH_MULTIPLIER,
            pp_gain: 100,
            pp_stretch_gain: 200,
            lvp_gain: 200,
            lvp_stretch_gain: 400,
            volume_decrease_factor: 2,
            pp_shortfall_factor: 2,
            no_new_project_penalty: 100,
            pipeline_status: "N".to_string(),
            live_status: "+".to_string(),
        }
    }
}

impl ScoringConfig {
    pub fn pp_stretch_threshold(&self) -> i64 {
        stretch_threshold(self.target_pp, self.stretch_multiplier)
    }

    pub fn lvp_stretch_threshold(&self) -> i64 {
        stretch_threshold(self.target_lvp, self.stretch_multiplier)
    }

    pub fn pp_gain_for(&self, pp_added: i64) -> i64 {
        tiered_gain(
            pp_added,
            self.target_pp,
            self.pp_stretch_threshold(),
            self.pp_gain,
            self.pp_stretch_gain,
        )
    }

    pub fn lvp_gain_for(&self, lvp: i64) -> i64 {
        tiered_gain(
            lvp,
            self.target_lvp,
            self.lvp_stretch_threshold(),
            self.lvp_gain,
            self.lvp_stretch_gain,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let amounts = [
            ("target_pp", self.target_pp),
            ("target_lvp", self.target_lvp),
            ("pp_gain", self.pp_gain),
            ("pp_stretch_gain", self.pp_stretch_gain),
            ("lvp_gain", self.lvp_gain),
            ("lvp_stretch_gain", self.lvp_stretch_gain),
            ("volume_decrease_factor", self.volume_decrease_factor),
            ("pp_shortfall_factor", self.pp_shortfall_factor),
            ("no_new_project_penalty", self.no_new_project_penalty),
        ];
        for (name, value) in amounts {
            if value < 0 {
                return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
            }
        }
        if !self.stretch_multiplier.is_finite() || self.stretch_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "stretch_multiplier must be a finite value >= 1".to_string(),
            ));
        }
        if self.pipeline_status.trim().is_empty() || self.live_status.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "status codes must be non-empty".to_string(),
            ));
        }
        if self.pipeline_status == self.live_status {
            return Err(ConfigError::Invalid(
                "pipeline_status and live_status must differ".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<ScoringConfig, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let config: ScoringConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

fn stretch_threshold(target: i64, multiplier: f64) -> i64 {
    (target as f64 * multiplier).floor() as i64
}

fn tiered_gain(value: i64, target: i64, stretch: i64, base: i64, stretched: i64) -> i64 {
    if value >= stretch {
        stretched
    } else if value >= target {
        base
    } else {
        0
    }
}
