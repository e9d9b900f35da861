//! Scoring engine.
//!
//! Compares each month's project set for a KAM against the month before and
//! turns additions, conversions, quantity changes and SOP slippage into a
//! signed monthly score plus a running cumulative total.

pub mod config;
pub mod engine;
pub mod report;
pub mod rules;
pub mod trace;
pub mod types;

pub use config::{load_config_from_path, ConfigError, ScoringConfig};
pub use engine::{compute_scores_range, finish_month, score_kam_month, score_snapshots};
pub use report::render_report_markdown;
pub use rules::{apply_rules, MonthTally, ProjectPair, Rule, RuleHit, RuleKind, RULES};
pub use trace::{
    JsonlTraceSink, MemoryTraceSink, ScoreEvent, ScoreTraceSink, TraceError, TraceWorker,
};
pub use types::{Gains, KamScores, Penalties, ScoreBreakdown, ScoreReport};
