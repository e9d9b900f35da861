//! Per-project scoring rules.
//!
//! Every project id seen in either the current or the previous snapshot of a
//! KAM is classified into a [`ProjectPair`] and run through [`RULES`] in order.
//! Rules are independent: one pair may trigger several of them, and each hit
//! adds to the month's [`MonthTally`].

use serde::{Deserialize, Serialize};

use super::config::ScoringConfig;
use crate::record::ProjectRecord;

/// A project id matched across two consecutive snapshots of one KAM.
#[derive(Debug, Clone, Copy)]
pub enum ProjectPair<'a> {
    /// Present this month only.
    Added(&'a ProjectRecord),
    /// Present in both months.
    Carried {
        previous: &'a ProjectRecord,
        current: &'a ProjectRecord,
    },
    /// Present last month only.
    Dropped(&'a ProjectRecord),
}

impl<'a> ProjectPair<'a> {
    pub fn classify(
        current: Option<&'a ProjectRecord>,
        previous: Option<&'a ProjectRecord>,
    ) -> Option<Self> {
        match (current, previous) {
            (Some(current), None) => Some(Self::Added(current)),
            (Some(current), Some(previous)) => Some(Self::Carried { previous, current }),
            (None, Some(previous)) => Some(Self::Dropped(previous)),
            (None, None) => None,
        }
    }

    pub fn project_id(&self) -> &'a str {
        match self {
            Self::Added(r) | Self::Dropped(r) => &r.project_id,
            Self::Carried { current, .. } => &current.project_id,
        }
    }
}

/// Raw per-month sums accumulated from rule hits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthTally {
    pub pp_added: i64,
    pub lvp: i64,
    pub new_projects: i64,
    pub sop_delay: i64,
    pub volume_decrease: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    NewProject,
    NewPipeline,
    PipelineConversion,
    PipelineGrowth,
    VolumeDecrease,
    SopDelay,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewProject => "new_project",
            Self::NewPipeline => "new_pipeline",
            Self::PipelineConversion => "pipeline_conversion",
            Self::PipelineGrowth => "pipeline_growth",
            Self::VolumeDecrease => "volume_decrease",
            Self::SopDelay => "sop_delay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleHit {
    pub rule: RuleKind,
    pub quantity: i64,
}

/// A predicate that yields a quantity when it fires, and the tally field it feeds.
pub struct Rule {
    pub kind: RuleKind,
    evaluate: fn(&ProjectPair<'_>, &ScoringConfig) -> Option<i64>,
    apply: fn(&mut MonthTally, i64),
}

impl Rule {
    pub fn evaluate(&self, pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<RuleHit> {
        (self.evaluate)(pair, config).map(|quantity| RuleHit {
            rule: self.kind,
            quantity,
        })
    }

    pub fn apply(&self, tally: &mut MonthTally, quantity: i64) {
        (self.apply)(tally, quantity)
    }
}

pub static RULES: &[Rule] = &[
    Rule {
        kind: RuleKind::NewProject,
        evaluate: new_project,
        apply: |t, q| t.new_projects = t.new_projects.saturating_add(q),
    },
    Rule {
        kind: RuleKind::NewPipeline,
        evaluate: new_pipeline,
        apply: |t, q| t.pp_added = t.pp_added.saturating_add(q),
    },
    Rule {
        kind: RuleKind::PipelineConversion,
        evaluate: pipeline_conversion,
        apply: |t, q| t.lvp = t.lvp.saturating_add(q),
    },
    Rule {
        kind: RuleKind::PipelineGrowth,
        evaluate: pipeline_growth,
        apply: |t, q| t.pp_added = t.pp_added.saturating_add(q),
    },
    Rule {
        kind: RuleKind::VolumeDecrease,
        evaluate: volume_decrease,
        apply: |t, q| t.volume_decrease = t.volume_decrease.saturating_add(q),
    },
    Rule {
        kind: RuleKind::SopDelay,
        evaluate: sop_delay,
        apply: |t, q| t.sop_delay = t.sop_delay.saturating_add(q),
    },
];

/// Run every rule against `pair`, folding hits into `tally` and reporting each to `on_hit`.
pub fn apply_rules(
    pair: &ProjectPair<'_>,
    config: &ScoringConfig,
    tally: &mut MonthTally,
    mut on_hit: impl FnMut(RuleHit),
) {
    for rule in RULES {
        if let Some(hit) = rule.evaluate(pair, config) {
            rule.apply(tally, hit.quantity);
            on_hit(hit);
        }
    }
}

fn new_project(pair: &ProjectPair<'_>, _config: &ScoringConfig) -> Option<i64> {
    matches!(pair, ProjectPair::Added(_)).then_some(1)
}

fn new_pipeline(pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<i64> {
    match pair {
        ProjectPair::Added(current) if current.has_status(&config.pipeline_status) => {
            Some(current.potential)
        }
        _ => None,
    }
}

fn pipeline_conversion(pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<i64> {
    match pair {
        ProjectPair::Carried { previous, current }
            if previous.has_status(&config.pipeline_status)
                && current.has_status(&config.live_status) =>
        {
            Some(previous.potential)
        }
        _ => None,
    }
}

fn pipeline_growth(pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<i64> {
    match pair {
        ProjectPair::Carried { previous, current }
            if previous.has_status(&config.pipeline_status)
                && current.has_status(&config.pipeline_status)
                && current.potential > previous.potential =>
        {
            Some(current.potential.saturating_sub(previous.potential))
        }
        _ => None,
    }
}

fn volume_decrease(pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<i64> {
    match pair {
        ProjectPair::Carried { previous, current } if current.est_ay < previous.est_ay => {
            Some(
                config
                    .volume_decrease_factor
                    .saturating_mul(previous.est_ay.saturating_sub(current.est_ay)),
            )
        }
        _ => None,
    }
}

/// Slippage of a live project's SOP, charged per month at the previous EST_AY.
fn sop_delay(pair: &ProjectPair<'_>, config: &ScoringConfig) -> Option<i64> {
    let ProjectPair::Carried { previous, current } = pair else {
        return None;
    };
    if !previous.has_status(&config.live_status) && !current.has_status(&config.live_status) {
        return None;
    }
    let sop_prev = previous.sop_month()?;
    let sop_cur = current.sop_month()?;
    let months_delay = sop_prev.months_until(sop_cur);
    (months_delay > 0).then(|| months_delay.saturating_mul(previous.est_ay))
}
