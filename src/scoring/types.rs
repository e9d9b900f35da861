//! Score report types. Wire names keep the upper-case report labels (`PP_added`, `LVP`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::month::MonthKey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gains {
    #[serde(rename = "PP_gain")]
    pub pp_gain: i64,
    #[serde(rename = "LVP_gain")]
    pub lvp_gain: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalties {
    #[serde(rename = "SOP_delay")]
    pub sop_delay: i64,
    #[serde(rename = "Volume_decrease")]
    pub volume_decrease: i64,
    #[serde(rename = "PP_decrease")]
    pub pp_decrease: i64,
    #[serde(rename = "No_new_project")]
    pub no_new_project: i64,
}

impl Penalties {
    pub fn total(&self) -> i64 {
        self.sop_delay
            .saturating_add(self.volume_decrease)
            .saturating_add(self.pp_decrease)
            .saturating_add(self.no_new_project)
    }
}

/// One KAM's score for one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(rename = "PP_added")]
    pub pp_added: i64,
    #[serde(rename = "PP_prev")]
    pub pp_prev: i64,
    #[serde(rename = "PP_curr_raw")]
    pub pp_curr_raw: i64,
    #[serde(rename = "LVP")]
    pub lvp: i64,
    #[serde(rename = "PP_expected_after")]
    pub pp_expected_after: i64,
    #[serde(rename = "PP_shortfall")]
    pub pp_shortfall: i64,
    pub gains: Gains,
    pub penalties: Penalties,
    pub month_score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KamScores {
    pub monthly: BTreeMap<MonthKey, ScoreBreakdown>,
    pub cumulative: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub months: Vec<MonthKey>,
    pub per_kam: BTreeMap<String, KamScores>,
}

impl ScoreReport {
    pub fn kam(&self, kam: &str) -> Option<&KamScores> {
        self.per_kam.get(kam)
    }

    pub fn breakdown(&self, kam: &str, month: MonthKey) -> Option<&ScoreBreakdown> {
        self.per_kam.get(kam).and_then(|k| k.monthly.get(&month))
    }

    /// KAMs by cumulative score, highest first; ties by name.
    pub fn ranking(&self) -> Vec<(&str, i64)> {
        let mut ranked: Vec<(&str, i64)> = self
            .per_kam
            .iter()
            .map(|(kam, scores)| (kam.as_str(), scores.cumulative))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}
