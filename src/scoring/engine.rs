//! Month-over-month scoring of KAM project snapshots.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::config::ScoringConfig;
use super::rules::{apply_rules, MonthTally, ProjectPair};
use super::trace::{ScoreEvent, ScoreTraceSink};
use super::types::{Gains, KamScores, Penalties, ScoreBreakdown, ScoreReport};
use crate::month::{months_inclusive, MonthKey};
use crate::record::ProjectRecord;
use crate::snapshot::{MonthSnapshot, SnapshotCache};
use crate::store::{RecordStore, StoreError};

/// Score every month in `from..=to` for every KAM present in it.
///
/// Each month is read from `store` once. The first month of the range is
/// compared against an empty previous snapshot.
pub async fn compute_scores_range<S>(
    store: &S,
    from: MonthKey,
    to: MonthKey,
    config: &ScoringConfig,
    trace: Option<&dyn ScoreTraceSink>,
) -> Result<ScoreReport, StoreError>
where
    S: RecordStore + ?Sized,
{
    let months = months_inclusive(from, to);
    let cache = SnapshotCache::load(store, &months).await?;
    Ok(score_snapshots(&months, &cache, config, trace))
}

/// Score consecutive `months` from already-fetched snapshots.
pub fn score_snapshots(
    months: &[MonthKey],
    cache: &SnapshotCache,
    config: &ScoringConfig,
    trace: Option<&dyn ScoreTraceSink>,
) -> ScoreReport {
    let empty = MonthSnapshot::default();
    let mut per_kam: BTreeMap<String, KamScores> = BTreeMap::new();

    for (idx, &month) in months.iter().enumerate() {
        let current = cache.get(month);
        let previous = match idx.checked_sub(1) {
            Some(prev_idx) => cache.get(months[prev_idx]),
            None => &empty,
        };

        for (kam, rows) in current.iter() {
            let breakdown = score_kam_month(month, kam, rows, previous.bucket(kam), config, trace);
            debug!(
                month = %month,
                kam,
                month_score = breakdown.month_score,
                "scored kam month"
            );
            let scores = per_kam.entry(kam.to_string()).or_default();
            scores.monthly.insert(month, breakdown);
            scores.cumulative = scores.cumulative.saturating_add(breakdown.month_score);
        }
    }

    ScoreReport {
        months: months.to_vec(),
        per_kam,
    }
}

/// Diff one KAM's records for `month` against the previous month and score the result.
pub fn score_kam_month(
    month: MonthKey,
    kam: &str,
    current: &[ProjectRecord],
    previous: &[ProjectRecord],
    config: &ScoringConfig,
    trace: Option<&dyn ScoreTraceSink>,
) -> ScoreBreakdown {
    let current = index_by_project(current);
    let previous = index_by_project(previous);

    let ids: BTreeSet<&str> = current.keys().chain(previous.keys()).copied().collect();
    let mut tally = MonthTally::default();
    for id in ids {
        let Some(pair) =
            ProjectPair::classify(current.get(id).copied(), previous.get(id).copied())
        else {
            continue;
        };
        apply_rules(&pair, config, &mut tally, |hit| {
            let Some(sink) = trace else {
                return;
            };
            let event = ScoreEvent {
                month,
                kam: kam.to_string(),
                project_id: id.to_string(),
                rule: hit.rule,
                quantity: hit.quantity,
            };
            if let Err(err) = sink.record(event) {
                warn!(
                    month = %month,
                    kam,
                    project_id = id,
                    rule = hit.rule.as_str(),
                    error = %err,
                    "dropping score trace event"
                );
            }
        });
    }

    let pp_prev = pipeline_potential(previous.values().copied(), config);
    let pp_curr_raw = pipeline_potential(current.values().copied(), config);
    finish_month(tally, pp_prev, pp_curr_raw, config)
}

/// Turn raw tallies into gains, penalties and the month score.
pub fn finish_month(
    tally: MonthTally,
    pp_prev: i64,
    pp_curr_raw: i64,
    config: &ScoringConfig,
) -> ScoreBreakdown {
    let pp_expected_after = pp_prev
        .saturating_add(tally.pp_added)
        .saturating_sub(tally.lvp);
    let pp_shortfall = pp_expected_after.saturating_sub(pp_curr_raw).max(0);

    let gains = Gains {
        pp_gain: config.pp_gain_for(tally.pp_added),
        lvp_gain: config.lvp_gain_for(tally.lvp),
    };
    let penalties = Penalties {
        sop_delay: tally.sop_delay,
        volume_decrease: tally.volume_decrease,
        pp_decrease: config.pp_shortfall_factor.saturating_mul(pp_shortfall),
        no_new_project: if tally.new_projects >= 1 {
            0
        } else {
            config.no_new_project_penalty
        },
    };

    ScoreBreakdown {
        pp_added: tally.pp_added,
        pp_prev,
        pp_curr_raw,
        lvp: tally.lvp,
        pp_expected_after,
        pp_shortfall,
        gains,
        penalties,
        month_score: gains
            .pp_gain
            .saturating_add(gains.lvp_gain)
            .saturating_sub(penalties.total()),
    }
}

/// Key a KAM bucket by project id; a repeated id keeps its last row.
fn index_by_project(rows: &[ProjectRecord]) -> BTreeMap<&str, &ProjectRecord> {
    rows.iter().map(|r| (r.project_id.as_str(), r)).collect()
}

fn pipeline_potential<'a>(
    rows: impl Iterator<Item = &'a ProjectRecord>,
    config: &ScoringConfig,
) -> i64 {
    rows.filter(|r| r.has_status(&config.pipeline_status))
        .fold(0i64, |acc, r| acc.saturating_add(r.potential))
}
