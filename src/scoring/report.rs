//! Markdown rendering of a score report.

use super::types::ScoreReport;

pub fn render_report_markdown(report: &ScoreReport) -> String {
    let mut out = String::new();
    out.push_str("# KAM Scores\n\n");
    match (report.months.first(), report.months.last()) {
        (Some(first), Some(last)) => out.push_str(&format!(
            "- Months: {} to {} ({})\n",
            first,
            last,
            report.months.len()
        )),
        _ => out.push_str("- Months: none\n"),
    }
    out.push_str(&format!("- KAMs scored: {}\n", report.per_kam.len()));

    out.push_str("\n## Cumulative\n\n");
    out.push_str("| Rank | KAM | Cumulative |\n|---:|---|---:|\n");
    for (idx, (kam, cumulative)) in report.ranking().into_iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            idx + 1,
            display_kam(kam),
            cumulative
        ));
    }

    for (kam, scores) in &report.per_kam {
        out.push_str(&format!("\n## {}\n\n", display_kam(kam)));
        out.push_str(
            "| Month | PP added | PP prev | PP now | LVP | Shortfall | PP gain | LVP gain \
             | SOP delay | Volume decrease | PP decrease | No new project | Score |\n",
        );
        out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|---:|\n");
        for (month, b) in &scores.monthly {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
                month,
                b.pp_added,
                b.pp_prev,
                b.pp_curr_raw,
                b.lvp,
                b.pp_shortfall,
                b.gains.pp_gain,
                b.gains.lvp_gain,
                b.penalties.sop_delay,
                b.penalties.volume_decrease,
                b.penalties.pp_decrease,
                b.penalties.no_new_project,
                b.month_score
            ));
        }
        out.push_str(&format!("\nCumulative: {}\n", scores.cumulative));
    }

    out
}

fn display_kam(kam: &str) -> &str {
    if kam.is_empty() {
        "(unassigned)"
    } else {
        kam
    }
}
