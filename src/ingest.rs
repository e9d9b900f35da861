//! Tabular upload parsing and whole-month ingestion.
//!
//! Uploads are tab- or comma-separated exports with one row per project.
//! Headers are matched loosely (case, spacing and underscores are ignored,
//! and known aliases map onto the canonical column names), quantities are
//! coerced to non-negative integers, and the resulting records replace
//! whatever was stored for the month before.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::month::{month_from_filename, MonthKey};
use crate::record::ProjectRecord;
use crate::store::{SqliteRecordStore, StoreError, UploadSource};

pub const KAM_COLUMN: &str = "Project Responsible";
pub const STATUS_COLUMN: &str = "Project Status";
pub const POTENTIAL_COLUMN: &str = "Potential (t / year)";
pub const EST_AY_COLUMN: &str = "EST_AY";
pub const SOP_COLUMN: &str = "SOP";
pub const ID_COLUMN: &str = "ID Number";

/// Header of the project id column in older exports.
const LEGACY_ID_HEADER: &str = "e697663b99b2fa26c1258c9d00450011";

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to parse upload: {0}")]
    Parse(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("cannot infer month from file name '{0}' (need YYYY-MM)")]
    MonthNotInferred(String),
    #[error("{months} months given for {files} files")]
    MonthCountMismatch { months: usize, files: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub month: MonthKey,
    pub source_name: String,
    pub rows: usize,
    pub skipped: usize,
    pub content_hash: String,
}

/// Records parsed from one upload, before they are stored.
#[derive(Debug, Clone, Default)]
pub struct ParsedSnapshot {
    pub records: Vec<ProjectRecord>,
    /// Rows dropped for lacking a project id.
    pub skipped: usize,
}

fn header_alias(key: &str) -> Option<&'static str> {
    match key {
        LEGACY_ID_HEADER | "id number" => Some(ID_COLUMN),
        "enddate project" | "sop" => Some(SOP_COLUMN),
        "project responsible" => Some(KAM_COLUMN),
        "project status" => Some(STATUS_COLUMN),
        "potential (t / year)" => Some(POTENTIAL_COLUMN),
        "est ay" => Some(EST_AY_COLUMN),
        _ => None,
    }
}

/// Canonical name for an uploaded header; unknown headers come back whitespace-normalised.
pub fn canonical_header(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    let lowered = collapsed.to_lowercase().replace('_', " ");
    let key = WHITESPACE.replace_all(lowered.trim(), " ");
    match header_alias(&key) {
        Some(canonical) => canonical.to_string(),
        None => collapsed,
    }
}

/// Upper bound for a coerced quantity cell (tons).
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;

/// Parse a quantity cell: numbers round half-to-even and clamp to `0..=MAX_QUANTITY`, junk reads as 0.
pub fn coerce_quantity(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.round_ties_even().clamp(0.0, MAX_QUANTITY as f64) as i64,
        _ => 0,
    }
}

struct Table {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

fn read_table(bytes: &[u8], delimiter: u8) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(Table { headers, rows })
}

/// Tab-separated first; comma-separated when that fails or yields a single column.
fn parse_table(bytes: &[u8]) -> Result<Table, IngestError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match read_table(bytes, b'\t') {
        Ok(table) if table.headers.len() > 1 => Ok(table),
        _ => Ok(read_table(bytes, b',')?),
    }
}

/// Positions of every column that maps onto each canonical name, left to right.
struct ColumnIndex {
    positions: BTreeMap<String, Vec<usize>>,
}

impl ColumnIndex {
    fn new(headers: &[String]) -> Self {
        let mut positions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            positions.entry(canonical_header(header)).or_default().push(idx);
        }
        Self { positions }
    }

    fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    /// First non-blank value among duplicate columns, trimmed; empty when absent.
    fn value<'r>(&self, row: &'r csv::StringRecord, column: &str) -> &'r str {
        self.positions
            .get(column)
            .into_iter()
            .flatten()
            .filter_map(|&idx| row.get(idx))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}

/// Parse an upload into records for `month`.
pub fn parse_snapshot(month: MonthKey, bytes: &[u8]) -> Result<ParsedSnapshot, IngestError> {
    let table = parse_table(bytes)?;
    let columns = ColumnIndex::new(&table.headers);
    if !columns.contains(ID_COLUMN) {
        return Err(IngestError::MissingColumn(ID_COLUMN));
    }

    let mut parsed = ParsedSnapshot::default();
    for (idx, row) in table.rows.iter().enumerate() {
        let project_id = columns.value(row, ID_COLUMN);
        if project_id.is_empty() {
            // Header is line 1.
            warn!(month = %month, line = idx + 2, "skipping row without project id");
            parsed.skipped += 1;
            continue;
        }
        parsed.records.push(ProjectRecord {
            month,
            project_id: project_id.to_string(),
            kam: columns.value(row, KAM_COLUMN).to_string(),
            status: columns.value(row, STATUS_COLUMN).to_string(),
            potential: coerce_quantity(columns.value(row, POTENTIAL_COLUMN)),
            est_ay: coerce_quantity(columns.value(row, EST_AY_COLUMN)),
            sop: columns.value(row, SOP_COLUMN).to_string(),
        });
    }
    Ok(parsed)
}

/// Parse `bytes` and replace `month` in `store` with the result.
pub async fn ingest_bytes(
    store: &SqliteRecordStore,
    month: MonthKey,
    source_name: &str,
    bytes: &[u8],
) -> Result<IngestSummary, IngestError> {
    let parsed = parse_snapshot(month, bytes)?;
    let content_hash = blake3::hash(bytes).to_hex().to_string();
    let source = UploadSource {
        name: source_name.to_string(),
        content_hash: content_hash.clone(),
    };
    let rows = store
        .replace_month(month, parsed.records, Some(source))
        .await?;
    info!(
        month = %month,
        source = source_name,
        rows,
        skipped = parsed.skipped,
        "ingested upload"
    );
    Ok(IngestSummary {
        month,
        source_name: source_name.to_string(),
        rows,
        skipped: parsed.skipped,
        content_hash,
    })
}

pub async fn ingest_file(
    store: &SqliteRecordStore,
    month: MonthKey,
    path: impl AsRef<Path>,
) -> Result<IngestSummary, IngestError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    ingest_bytes(store, month, &source_name(path), &bytes).await
}

/// Pair each file with its month: explicit months by position, else from the file name.
pub fn plan_bulk(
    files: &[PathBuf],
    months: &[MonthKey],
) -> Result<Vec<(MonthKey, PathBuf)>, IngestError> {
    if !months.is_empty() && months.len() != files.len() {
        return Err(IngestError::MonthCountMismatch {
            months: months.len(),
            files: files.len(),
        });
    }
    files
        .iter()
        .enumerate()
        .map(|(idx, file)| {
            let month = match months.get(idx) {
                Some(month) => *month,
                None => {
                    let name = source_name(file);
                    month_from_filename(&name).ok_or(IngestError::MonthNotInferred(name))?
                }
            };
            Ok((month, file.clone()))
        })
        .collect()
}

/// Ingest several uploads in order. Stops at the first failure; earlier months stay stored.
pub async fn ingest_bulk(
    store: &SqliteRecordStore,
    files: &[PathBuf],
    months: &[MonthKey],
) -> Result<Vec<IngestSummary>, IngestError> {
    let plan = plan_bulk(files, months)?;
    let mut summaries = Vec::with_capacity(plan.len());
    for (month, path) in plan {
        summaries.push(ingest_file(store, month, &path).await?);
    }
    Ok(summaries)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_loosely() {
        assert_eq!(canonical_header("  id   NUMBER "), ID_COLUMN);
        assert_eq!(canonical_header(LEGACY_ID_HEADER), ID_COLUMN);
        assert_eq!(canonical_header("Enddate Project"), SOP_COLUMN);
        assert_eq!(canonical_header("project_responsible"), KAM_COLUMN);
        assert_eq!(canonical_header("est_ay"), EST_AY_COLUMN);
        assert_eq!(canonical_header("Potential (t / year)"), POTENTIAL_COLUMN);
        assert_eq!(canonical_header("  Prod.   Fam. "), "Prod. Fam.");
    }

    #[test]
    fn quantities_coerce_to_non_negative_integers() {
        assert_eq!(coerce_quantity("42"), 42);
        assert_eq!(coerce_quantity(" 12.4 "), 12);
        assert_eq!(coerce_quantity("2.5"), 2);
        assert_eq!(coerce_quantity("3.5"), 4);
        assert_eq!(coerce_quantity("-7"), 0);
        assert_eq!(coerce_quantity(""), 0);
        assert_eq!(coerce_quantity("n/a"), 0);
        assert_eq!(coerce_quantity("NaN"), 0);
        assert_eq!(coerce_quantity("1e30"), MAX_QUANTITY);
        assert_eq!(coerce_quantity("inf"), 0);
    }

    #[test]
    fn tab_upload_parses_with_aliases() {
        let month: MonthKey = "2024-02".parse().unwrap();
        let upload = "ID Number\tProject Responsible\tProject Status\tPotential (t / year)\tEST_AY\tEnddate Project\n\
                      P-1\t Alice \tN\t35.0\t12\t01.03.2024\n\
                      P-2\tBob\t+\tx\t\t\n";
        let parsed = parse_snapshot(month, upload.as_bytes()).unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.records.len(), 2);
        let first = &parsed.records[0];
        assert_eq!(first.project_id, "P-1");
        assert_eq!(first.kam, "Alice");
        assert_eq!(first.status, "N");
        assert_eq!(first.potential, 35);
        assert_eq!(first.est_ay, 12);
        assert_eq!(first.sop, "01.03.2024");
        assert_eq!(first.month, month);
        let second = &parsed.records[1];
        assert_eq!(second.potential, 0);
        assert_eq!(second.est_ay, 0);
        assert_eq!(second.sop, "");
    }

    #[test]
    fn comma_upload_is_the_fallback() {
        let month: MonthKey = "2024-02".parse().unwrap();
        let upload = "id_number,project responsible,EST_AY\nP-9,Carol,4\n";
        let parsed = parse_snapshot(month, upload.as_bytes()).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].kam, "Carol");
        assert_eq!(parsed.records[0].est_ay, 4);
        assert_eq!(parsed.records[0].status, "");
    }

    #[test]
    fn duplicate_columns_take_first_non_blank() {
        let month: MonthKey = "2024-02".parse().unwrap();
        let upload = "ID Number,SOP,Enddate Project\nP-1,,2024-06\nP-2,2024-01,2024-09\n";
        let parsed = parse_snapshot(month, upload.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].sop, "2024-06");
        assert_eq!(parsed.records[1].sop, "2024-01");
    }

    #[test]
    fn rows_without_id_are_skipped_and_missing_id_column_fails() {
        let month: MonthKey = "2024-02".parse().unwrap();
        let upload = "ID Number,Project Status\n,N\nP-1,N\n";
        let parsed = parse_snapshot(month, upload.as_bytes()).unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records.len(), 1);

        let upload = "Project,Project Status\nP-1,N\n";
        assert!(matches!(
            parse_snapshot(month, upload.as_bytes()),
            Err(IngestError::MissingColumn(ID_COLUMN))
        ));
    }

    #[test]
    fn bulk_plan_infers_or_checks_months() {
        let files = vec![
            PathBuf::from("/uploads/kam_2024-01.tsv"),
            PathBuf::from("/uploads/kam_2024-02.tsv"),
        ];
        let plan = plan_bulk(&files, &[]).unwrap();
        assert_eq!(plan[0].0.to_string(), "2024-01");
        assert_eq!(plan[1].0.to_string(), "2024-02");

        let explicit: Vec<MonthKey> = vec!["2023-12".parse().unwrap()];
        assert!(matches!(
            plan_bulk(&files, &explicit),
            Err(IngestError::MonthCountMismatch { months: 1, files: 2 })
        ));

        let unnamed = vec![PathBuf::from("export.tsv")];
        assert!(matches!(
            plan_bulk(&unnamed, &[]),
            Err(IngestError::MonthNotInferred(_))
        ));
    }
}
