#![forbid(unsafe_code)]

//! # kam-scores
//!
//! Monthly performance scores for key account managers (KAMs).
//!
//! Each month a CRM export lists every project with its owner, status,
//! potential and expected annual volume. Comparing a KAM's projects against
//! the previous month's snapshot yields what happened in between: new
//! pipeline, conversions to live business, volume cuts and SOP slips. Those
//! events become a signed month score and a running cumulative total per KAM.
//!
//! Uploads are parsed by [`ingest`], stored per month in SQLite by
//! [`store`], grouped by [`snapshot`] and scored by [`scoring`].

pub mod ingest;
pub mod month;
pub mod record;
pub mod scoring;
pub mod snapshot;
pub mod store;

pub use ingest::{ingest_bulk, ingest_bytes, ingest_file, parse_snapshot, IngestError, IngestSummary};
pub use month::{months_inclusive, parse_sop_month, MonthKey, MonthParseError};
pub use record::ProjectRecord;
pub use scoring::{
    compute_scores_range, load_config_from_path, render_report_markdown, ConfigError,
    JsonlTraceSink, KamScores, ScoreBreakdown, ScoreReport, ScoreTraceSink, ScoringConfig,
    TraceError,
};
pub use snapshot::{MonthSnapshot, SnapshotCache};
pub use store::{InMemoryRecordStore, RecordStore, SqliteRecordStore, StoreError};
