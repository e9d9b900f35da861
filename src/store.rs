//! Month-keyed record storage.
//!
//! Records are written a whole month at a time: re-ingesting a month replaces
//! every row previously stored for it. Reads are per month and never mutate.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::info;

use crate::month::MonthKey;
use crate::record::ProjectRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// Read side of the record store, as the scoring engine sees it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record stored for `month`, in storage order.
    async fn records_for_month(&self, month: MonthKey) -> Result<Vec<ProjectRecord>, StoreError>;
}

/// Where a month's rows came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    pub name: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthSummary {
    pub month: MonthKey,
    pub rows: usize,
    pub kams: usize,
    pub source_name: Option<String>,
    pub content_hash: Option<String>,
    pub ingested_at: Option<i64>,
}

// =============================================================================
// SQLite
// =============================================================================

#[derive(Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;\
             CREATE TABLE IF NOT EXISTS project_monthly (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               month TEXT NOT NULL,\
               project_id TEXT NOT NULL,\
               kam TEXT NOT NULL,\
               status TEXT NOT NULL,\
               potential INTEGER NOT NULL,\
               est_ay INTEGER NOT NULL,\
               sop TEXT NOT NULL \
             );\
             CREATE TABLE IF NOT EXISTS month_uploads (\
               month TEXT PRIMARY KEY,\
               source_name TEXT,\
               content_hash TEXT,\
               row_count INTEGER NOT NULL,\
               ingested_at INTEGER NOT NULL \
             );\
             CREATE INDEX IF NOT EXISTS idx_project_monthly_month ON project_monthly(month);\
             CREATE INDEX IF NOT EXISTS idx_project_monthly_project ON project_monthly(project_id);\
             CREATE INDEX IF NOT EXISTS idx_project_monthly_kam ON project_monthly(kam);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("KAM_SCORES_STORE") {
            return PathBuf::from(path);
        }
        PathBuf::from(".kam_scores.sqlite")
    }

    pub fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        StoreLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    /// Replace everything stored for `month` with `records`, in one transaction.
    ///
    /// Each record is stored under `month` regardless of its own `month` field.
    pub async fn replace_month(
        &self,
        month: MonthKey,
        records: Vec<ProjectRecord>,
        source: Option<UploadSource>,
    ) -> Result<usize, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let month_text = month.to_string();
                let tx = conn.unchecked_transaction()?;
                let removed = tx.execute(
                    "DELETE FROM project_monthly WHERE month = ?1",
                    params![month_text],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO project_monthly (month, project_id, kam, status, potential, est_ay, sop) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for record in &records {
                        stmt.execute(params![
                            month_text,
                            record.project_id,
                            record.kam,
                            record.status,
                            record.potential,
                            record.est_ay,
                            record.sop,
                        ])?;
                    }
                }
                let (source_name, content_hash) = match &source {
                    Some(src) => (Some(src.name.as_str()), Some(src.content_hash.as_str())),
                    None => (None, None),
                };
                tx.execute(
                    "INSERT INTO month_uploads (month, source_name, content_hash, row_count, ingested_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(month) DO UPDATE SET \
                        source_name = excluded.source_name,\
                        content_hash = excluded.content_hash,\
                        row_count = excluded.row_count,\
                        ingested_at = excluded.ingested_at",
                    params![
                        month_text,
                        source_name,
                        content_hash,
                        records.len() as i64,
                        now_epoch()
                    ],
                )?;
                tx.commit()?;
                info!(month = %month, removed, written = records.len(), "replaced month snapshot");
                Ok(records.len())
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Ingested months in chronological order, including months replaced with no rows.
    pub async fn list_months(&self) -> Result<Vec<MonthSummary>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.month, COUNT(p.id), COUNT(DISTINCT p.kam),\
                            u.source_name, u.content_hash, u.ingested_at \
                     FROM month_uploads u \
                     LEFT JOIN project_monthly p ON p.month = u.month \
                     GROUP BY u.month \
                     ORDER BY u.month",
                )?;
                let mut rows = stmt.query([])?;
                let mut months = Vec::new();
                while let Some(row) = rows.next()? {
                    months.push(MonthSummary {
                        month: parse_stored_month(&row.get::<_, String>(0)?)?,
                        rows: row.get::<_, i64>(1)?.max(0) as usize,
                        kams: row.get::<_, i64>(2)?.max(0) as usize,
                        source_name: row.get(3)?,
                        content_hash: row.get(4)?,
                        ingested_at: row.get(5)?,
                    });
                }
                Ok(months)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Write every stored record as one JSON object per line. Returns the line count.
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref().to_path_buf();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT month, project_id, kam, status, potential, est_ay, sop \
                     FROM project_monthly ORDER BY month, id",
                )?;
                let mut rows = stmt.query([])?;
                let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
                let mut written = 0usize;
                while let Some(row) = rows.next()? {
                    let record = row_to_record(row)?;
                    let line = serde_json::to_string(&record)
                        .map_err(|e| StoreError::Serde(e.to_string()))?;
                    writeln!(file, "{line}")?;
                    written += 1;
                }
                file.flush()?;
                Ok(written)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn records_for_month(&self, month: MonthKey) -> Result<Vec<ProjectRecord>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT month, project_id, kam, status, potential, est_ay, sop \
                     FROM project_monthly WHERE month = ?1 ORDER BY id",
                )?;
                let mut rows = stmt.query(params![month.to_string()])?;
                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    records.push(row_to_record(row)?);
                }
                Ok(records)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn row_to_record(row: &Row<'_>) -> Result<ProjectRecord, StoreError> {
    Ok(ProjectRecord {
        month: parse_stored_month(&row.get::<_, String>(0)?)?,
        project_id: row.get(1)?,
        kam: row.get(2)?,
        status: row.get(3)?,
        potential: row.get(4)?,
        est_ay: row.get(5)?,
        sop: row.get(6)?,
    })
}

fn parse_stored_month(raw: &str) -> Result<MonthKey, StoreError> {
    raw.parse()
        .map_err(|e: crate::month::MonthParseError| StoreError::InvalidRow(e.to_string()))
}

/// Advisory lock held beside the database file for the duration of a write batch.
#[derive(Debug)]
pub struct StoreLock {
    _file: std::fs::File,
}

impl StoreLock {
    fn new(db_path: &Path) -> Result<Self, StoreError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store with the same replace-by-month semantics as SQLite.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    months: Arc<RwLock<BTreeMap<MonthKey, Vec<ProjectRecord>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group loose records by their own `month` field.
    pub fn from_records(records: impl IntoIterator<Item = ProjectRecord>) -> Self {
        let mut months: BTreeMap<MonthKey, Vec<ProjectRecord>> = BTreeMap::new();
        for record in records {
            months.entry(record.month).or_default().push(record);
        }
        Self {
            months: Arc::new(RwLock::new(months)),
        }
    }

    pub fn replace_month(
        &self,
        month: MonthKey,
        records: Vec<ProjectRecord>,
    ) -> Result<usize, StoreError> {
        let records: Vec<ProjectRecord> = records
            .into_iter()
            .map(|mut r| {
                r.month = month;
                r
            })
            .collect();
        let written = records.len();
        let mut guard = self.months.write().map_err(|_| StoreError::Poisoned)?;
        guard.insert(month, records);
        Ok(written)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn records_for_month(&self, month: MonthKey) -> Result<Vec<ProjectRecord>, StoreError> {
        let guard = self.months.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.get(&month).cloned().unwrap_or_default())
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
