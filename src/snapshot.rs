//! Month snapshots grouped by account manager.

use std::collections::BTreeMap;

use crate::month::MonthKey;
use crate::record::ProjectRecord;
use crate::store::{RecordStore, StoreError};

/// One month's records, bucketed by KAM. Buckets keep storage order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthSnapshot {
    buckets: BTreeMap<String, Vec<ProjectRecord>>,
}

impl MonthSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = ProjectRecord>) -> Self {
        let mut buckets: BTreeMap<String, Vec<ProjectRecord>> = BTreeMap::new();
        for record in records {
            buckets.entry(record.kam.clone()).or_default().push(record);
        }
        Self { buckets }
    }

    /// Records for `kam`, empty when the KAM has none this month.
    pub fn bucket(&self, kam: &str) -> &[ProjectRecord] {
        self.buckets.get(kam).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ProjectRecord])> {
        self.buckets
            .iter()
            .map(|(kam, rows)| (kam.as_str(), rows.as_slice()))
    }

    pub fn kams(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Read every record for `month` and group it by KAM.
pub async fn fetch_month<S>(store: &S, month: MonthKey) -> Result<MonthSnapshot, StoreError>
where
    S: RecordStore + ?Sized,
{
    let records = store.records_for_month(month).await?;
    Ok(MonthSnapshot::from_records(records))
}

/// Snapshots for a month range, each month read exactly once.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    snapshots: BTreeMap<MonthKey, MonthSnapshot>,
    empty: MonthSnapshot,
}

impl SnapshotCache {
    pub async fn load<S>(store: &S, months: &[MonthKey]) -> Result<Self, StoreError>
    where
        S: RecordStore + ?Sized,
    {
        let mut cache = Self::default();
        for &month in months {
            if cache.snapshots.contains_key(&month) {
                continue;
            }
            let snapshot = fetch_month(store, month).await?;
            tracing::debug!(
                month = %month,
                kams = snapshot.buckets.len(),
                records = snapshot.record_count(),
                "fetched month snapshot"
            );
            cache.snapshots.insert(month, snapshot);
        }
        Ok(cache)
    }

    /// Snapshot for `month`; months never loaded read as empty.
    pub fn get(&self, month: MonthKey) -> &MonthSnapshot {
        self.snapshots.get(&month).unwrap_or(&self.empty)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
