//! Persisted project facts, one per (month, project).

use serde::{Deserialize, Serialize};

use crate::month::{parse_sop_month, MonthKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub month: MonthKey,
    pub project_id: String,
    /// Owning account manager. Empty when unassigned; still scored as its own bucket.
    pub kam: String,
    pub status: String,
    /// Potential tons per year at this snapshot.
    pub potential: i64,
    /// Estimated annual yield, scales the volume and SOP penalties.
    pub est_ay: i64,
    /// Start-of-production text as uploaded.
    pub sop: String,
}

impl ProjectRecord {
    pub fn has_status(&self, code: &str) -> bool {
        self.status == code
    }

    pub fn sop_month(&self) -> Option<MonthKey> {
        parse_sop_month(&self.sop)
    }
}
