//! Sync cycle reporting types.

use serde::Serialize;

/// Outcome of comparing a debtor's change digest against the stored one.
///
/// A record with no prior digest is `FirstSeen`, not `Updated`: every debtor
/// necessarily "changes" on its very first observation, and reporting that
/// as an update would make the change log useless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Unchanged,
    Updated,
    FirstSeen,
}

/// Phase of a running sync cycle. `Failed` is reachable from any phase;
/// the others repeat as pages are pulled and committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Fetching,
    Normalizing,
    Linking,
    Persisting,
    Done,
    Failed,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Fetching => "fetching",
            CyclePhase::Normalizing => "normalizing",
            CyclePhase::Linking => "linking",
            CyclePhase::Persisting => "persisting",
            CyclePhase::Done => "done",
            CyclePhase::Failed => "failed",
        }
    }
}

/// Summary returned to the caller after every cycle, even a partial one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub pulled: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: Vec<String>,
}
