use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One captured per-unit failure; kept as data so an aggregate result can
/// list every error without re-raising any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedError {
    pub unit_id: String,
    pub message: String,
}

/// Progress snapshot of one migration run. Mutated only by the handler
/// driving the run; everyone else sees pushed snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub state: MigrationState,
    pub completed: u64,
    /// Best effort; known once enumeration finished.
    pub total: u64,
    pub errors: Vec<CapturedError>,
}

impl MigrationStatus {
    pub fn queued() -> Self {
        Self {
            state: MigrationState::Queued,
            completed: 0,
            total: 0,
            errors: Vec::new(),
        }
    }
}

impl Default for MigrationStatus {
    fn default() -> Self {
        Self::queued()
    }
}

/// Receives status snapshots from a running migration. Must tolerate being
/// polled at any time, including before the run reaches RUNNING.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: &MigrationStatus);
}

/// Sink that keeps the latest snapshot behind a lock, for callers polling an
/// in-flight run (e.g. an admin endpoint).
#[derive(Debug, Default)]
pub struct SharedStatusSink {
    latest: RwLock<MigrationStatus>,
}

impl SharedStatusSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> MigrationStatus {
        self.latest.read().clone()
    }
}

impl StatusSink for SharedStatusSink {
    fn update(&self, status: &MigrationStatus) {
        *self.latest.write() = status.clone();
    }
}

/// Sink for callers that do not care about progress.
#[derive(Debug, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn update(&self, _status: &MigrationStatus) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_sink_can_be_polled_before_any_update() {
        let sink = SharedStatusSink::new();
        assert_eq!(sink.snapshot().state, MigrationState::Queued);

        let mut status = MigrationStatus::queued();
        status.state = MigrationState::Running;
        status.total = 10;
        sink.update(&status);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.state, MigrationState::Running);
        assert_eq!(snapshot.total, 10);
    }
}
