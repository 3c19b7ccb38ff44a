use parking_lot::RwLock;
use serde::Serialize;

use crate::judge::{RunStatus, TestCase, run_status};

/// What the host application renders while a run is in flight
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub run_id: Option<u32>,
    pub status: RunStatus,
    pub test_cases: Vec<TestCase>,
    pub updated_time: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(run_id: u32, test_cases: Vec<TestCase>) -> Self {
        Self {
            run_id: Some(run_id),
            status: run_status(&test_cases),
            test_cases,
            updated_time: Some(crate::create_timestamp()),
        }
    }
}

/// Latest test-case list published by the judge worker
#[derive(Default)]
pub struct ProgressBoard {
    snapshot: RwLock<ProgressSnapshot>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, run_id: u32, cases: &[TestCase]) {
        *self.snapshot.write() = ProgressSnapshot::new(run_id, cases.to_vec());
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.read().clone()
    }
}
