use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::routes::JudgeMessage;

struct ActiveRun {
    run_id: u32,
    token: CancellationToken,
}

/// Pending judging runs, consumed one at a time by the judge worker
pub struct JobQueue {
    queue: Mutex<VecDeque<JudgeMessage>>,
    notify: Notify,
    active: parking_lot::Mutex<Option<ActiveRun>>,
    next_id: AtomicU32,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            active: parking_lot::Mutex::new(None),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn next_run_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn push(&self, job: JudgeMessage) {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> JudgeMessage {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Records the run the worker is executing so it can be cancelled
    pub fn begin(&self, run_id: u32, token: CancellationToken) {
        *self.active.lock() = Some(ActiveRun { run_id, token });
    }

    pub fn finish(&self, run_id: u32) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.run_id == run_id) {
            *active = None;
        }
    }

    /// Drops a queued run or cancels the running one
    ///
    /// Returns `false` when no run with this id is queued or running.
    pub async fn cancel_job(&self, run_id: u32) -> bool {
        {
            let mut queue = self.queue.lock().await;
            let before_len = queue.len();
            queue.retain(|j| j.id() != run_id);
            if before_len != queue.len() {
                return true;
            }
        }

        match self.active.lock().as_ref() {
            Some(run) if run.run_id == run_id => {
                run.token.cancel();
                true
            }
            _ => false,
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
