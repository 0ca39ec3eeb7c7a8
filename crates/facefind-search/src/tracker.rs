//! Per-search task bookkeeping.
//!
//! The only shared mutable state in a search: task id → source, status and
//! timing. Everything else flows through task return values.

use crate::report::{SourceReport, SourceStatus};
use facefind_core::Source;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Running,
    Finished(SourceStatus),
}

#[derive(Debug, Clone)]
struct TaskEntry {
    source: Source,
    state: TaskState,
    started_at: Option<Instant>,
    elapsed_ms: Option<u64>,
    result_count: usize,
}

#[derive(Default)]
struct TrackerState {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, TaskEntry>,
}

#[derive(Default)]
pub struct TaskTracker {
    inner: Mutex<TrackerState>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, source: Source) -> TaskId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert(
            id,
            TaskEntry {
                source,
                state: TaskState::Pending,
                started_at: None,
                elapsed_ms: None,
                result_count: 0,
            },
        );
        id
    }

    /// Record a source that never got a task (no adapter registered).
    pub fn unavailable(&self, source: Source, reason: String) {
        let id = self.submit(source);
        self.finish(id, SourceStatus::Unavailable(reason), 0);
    }

    pub fn start(&self, id: TaskId) {
        if let Some(task) = self.lock().tasks.get_mut(&id) {
            task.state = TaskState::Running;
            task.started_at = Some(Instant::now());
        }
    }

    /// Move a task to a terminal state. Already-finished tasks are left alone.
    pub fn finish(&self, id: TaskId, status: SourceStatus, result_count: usize) {
        if let Some(task) = self.lock().tasks.get_mut(&id) {
            if matches!(task.state, TaskState::Finished(_)) {
                return;
            }
            task.elapsed_ms = task.started_at.map(|t| t.elapsed().as_millis() as u64);
            task.state = TaskState::Finished(status);
            task.result_count = result_count;
        }
    }

    /// Finish every task still pending or running with `status`.
    pub fn finish_outstanding(&self, status: SourceStatus) -> usize {
        let mut state = self.lock();
        let mut count = 0;
        for task in state.tasks.values_mut() {
            if !matches!(task.state, TaskState::Finished(_)) {
                task.elapsed_ms = task.started_at.map(|t| t.elapsed().as_millis() as u64);
                task.state = TaskState::Finished(status.clone());
                count += 1;
            }
        }
        count
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.lock().tasks.get(&id).map(|t| t.state.clone())
    }

    /// Reports in submission order. Unfinished tasks report as cancelled.
    pub fn reports(&self) -> Vec<SourceReport> {
        self.lock()
            .tasks
            .values()
            .map(|task| SourceReport {
                source: task.source.clone(),
                status: match &task.state {
                    TaskState::Finished(status) => status.clone(),
                    TaskState::Pending | TaskState::Running => SourceStatus::Cancelled,
                },
                result_count: task.result_count,
                elapsed_ms: task.elapsed_ms,
            })
            .collect()
    }
}
