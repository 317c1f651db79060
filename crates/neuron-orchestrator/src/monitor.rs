use neuron_core::TaskStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for orchestration tasks.
#[derive(Default)]
pub struct TaskMonitor {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    agent_runs: AtomicU64,
    agent_errors: AtomicU64,
}

/// Point-in-time copy of [`TaskMonitor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Tasks that acquired a slot.
    pub started: u64,
    /// Tasks that ended `completed`.
    pub completed: u64,
    /// Tasks that ended `failed`.
    pub failed: u64,
    /// Tasks that ended `cancelled`.
    pub cancelled: u64,
    /// Requests turned away because the concurrency limit was reached.
    pub rejected: u64,
    /// Agent invocations across all tasks.
    pub agent_runs: u64,
    /// Agent invocations that failed or timed out.
    pub agent_errors: u64,
}

impl TaskMonitor {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a task that acquired a slot.
    pub fn task_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a task turned away as busy.
    pub fn task_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a task that reached `status`. Non-terminal statuses are ignored.
    pub fn task_finished(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Completed => &self.completed,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Cancelled => &self.cancelled,
            TaskStatus::Pending | TaskStatus::InProgress => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one agent invocation.
    pub fn agent_dispatched(&self) {
        self.agent_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one failed agent invocation.
    pub fn agent_failed(&self) {
        self.agent_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> TaskStats {
        TaskStats {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            agent_runs: self.agent_runs.load(Ordering::Relaxed),
            agent_errors: self.agent_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_terminal_status() {
        let monitor = TaskMonitor::new();
        monitor.task_started();
        monitor.task_started();
        monitor.task_finished(TaskStatus::Completed);
        monitor.task_finished(TaskStatus::Cancelled);
        monitor.task_finished(TaskStatus::InProgress);
        monitor.task_rejected();

        let stats = monitor.snapshot();
        assert_eq!(stats.started, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.rejected, 1);
    }
}
