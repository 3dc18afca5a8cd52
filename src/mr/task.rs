use tokio::time::Instant;

/// The two ordered phases of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskPhase {
    Map,
    Reduce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Idle,
    InProgress { started_at: Instant },
    Completed,
}

/// One schedulable unit of work. `index` names the input file for Map tasks
/// and the bucket for Reduce tasks, and never changes.
#[derive(Clone, Debug)]
pub struct Task {
    pub phase: TaskPhase,
    pub index: u32,
    pub status: TaskStatus,
    /// Number of times this task has been handed out.
    pub attempt: u32,
}

impl Task {
    pub fn new(phase: TaskPhase, index: u32) -> Self {
        Task {
            phase,
            index,
            status: TaskStatus::Idle,
            attempt: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == TaskStatus::Idle
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub(crate) fn start(&mut self, now: Instant) -> u32 {
        self.status = TaskStatus::InProgress { started_at: now };
        self.attempt += 1;
        self.attempt
    }

    /// Whether the task has been in progress for at least `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: std::time::Duration) -> bool {
        match self.status {
            TaskStatus::InProgress { started_at } => {
                now.saturating_duration_since(started_at) >= timeout
            }
            _ => false,
        }
    }
}

/// The coordinator's answer to a worker asking for work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    Map {
        file: String,
        index: u32,
        n_reduce: u32,
        attempt: u32,
    },
    Reduce {
        index: u32,
        n_reduce: u32,
        n_map: u32,
        attempt: u32,
    },
    /// Work is outstanding but none of it is free; ask again later.
    Wait,
    /// The job is finished.
    Exit,
}
