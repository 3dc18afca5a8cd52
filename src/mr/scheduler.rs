//! The coordinator's task table.
//!
//! [`Scheduler`] is a plain state machine with no locking and no clock of its
//! own: callers pass the current instant in and serialize access themselves.
//! Every Map task must complete before any Reduce task is handed out, since a
//! Reduce task reads the output of all Map tasks for its bucket.

use std::time::Duration;

use anyhow::{ensure, Result};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::task::{Assignment, Task, TaskPhase, TaskStatus};

#[derive(Debug)]
pub struct Scheduler {
    files: Vec<String>,
    n_reduce: u32,

    map_tasks: Vec<Task>,
    reduce_tasks: Vec<Task>,

    map_done: bool,
    reduce_done: bool,

    timeout: Duration,
}

impl Scheduler {
    pub fn new(files: Vec<String>, n_reduce: u32, timeout: Duration) -> Result<Self> {
        ensure!(n_reduce > 0, "a job needs at least one reduce bucket");
        let map_tasks = (0..files.len() as u32)
            .map(|i| Task::new(TaskPhase::Map, i))
            .collect::<Vec<_>>();
        let reduce_tasks = (0..n_reduce)
            .map(|i| Task::new(TaskPhase::Reduce, i))
            .collect();
        Ok(Scheduler {
            // an empty input list has nothing to map
            map_done: map_tasks.is_empty(),
            reduce_done: false,
            files,
            n_reduce,
            map_tasks,
            reduce_tasks,
            timeout,
        })
    }

    pub fn n_map(&self) -> u32 {
        self.map_tasks.len() as u32
    }

    pub fn map_done(&self) -> bool {
        self.map_done
    }

    /// True once every Map and Reduce task has completed. Never reverts.
    pub fn done(&self) -> bool {
        self.reduce_done
    }

    pub fn tasks(&self, phase: TaskPhase) -> &[Task] {
        match phase {
            TaskPhase::Map => &self.map_tasks,
            TaskPhase::Reduce => &self.reduce_tasks,
        }
    }

    fn tasks_mut(&mut self, phase: TaskPhase) -> &mut Vec<Task> {
        match phase {
            TaskPhase::Map => &mut self.map_tasks,
            TaskPhase::Reduce => &mut self.reduce_tasks,
        }
    }

    /// Hands out the lowest-indexed idle task of the current phase.
    pub fn assign(&mut self, now: Instant) -> Assignment {
        self.sweep(now);

        let phase = if !self.map_done() {
            TaskPhase::Map
        } else if !self.reduce_done {
            TaskPhase::Reduce
        } else {
            return Assignment::Exit;
        };

        let task = match self.tasks_mut(phase).iter_mut().find(|t| t.is_idle()) {
            Some(task) => task,
            None => {
                debug!("no idle {:?} task, asking worker to wait", phase);
                return Assignment::Wait;
            }
        };
        let index = task.index;
        let attempt = task.start(now);
        info!("assigned {:?} task {} (attempt {})", phase, index, attempt);

        match phase {
            TaskPhase::Map => Assignment::Map {
                file: self.files[index as usize].clone(),
                index,
                n_reduce: self.n_reduce,
                attempt,
            },
            TaskPhase::Reduce => Assignment::Reduce {
                index,
                n_reduce: self.n_reduce,
                n_map: self.n_map(),
                attempt,
            },
        }
    }

    /// Records that attempt `attempt` of a task finished. Reports for tasks
    /// that are not in progress, or that come from an attempt other than the
    /// current one, are ignored. Returns whether the report was accepted.
    pub fn report(&mut self, phase: TaskPhase, index: u32, attempt: u32, now: Instant) -> bool {
        self.sweep(now);

        let task = match self.tasks_mut(phase).get_mut(index as usize) {
            Some(task) => task,
            None => {
                warn!("report for unknown {:?} task {}", phase, index);
                return false;
            }
        };
        let status = task.status;
        match status {
            TaskStatus::InProgress { .. } if task.attempt == attempt => {
                task.status = TaskStatus::Completed;
            }
            _ => {
                debug!(
                    "ignoring report for {:?} task {} attempt {} (status {:?}, current attempt {})",
                    phase, index, attempt, status, task.attempt
                );
                return false;
            }
        }
        info!("{:?} task {} completed", phase, index);

        let all_done = self.tasks(phase).iter().all(Task::is_completed);
        match phase {
            TaskPhase::Map => {
                if all_done && !self.map_done {
                    info!("all {} map tasks completed, reducing", self.n_map());
                }
                self.map_done = all_done;
            }
            TaskPhase::Reduce => {
                if all_done && !self.reduce_done {
                    info!("all {} reduce tasks completed, job done", self.n_reduce);
                }
                self.reduce_done = all_done;
            }
        }
        true
    }

    /// Returns every task that has been in progress for longer than the
    /// timeout to idle. Yields the number of tasks reclaimed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let mut reclaimed = 0;
        for task in self.map_tasks.iter_mut().chain(self.reduce_tasks.iter_mut()) {
            if task.is_stale(now, timeout) {
                warn!(
                    "{:?} task {} timed out on attempt {}, making it available again",
                    task.phase, task.index, task.attempt
                );
                task.status = TaskStatus::Idle;
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn scheduler(n_files: usize, n_reduce: u32) -> Scheduler {
        let files = (0..n_files).map(|i| format!("pg-{}.txt", i)).collect();
        Scheduler::new(files, n_reduce, TIMEOUT).unwrap()
    }

    fn attempt_of(a: &Assignment) -> u32 {
        match a {
            Assignment::Map { attempt, .. } | Assignment::Reduce { attempt, .. } => *attempt,
            _ => panic!("not a task: {:?}", a),
        }
    }

    #[test]
    fn test_rejects_zero_buckets() {
        assert!(Scheduler::new(vec!["a".into()], 0, TIMEOUT).is_err());
    }

    #[test]
    fn test_map_tasks_in_index_order() {
        let mut s = scheduler(2, 3);
        let now = Instant::now();
        assert_eq!(
            s.assign(now),
            Assignment::Map {
                file: "pg-0.txt".into(),
                index: 0,
                n_reduce: 3,
                attempt: 1
            }
        );
        assert_eq!(
            s.assign(now),
            Assignment::Map {
                file: "pg-1.txt".into(),
                index: 1,
                n_reduce: 3,
                attempt: 1
            }
        );
        assert_eq!(s.assign(now), Assignment::Wait);
    }

    #[test]
    fn test_reduce_waits_for_every_map() {
        let mut s = scheduler(2, 2);
        let now = Instant::now();
        let first = s.assign(now);
        let second = s.assign(now);
        assert!(s.report(TaskPhase::Map, 0, attempt_of(&first), now));

        // one map task still running, so reduce may not start
        assert_eq!(s.assign(now), Assignment::Wait);
        assert!(!s.map_done());

        assert!(s.report(TaskPhase::Map, 1, attempt_of(&second), now));
        assert!(s.map_done());
        assert_eq!(
            s.assign(now),
            Assignment::Reduce {
                index: 0,
                n_reduce: 2,
                n_map: 2,
                attempt: 1
            }
        );
    }

    #[test]
    fn test_full_job_then_exit() {
        let mut s = scheduler(1, 2);
        let now = Instant::now();
        let m = s.assign(now);
        s.report(TaskPhase::Map, 0, attempt_of(&m), now);
        let r0 = s.assign(now);
        let r1 = s.assign(now);
        assert_eq!(s.assign(now), Assignment::Wait);

        s.report(TaskPhase::Reduce, 0, attempt_of(&r0), now);
        assert!(!s.done());
        s.report(TaskPhase::Reduce, 1, attempt_of(&r1), now);
        assert!(s.done());
        assert_eq!(s.assign(now), Assignment::Exit);
        assert_eq!(s.assign(now), Assignment::Exit);
    }

    #[test]
    fn test_empty_input_goes_straight_to_reduce() {
        let mut s = scheduler(0, 1);
        assert!(s.map_done());
        assert!(matches!(
            s.assign(Instant::now()),
            Assignment::Reduce { index: 0, n_map: 0, .. }
        ));
    }

    #[test]
    fn test_duplicate_report_is_noop() {
        let mut s = scheduler(1, 1);
        let now = Instant::now();
        let m = s.assign(now);
        assert!(s.report(TaskPhase::Map, 0, attempt_of(&m), now));
        assert!(!s.report(TaskPhase::Map, 0, attempt_of(&m), now));
        assert!(s.map_done());
        assert!(s.tasks(TaskPhase::Map)[0].is_completed());
    }

    #[test]
    fn test_report_for_idle_or_unknown_task_ignored() {
        let mut s = scheduler(2, 1);
        let now = Instant::now();
        assert!(!s.report(TaskPhase::Map, 0, 0, now));
        assert!(!s.report(TaskPhase::Map, 7, 1, now));
        assert!(!s.report(TaskPhase::Reduce, 0, 1, now));
        assert!(s.tasks(TaskPhase::Map).iter().all(Task::is_idle));
        assert!(!s.map_done());
    }

    #[test]
    fn test_stale_task_reassigned() {
        let mut s = scheduler(1, 1);
        let start = Instant::now();
        let first = s.assign(start);
        assert_eq!(s.assign(start + Duration::from_secs(9)), Assignment::Wait);

        let later = start + TIMEOUT;
        let second = s.assign(later);
        assert_eq!(
            second,
            Assignment::Map {
                file: "pg-0.txt".into(),
                index: 0,
                n_reduce: 1,
                attempt: 2
            }
        );

        // the presumed-dead worker reports after it was replaced
        assert!(!s.report(TaskPhase::Map, 0, attempt_of(&first), later));
        assert!(!s.map_done());
        assert!(s.report(TaskPhase::Map, 0, attempt_of(&second), later));
        assert!(s.map_done());
    }

    #[test]
    fn test_late_report_after_reset_ignored() {
        let mut s = scheduler(1, 1);
        let start = Instant::now();
        let first = s.assign(start);
        assert_eq!(s.sweep(start + TIMEOUT), 1);
        assert!(s.tasks(TaskPhase::Map)[0].is_idle());
        assert!(!s.report(TaskPhase::Map, 0, attempt_of(&first), start + TIMEOUT));
        assert!(!s.map_done());
    }

    #[test]
    fn test_sweep_leaves_completed_and_fresh_tasks() {
        let mut s = scheduler(3, 1);
        let start = Instant::now();
        let a = s.assign(start);
        s.assign(start);
        s.report(TaskPhase::Map, 0, attempt_of(&a), start);
        s.assign(start + Duration::from_secs(5));

        assert_eq!(s.sweep(start + TIMEOUT), 1);
        let tasks = s.tasks(TaskPhase::Map);
        assert!(tasks[0].is_completed());
        assert!(tasks[1].is_idle());
        assert!(matches!(tasks[2].status, TaskStatus::InProgress { .. }));
    }

    #[test]
    fn test_done_is_monotonic() {
        let mut s = scheduler(1, 1);
        let mut now = Instant::now();
        let m = s.assign(now);
        s.report(TaskPhase::Map, 0, attempt_of(&m), now);
        let r = s.assign(now);
        s.report(TaskPhase::Reduce, 0, attempt_of(&r), now);
        assert!(s.done());

        for _ in 0..3 {
            now += TIMEOUT * 2;
            s.sweep(now);
            s.report(TaskPhase::Reduce, 0, attempt_of(&r), now);
            assert_eq!(s.assign(now), Assignment::Exit);
            assert!(s.done());
        }
    }
}
