use std::path::PathBuf;
use std::time::Duration;

use crate::util::net::Endpoint;

/// A task not reported within this long is presumed lost.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub endpoint: Endpoint,
    pub task_timeout: Duration,
    /// How often in-progress tasks are checked for staleness.
    pub sweep_interval: Duration,
    /// How long to keep answering `Exit` after the job is done before the
    /// server shuts down.
    pub exit_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            endpoint: Endpoint::default(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            sweep_interval: Duration::from_millis(500),
            exit_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub endpoint: Endpoint,
    /// Directory holding intermediate and output files.
    pub work_dir: PathBuf,
    /// Pause between polls when the coordinator says to wait.
    pub wait_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            endpoint: Endpoint::default(),
            work_dir: PathBuf::from("."),
            wait_interval: Duration::from_secs(1),
        }
    }
}
