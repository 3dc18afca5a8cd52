use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tokio_stream::wrappers::UnixListenerStream;
use tokio_stream::StreamExt;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::rpc::{
    Coordinator, CoordinatorServer, Empty, GetTaskReply, ReportTaskRequest, TaskKind,
};
use super::scheduler::Scheduler;
use crate::util::net::{Endpoint, UdsStream};

/// The gRPC face of a [`Scheduler`]. Every call takes the one lock for the
/// duration of an in-memory update only, so no two workers can claim the
/// same task.
#[derive(Debug, Clone)]
pub struct MRCoordinator {
    locked_scheduler: Arc<Mutex<Scheduler>>,
}

impl MRCoordinator {
    pub fn new(files: Vec<String>, n_reduce: u32, config: &CoordinatorConfig) -> Result<Self> {
        info!(
            "new job: {} map tasks, {} reduce tasks, timeout {:?}",
            files.len(),
            n_reduce,
            config.task_timeout
        );
        let scheduler = Scheduler::new(files, n_reduce, config.task_timeout)?;
        Ok(MRCoordinator {
            locked_scheduler: Arc::new(Mutex::new(scheduler)),
        })
    }

    /// Whether every Map and Reduce task has completed.
    pub async fn done(&self) -> bool {
        self.locked_scheduler.lock().await.done()
    }

    async fn reset_timeout_jobs(locked_scheduler: Arc<Mutex<Scheduler>>, every: Duration) {
        debug!("start the running tasks checker...");
        let mut ticker = time::interval(every);
        loop {
            ticker.tick().await;
            let mut scheduler = locked_scheduler.lock().await;
            if scheduler.done() {
                return;
            }
            scheduler.sweep(Instant::now());
        }
    }

    /// Serves workers until the job is done, then keeps answering `Exit`
    /// for `config.exit_grace` before shutting down.
    pub async fn run(self, config: CoordinatorConfig) -> Result<()> {
        tokio::spawn(Self::reset_timeout_jobs(
            self.locked_scheduler.clone(),
            config.sweep_interval,
        ));

        let watcher = self.clone();
        let poll = config.sweep_interval;
        let grace = config.exit_grace;
        let job_done = async move {
            while !watcher.done().await {
                time::sleep(poll).await;
            }
            info!("job done, shutting down in {:?}", grace);
            time::sleep(grace).await;
        };

        info!("coordinator listening on {}", config.endpoint);
        self.serve(&config.endpoint, job_done).await
    }

    /// Serves the coordinator on `endpoint` until `shutdown` resolves.
    pub async fn serve<F>(self, endpoint: &Endpoint, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let router = Server::builder().add_service(CoordinatorServer::new(self));
        match endpoint {
            Endpoint::Tcp(addr) => router
                .serve_with_shutdown(*addr, shutdown)
                .await
                .with_context(|| format!("serving on {}", addr))?,
            Endpoint::Unix(path) => {
                // a previous coordinator may have left its socket behind
                match std::fs::remove_file(path) {
                    Err(e) if e.kind() != ErrorKind::NotFound => {
                        return Err(e)
                            .with_context(|| format!("removing stale socket {}", path.display()))
                    }
                    _ => {}
                }
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("binding {}", path.display()))?;
                let incoming = UnixListenerStream::new(listener).map(|conn| conn.map(UdsStream));
                router
                    .serve_with_incoming_shutdown(incoming, shutdown)
                    .await
                    .with_context(|| format!("serving on {}", path.display()))?;
                let _ = std::fs::remove_file(path);
            }
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl Coordinator for MRCoordinator {
    async fn get_task(&self, _request: Request<Empty>) -> Result<Response<GetTaskReply>, Status> {
        let assignment = self.locked_scheduler.lock().await.assign(Instant::now());
        Ok(Response::new(assignment.into()))
    }

    async fn report_task(
        &self,
        request: Request<ReportTaskRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        match TaskKind::from_i32(req.kind).and_then(TaskKind::phase) {
            Some(phase) => {
                let mut scheduler = self.locked_scheduler.lock().await;
                scheduler.report(phase, req.task_index, req.attempt, Instant::now());
            }
            None => warn!("ignoring report with task kind {}", req.kind),
        }
        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TIMEOUT: Duration = crate::mr::config::DEFAULT_TASK_TIMEOUT;

    fn coordinator(files: &[&str]) -> MRCoordinator {
        let files = files.iter().map(|f| f.to_string()).collect();
        MRCoordinator::new(files, 1, &CoordinatorConfig::default()).unwrap()
    }

    async fn ask(c: &MRCoordinator) -> GetTaskReply {
        c.get_task(Request::new(Empty {})).await.unwrap().into_inner()
    }

    async fn report(c: &MRCoordinator, kind: TaskKind, index: u32, attempt: u32) {
        let req = ReportTaskRequest {
            kind: kind as i32,
            task_index: index,
            attempt,
        };
        c.report_task(Request::new(req)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_idle_task_claimed_once() {
        let c = coordinator(&["only.txt"]);
        let handles = (0..16)
            .map(|_| {
                let c = c.clone();
                tokio::spawn(async move { ask(&c).await })
            })
            .collect::<Vec<_>>();

        let mut claimed = 0;
        for handle in handles {
            let reply = handle.await.unwrap();
            match TaskKind::from_i32(reply.kind) {
                Some(TaskKind::Map) => {
                    assert_eq!(reply.file, "only.txt");
                    claimed += 1;
                }
                Some(TaskKind::Wait) => {}
                other => panic!("unexpected reply {:?}", other),
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_job_lifecycle_over_handlers() {
        let c = coordinator(&["a.txt", "b.txt"]);
        let m0 = ask(&c).await;
        let m1 = ask(&c).await;
        assert_eq!((m0.task_index, m1.task_index), (0, 1));
        assert_eq!(m0.bucket_count, 1);

        report(&c, TaskKind::Map, 0, m0.attempt).await;
        report(&c, TaskKind::Map, 1, m1.attempt).await;

        let r = ask(&c).await;
        assert_eq!(TaskKind::from_i32(r.kind), Some(TaskKind::Reduce));
        assert_eq!(r.map_task_count, 2);
        assert!(!c.done().await);

        // nonsense reports are acknowledged and ignored
        report(&c, TaskKind::Wait, 0, 1).await;
        report(&c, TaskKind::Reduce, 5, 1).await;
        assert!(!c.done().await);

        report(&c, TaskKind::Reduce, 0, r.attempt).await;
        assert!(c.done().await);
        assert_eq!(TaskKind::from_i32(ask(&c).await.kind), Some(TaskKind::Exit));

        report(&c, TaskKind::Reduce, 0, r.attempt).await;
        assert!(c.done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_stalled_task() {
        let c = coordinator(&["a.txt"]);
        tokio::spawn(MRCoordinator::reset_timeout_jobs(
            c.locked_scheduler.clone(),
            Duration::from_millis(500),
        ));

        let first = ask(&c).await;
        assert_eq!(TaskKind::from_i32(ask(&c).await.kind), Some(TaskKind::Wait));

        time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        {
            let scheduler = c.locked_scheduler.lock().await;
            assert!(scheduler.tasks(crate::mr::task::TaskPhase::Map)[0].is_idle());
        }

        let second = ask(&c).await;
        assert_eq!(second.task_index, first.task_index);
        assert_eq!(second.attempt, first.attempt + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_timeout_governs_reclaim() {
        let config = CoordinatorConfig {
            task_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let c = MRCoordinator::new(vec!["a.txt".into()], 1, &config).unwrap();

        let first = ask(&c).await;
        assert_eq!(TaskKind::from_i32(first.kind), Some(TaskKind::Map));
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(TaskKind::from_i32(ask(&c).await.kind), Some(TaskKind::Wait));

        time::sleep(Duration::from_millis(100)).await;
        let second = ask(&c).await;
        assert_eq!(TaskKind::from_i32(second.kind), Some(TaskKind::Map));
        assert_eq!(second.attempt, first.attempt + 1);
    }
}
