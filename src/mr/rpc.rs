//! gRPC surface between workers and the coordinator, and the conversions
//! between wire messages and [`Assignment`].

use tokio::net::UnixStream;
use tonic::transport::{Channel, Uri};
use tower::service_fn;

use super::error::WorkerError;
use super::task::{Assignment, TaskPhase};
use crate::util::net::Endpoint;

pub mod mr_types {
    include!("../../proto/mr.rs");
}

pub use mr_types::coordinator_client::CoordinatorClient;
pub use mr_types::coordinator_server::{Coordinator, CoordinatorServer};
pub use mr_types::{Empty, GetTaskReply, ReportTaskRequest, TaskKind};

impl From<TaskPhase> for TaskKind {
    fn from(phase: TaskPhase) -> Self {
        match phase {
            TaskPhase::Map => TaskKind::Map,
            TaskPhase::Reduce => TaskKind::Reduce,
        }
    }
}

impl TaskKind {
    /// The phase a report refers to; `None` for `Wait` and `Exit`.
    pub fn phase(self) -> Option<TaskPhase> {
        match self {
            TaskKind::Map => Some(TaskPhase::Map),
            TaskKind::Reduce => Some(TaskPhase::Reduce),
            TaskKind::Wait | TaskKind::Exit => None,
        }
    }
}

impl From<Assignment> for GetTaskReply {
    fn from(assignment: Assignment) -> Self {
        match assignment {
            Assignment::Map {
                file,
                index,
                n_reduce,
                attempt,
            } => GetTaskReply {
                kind: TaskKind::Map as i32,
                file,
                task_index: index,
                bucket_count: n_reduce,
                map_task_count: 0,
                attempt,
            },
            Assignment::Reduce {
                index,
                n_reduce,
                n_map,
                attempt,
            } => GetTaskReply {
                kind: TaskKind::Reduce as i32,
                task_index: index,
                bucket_count: n_reduce,
                map_task_count: n_map,
                attempt,
                ..Default::default()
            },
            Assignment::Wait => GetTaskReply {
                kind: TaskKind::Wait as i32,
                ..Default::default()
            },
            Assignment::Exit => GetTaskReply {
                kind: TaskKind::Exit as i32,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<GetTaskReply> for Assignment {
    type Error = tonic::Status;

    fn try_from(reply: GetTaskReply) -> Result<Self, Self::Error> {
        let kind = TaskKind::from_i32(reply.kind).ok_or_else(|| {
            tonic::Status::invalid_argument(format!("unknown task kind {}", reply.kind))
        })?;
        if matches!(kind, TaskKind::Map | TaskKind::Reduce) && reply.bucket_count == 0 {
            return Err(tonic::Status::invalid_argument("assignment without reduce buckets"));
        }
        Ok(match kind {
            TaskKind::Map => Assignment::Map {
                file: reply.file,
                index: reply.task_index,
                n_reduce: reply.bucket_count,
                attempt: reply.attempt,
            },
            TaskKind::Reduce => Assignment::Reduce {
                index: reply.task_index,
                n_reduce: reply.bucket_count,
                n_map: reply.map_task_count,
                attempt: reply.attempt,
            },
            TaskKind::Wait => Assignment::Wait,
            TaskKind::Exit => Assignment::Exit,
        })
    }
}

impl ReportTaskRequest {
    pub fn new(phase: TaskPhase, index: u32, attempt: u32) -> Self {
        ReportTaskRequest {
            kind: TaskKind::from(phase) as i32,
            task_index: index,
            attempt,
        }
    }
}

/// Dials the coordinator. Failing here is how a worker learns the
/// coordinator is gone.
pub async fn connect(endpoint: &Endpoint) -> Result<CoordinatorClient<Channel>, WorkerError> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(CoordinatorClient::connect(format!("http://{}", addr)).await?),
        Endpoint::Unix(path) => {
            let path = path.clone();
            // the uri is ignored by the connector but must still parse
            let channel = tonic::transport::Endpoint::from_static("http://[::]:50051")
                .connect_with_connector(service_fn(move |_: Uri| {
                    UnixStream::connect(path.clone())
                }))
                .await?;
            Ok(CoordinatorClient::new(channel))
        }
    }
}
