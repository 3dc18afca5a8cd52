//! A fault-tolerant MapReduce engine: one coordinator hands Map and Reduce
//! tasks to an elastic pool of workers over gRPC and re-issues any task
//! whose worker goes quiet for too long.

pub mod mr;
pub mod mrapps;
pub mod util;
