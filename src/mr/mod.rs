pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod partition;
pub mod rpc;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use codec::KeyValue;
