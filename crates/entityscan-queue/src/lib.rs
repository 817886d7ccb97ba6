//! Message Broker Shim.
//!
//! This crate provides:
//! - The `Broker` trait and an in-process bounded-channel implementation
//! - An optional Redis Streams implementation behind the `redis-broker` feature
//! - The per-job progress event channel consumed by status polling

pub mod broker;
pub mod error;
pub mod progress;
pub mod task;

#[cfg(feature = "redis-broker")]
pub mod redis_broker;

pub use broker::{open_broker, Broker, InProcessBroker, InProcessBrokerConfig};
pub use error::{QueueError, QueueResult};
pub use progress::{ProgressChannel, ProgressEvent};
pub use task::{Delivery, Task};

#[cfg(feature = "redis-broker")]
pub use redis_broker::{RedisBroker, RedisBrokerConfig};
