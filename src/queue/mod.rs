//! Per-channel matchmaking queues
//!
//! Queue instances hold membership, the registry serializes mutations per
//! channel and persists them through a `QueueStore`.

pub mod instance;
pub mod registry;
pub mod store;

pub use instance::{JoinOutcome, LeaveOutcome, QueueInstance};
pub use registry::{QueueRegistry, QueueRegistryStats};
pub use store::{InMemoryQueueStore, JsonFileQueueStore, QueueStore};
