pub mod manager;
pub mod types;

// Re-export queue types for convenience
pub use manager::{RequestQueue, Ticket};
pub use types::{QueueState, RequestId};
