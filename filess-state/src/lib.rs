//! Filess State Management
//!
//! Persists the identity and last observed attributes of every managed
//! resource between runs.
//!
//! - **StateFile**: all managed resources plus serial/lineage bookkeeping
//! - **StateBackend**: a trait for state storage backends
//! - **LocalBackend**: a JSON file on disk

pub mod backend;
pub mod backends;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use state::{ResourceState, StateFile};
