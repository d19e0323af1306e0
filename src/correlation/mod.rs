//! The outstanding-request table: correlates incoming responses with
//! outbound calls this session is waiting on.
//!
//! - `manager.rs` — [`CorrelationManager`], the `DashMap`-backed table plus
//!   its background expiry-cleanup task.
//! - `types.rs` — [`PendingRequest`], one entry in the table.
//! - `error.rs` — [`CorrelationError`] and its result alias.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{CorrelationError, CorrelationResult};
pub use manager::{CorrelationConfig, CorrelationManager};
pub use types::PendingRequest;
