//! Persistence layer — two-tier lead context storage and event dedupe.

pub mod context_store;
pub mod dedupe;
pub mod libsql_backend;
pub mod memory;
pub mod traits;

pub use context_store::ContextStore;
pub use dedupe::DedupeGuard;
pub use libsql_backend::LibSqlStore;
pub use memory::{InMemoryDedupe, InMemoryDurable, InMemoryTransient};
pub use traits::{DedupeStore, DurableStore, TransientStore};
