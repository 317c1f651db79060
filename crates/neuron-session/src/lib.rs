//! Session model and the persistence boundary.
//!
//! The gateway never stores conversation content itself. Finished messages
//! are handed to a [`PersistenceStore`], an append-only collaborator.

/// The session record.
pub mod session;
/// Persistence stores.
pub mod store;

pub use session::Session;
pub use store::{FileMessageStore, MemoryMessageStore, PersistenceStore};
