//! Reference `ConsentStateStore` backends.
//!
//! `MemoryConsentStore` backs tests and ephemeral deployments;
//! `SqliteConsentStore` is the persistent backend the server binary uses.
//! Both implement the same semantics: records are created implicitly on
//! first write, and a user is outdated for a version only if they neither
//! accepted it nor were already sent a notice for it.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryConsentStore;
pub use sqlite::SqliteConsentStore;
