//! `kejani-store` — the storage collaborator boundary.
//!
//! The rest of the system talks to persistence through [`DocumentStore`], a
//! small document-database contract (find-one/save/update/delete/aggregate).
//! One store handle is constructed at process startup and injected everywhere
//! it is needed; nothing in this workspace reaches for a global client.

pub mod accounts;
pub mod document;
pub mod memory;

pub use accounts::{Account, AccountStore, Accounts};
pub use document::{Collection, DocumentStore, StoreError};
pub use memory::MemoryStore;
