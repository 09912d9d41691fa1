//! chainflow-storage: in-memory collaborators for ChainFlow.
//!
//! - [`memory`]: handler history and subscription state
//! - [`config`]: configuration rows and resource registrations
//! - [`backends`]: collecting queue, search index and log store

pub mod backends;
pub mod config;
pub mod memory;

pub use backends::{MemoryLogStore, MemoryQueue, MemorySearchIndex};
pub use config::{IdGenerator, MemoryConfigurationRepository, SourceColumns, SourceKind};
pub use memory::InMemoryStorage;
