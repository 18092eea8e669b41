#![deny(clippy::all)]

pub mod classifier;
pub mod deadline;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod resolver;
pub mod revalidate;
pub mod slots;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use classifier::ErrorClassifier;
pub use deadline::DeadlineGuard;
pub use domain::{CacheEntry, QueryOutcome, QueryPolicy, RecordValue, Token, TokenPolicy};
pub use memory::MemoryStore;
pub use ports::{CacheStore, Upstream};
pub use resolver::IcpResolver;
pub use revalidate::QueryEngine;
pub use token::TokenManager;
