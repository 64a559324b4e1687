//! Memory lifecycle engine for knowledge graph entities.
//!
//! Rates each entity's importance and stability (LLM-backed, with default
//! fallback), derives an exponentially decaying relevance score from those
//! ratings and time since last access, and ages entities through
//! ACTIVE -> DORMANT -> ARCHIVED -> EXPIRED -> SOFT_DELETED, reactivating
//! them on access.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod scheduler;
pub mod store;
pub mod trigger;
pub mod types;

pub use engine::Engine;
