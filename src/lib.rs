//! Knowledge graph construction and query engine
//!
//! Extracts entities and relationships from text chunks via
//! caller-supplied language-model callbacks, fuses them into a
//! deduplicated knowledge graph with provenance, detects hierarchical
//! communities, and answers graph queries from memory or from Postgres.
//!
//! # Architecture
//!
//! - **Extraction**: Pluggable strategies turning chunk text into
//!   entity/relationship drafts ([`extraction`])
//! - **Fusion**: Chunk-by-chunk graph assembly with case-insensitive
//!   dedup and mention provenance ([`builder`])
//! - **Storage**: One contract, two backends — Postgres and in-memory
//!   ([`store`])
//! - **Communities**: Hierarchical detection plus change-tracked
//!   summaries ([`community`])
//! - **Query**: In-memory traversal, similarity, and chunk-provenance
//!   lookups ([`query`])
//!
//! # Modules
//!
//! - [`domain`]: Core graph types
//! - [`extraction`]: Extraction strategy traits and LLM implementations
//! - [`builder`]: Graph assembly and merging
//! - [`store`]: The [`store::GraphStore`] contract and its backends
//! - [`community`]: Detection and summarization
//! - [`query`]: The in-memory [`query::QueryGraph`]
//! - [`llm`]: The completion-provider boundary

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]

pub mod builder;
pub mod community;
pub mod config;
pub mod domain;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod query;
pub mod store;

pub use builder::GraphBuilder;
pub use community::{CommunitySummarizer, LeidenDetector};
pub use config::GraphConfig;
pub use error::GraphError;
pub use llm::{CompletionFn, CompletionProvider};
pub use query::QueryGraph;
pub use store::{GraphStore, InMemoryGraphStore, PostgresGraphStore};
