//! lexigraph-core library.
//!
//! Validation, normalization and transitive closure over a graph of lexical
//! relations kept in a [`store::GraphStore`].
//!
//! # Conventions
//!
//! - **Errors**: library code returns [`error::Result`]; every error maps to a
//!   stable [`error::ErrorCode`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod closure;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod relation;
pub mod state;
pub mod stats;
pub mod store;
pub mod validate;

pub use closure::ClosureComputer;
pub use config::EngineConfig;
pub use error::{EngineError, ErrorCode, Result, StoreError};
pub use model::{Edge, EdgeOrigin, Node};
pub use normalize::GraphNormalizer;
pub use pipeline::Pipeline;
pub use relation::{RelationName, RelationRegistry, RelationType};
pub use state::{GraphState, Phase};
pub use stats::InsertionStats;
pub use store::{GraphStore, SqliteStore};
pub use validate::{ValidationReport, Validator};
