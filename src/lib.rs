//! An in-memory document store with MongoDB query, update, projection and aggregation semantics.

pub mod aggregate;
pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod logger;
pub mod query;
pub mod update;
pub mod utils;

pub use crate::collection::{Collection, DeleteReport, FindAndModify, UpdateOptions, UpdateReport};
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, SharedCollection};
pub use crate::errors::DbError;
pub use crate::query::{Cursor, Filter, FindOptions, Projection};
pub use crate::update::UpdateSpec;
pub use bson::{Bson, Document, doc};

/// Installs logging from `config` and returns an engine built from it.
///
/// # Errors
/// Returns `DbError::Config` if logging cannot be set up.
pub fn init(config: EngineConfig) -> Result<Engine, DbError> {
    logger::init(&config.logging)?;
    Ok(Engine::new(config))
}
