//! Command implementations

pub mod get;
pub mod ingest;
pub mod search;
pub mod seed;
pub mod source;
pub mod status;

use docdex_core::db::Source;
use docdex_core::error::{DocdexError, Result};
use docdex_core::Engine;

/// Resolve a source by name, owner/repo, or numeric id
pub fn resolve_source(engine: &Engine, query: &str) -> Result<Source> {
    if let Ok(id) = query.parse::<i64>() {
        if let Some(source) = engine.index_db().get_source(id)? {
            return Ok(source);
        }
    }
    engine
        .index_db()
        .find_source(query)?
        .ok_or_else(|| DocdexError::SourceNotFound(query.to_string()))
}
