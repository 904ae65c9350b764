//! Process-wide table of built mappers, keyed by mapper name.
//!
//! Nested fields that refer to a mapper by name resolve through here at
//! marshal/serialize time, so a schema may name itself or a mapper built later.

use crate::error::{MapperError, Result};
use crate::schema::MapperSchema;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<MapperSchema>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Insert or replace the mapper registered under `schema.name()`.
pub fn register(schema: Arc<MapperSchema>) {
    let name = schema.name().to_string();
    let mut table = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if table.insert(name.clone(), schema).is_some() {
        tracing::debug!(mapper = %name, "mapper re-registered");
    }
}

pub fn lookup(name: &str) -> Result<Arc<MapperSchema>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
        .ok_or_else(|| MapperError::UnknownMapper(name.to_string()))
}

pub fn is_registered(name: &str) -> bool {
    lookup(name).is_ok()
}
