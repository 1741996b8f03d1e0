//! Process-wide engine registry.
//!
//! Engines register under a lower-cased name; aliases map extra names onto
//! a registered engine. Access is synchronized, so registration at startup
//! and lookup from request handlers can overlap safely.

use crate::error::Error;
use crate::exec::CompiledQuery;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A query engine: anything that can turn a DSL document into an
/// executable statement. [`crate::exec::Executor`] is the MySQL one.
pub trait Engine: Send + Sync {
    fn load(&self, source: &Value) -> crate::Result<CompiledQuery>;
}

impl Engine for crate::exec::Executor {
    fn load(&self, source: &Value) -> crate::Result<CompiledQuery> {
        self.load_value(source)
    }
}

static ENGINES: Lazy<RwLock<HashMap<String, Arc<dyn Engine>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static ALIASES: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register an engine under `name` (case-insensitive). Replaces any
/// previous engine of the same name.
pub fn register(name: &str, engine: Arc<dyn Engine>) {
    if let Ok(mut engines) = ENGINES.write() {
        engines.insert(name.to_lowercase(), engine);
    }
}

/// Remove an engine and every alias pointing at it.
pub fn unregister(name: &str) {
    let name = name.to_lowercase();
    if let Ok(mut engines) = ENGINES.write() {
        engines.remove(&name);
    }
    if let Ok(mut aliases) = ALIASES.write() {
        aliases.retain(|_, target| *target != name);
    }
}

/// Make `alias` resolve to the engine registered as `name`.
pub fn alias(name: &str, alias: &str) -> crate::Result<()> {
    let name = name.to_lowercase();
    let known = ENGINES
        .read()
        .map(|engines| engines.contains_key(&name))
        .unwrap_or(false);
    if !known {
        return Err(Error::EngineNotFound(name));
    }
    if let Ok(mut aliases) = ALIASES.write() {
        aliases.insert(alias.to_lowercase(), name);
    }
    Ok(())
}

/// Look up an engine by name or alias.
pub fn select(name: &str) -> crate::Result<Arc<dyn Engine>> {
    let mut key = name.to_lowercase();
    if let Ok(aliases) = ALIASES.read() {
        if let Some(target) = aliases.get(&key) {
            key = target.clone();
        }
    }
    ENGINES
        .read()
        .ok()
        .and_then(|engines| engines.get(&key).cloned())
        .ok_or_else(|| Error::EngineNotFound(name.to_string()))
}
