//! Compile-once cache of compiled schemas keyed by `$id` and `$version`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;

use crate::compiler::{compile_value, CompiledSchema};
use crate::error::Error;
use crate::types::{ResolveOptions, DEFAULT_VERSION};

/// Identity of a cached schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub id: String,
    pub version: u64,
}

impl CacheKey {
    pub fn new(id: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Key for a raw schema document, if it declares `$id`.
    pub fn for_document(schema: &Value) -> Option<Self> {
        let id = schema.get("$id")?.as_str()?;
        let version = schema
            .get("$version")
            .or_else(|| schema.get("schema_version"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_VERSION);
        Some(Self::new(id, version))
    }
}

type Slot = Arc<Mutex<Option<Arc<CompiledSchema>>>>;

/// Thread-safe cache of compiled schemas.
///
/// Lookups share a read lock. Each key has its own slot, so at most one
/// compilation per key runs at a time while other keys proceed. Failed
/// compilations leave the slot empty and are retried on the next request.
#[derive(Debug, Default)]
pub struct SchemaCache {
    options: ResolveOptions,
    entries: RwLock<HashMap<CacheKey, Slot>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose schemas are resolved with `options`.
    pub fn with_options(options: ResolveOptions) -> Self {
        Self {
            options,
            entries: RwLock::default(),
        }
    }

    /// Cached schema for `key`, if one has been compiled.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledSchema>> {
        let slot = self.existing_slot(key)?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Return the cached schema for `key`, compiling it with `compile` if
    /// absent. Concurrent callers for the same key wait for one compilation.
    pub fn get_or_compile<F>(&self, key: CacheKey, compile: F) -> Result<Arc<CompiledSchema>, Error>
    where
        F: FnOnce(&ResolveOptions) -> Result<CompiledSchema, Error>,
    {
        let slot = self.slot(&key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = guard.as_ref() {
            return Ok(Arc::clone(compiled));
        }

        tracing::info!(id = %key.id, version = key.version, "compiling schema");
        let compiled = Arc::new(compile(&self.options)?);
        *guard = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Compile a raw schema document through the cache. Documents without
    /// `$id` are compiled every time.
    pub fn load(&self, schema: &Value) -> Result<Arc<CompiledSchema>, Error> {
        match CacheKey::for_document(schema) {
            Some(key) => self.get_or_compile(key, |options| compile_value(schema, options)),
            None => {
                tracing::debug!("schema has no $id, compiling without caching");
                Ok(Arc::new(compile_value(schema, &self.options)?))
            }
        }
    }

    /// Number of keys with a compiled schema.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn existing_slot(&self, key: &CacheKey) -> Option<Slot> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        if let Some(slot) = self.existing_slot(key) {
            return slot;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn schema(id: &str) -> Value {
        json!({
            "$id": id,
            "$version": 2,
            "type": "object",
            "properties": {
                "name": { "type": "string", "map": "company_name" }
            }
        })
    }

    #[test]
    fn key_from_document() {
        assert_eq!(
            CacheKey::for_document(&schema("a")),
            Some(CacheKey::new("a", 2))
        );
        assert_eq!(
            CacheKey::for_document(&json!({ "$id": "b", "schema_version": 2 })),
            Some(CacheKey::new("b", 2))
        );
        assert_eq!(CacheKey::for_document(&json!({ "type": "object" })), None);
    }

    #[test]
    fn load_caches_by_id() {
        let cache = SchemaCache::new();
        let first = cache.load(&schema("a")).unwrap();
        let second = cache.load(&schema("a")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.load(&schema("b")).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("b", 2)).is_some());
    }

    #[test]
    fn documents_without_id_are_not_cached() {
        let cache = SchemaCache::new();
        let mut doc = schema("a");
        doc.as_object_mut().unwrap().remove("$id");
        cache.load(&doc).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = SchemaCache::new();
        let bad = json!({ "$id": "bad", "type": "object" });
        assert!(cache.load(&bad).is_err());
        assert!(cache.get(&CacheKey::new("bad", 2)).is_none());
        assert!(cache.is_empty());

        let compiled = cache
            .get_or_compile(CacheKey::new("bad", 2), |options| {
                compile_value(&schema("bad"), options)
            })
            .unwrap();
        assert_eq!(compiled.id(), Some("bad"));
    }

    #[test]
    fn compiles_once_under_concurrency() {
        let cache = SchemaCache::new();
        let compilations = AtomicUsize::new(0);
        let doc = schema("shared");

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let compiled = cache
                        .get_or_compile(CacheKey::new("shared", 2), |options| {
                            compilations.fetch_add(1, Ordering::SeqCst);
                            compile_value(&doc, options)
                        })
                        .unwrap();
                    assert_eq!(compiled.rules().len(), 1);
                });
            }
        });

        assert_eq!(compilations.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }
}
