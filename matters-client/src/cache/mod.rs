//! Normalized response cache.
//!
//! Objects carrying a `__typename` and an `id` (or `_id`) are stored once under
//! `Type:id` and referenced as `{"__ref": "Type:id"}` everywhere they appear.
//! Writing the same entity again merges its fields over the stored ones.
//!
//! Optimistic writes go to named layers stacked over the base store. A layer
//! is either committed, replaced by the real result, or rolled back; readers
//! see the base merged with every live layer.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json_bytes::ByteString;

use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;

mod possible_types;

pub use self::possible_types::PossibleTypes;

pub const ROOT_QUERY: &str = "ROOT_QUERY";
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";

const TYPENAME: &str = "__typename";
const REFERENCE: &str = "__ref";

/// The root an operation result is written under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootType {
    Query,
    Mutation,
}

impl RootType {
    pub fn key(&self) -> &'static str {
        match self {
            RootType::Query => ROOT_QUERY,
            RootType::Mutation => ROOT_MUTATION,
        }
    }

    fn typename(&self) -> &'static str {
        match self {
            RootType::Query => "Query",
            RootType::Mutation => "Mutation",
        }
    }
}

type Entities = IndexMap<String, Object>;

#[derive(Debug)]
struct OptimisticLayer {
    id: String,
    entities: Entities,
}

#[derive(Debug, Default)]
struct Store {
    base: Entities,
    layers: Vec<OptimisticLayer>,
}

impl Store {
    /// The entity as currently visible: base fields with every layer merged over.
    fn entity(&self, key: &str) -> Option<Object> {
        let mut merged = self.base.get(key).cloned();
        for layer in &self.layers {
            if let Some(fields) = layer.entities.get(key) {
                merge_fields(merged.get_or_insert_with(Object::new), fields.clone());
            }
        }
        merged
    }

    fn resolve(&self, value: &Value, visiting: &mut Vec<String>) -> Value {
        match value {
            Value::Object(object) => match reference(object) {
                Some(key) if visiting.iter().any(|visited| visited == key) => value.clone(),
                Some(key) => match self.entity(key) {
                    Some(entity) => {
                        visiting.push(key.to_string());
                        let resolved = self.resolve_object(&entity, visiting);
                        visiting.pop();
                        resolved
                    }
                    None => Value::Null,
                },
                None => self.resolve_object(object, visiting),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve(item, visiting))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_object(&self, object: &Object, visiting: &mut Vec<String>) -> Value {
        Value::Object(
            object
                .iter()
                .map(|(field, value)| (field.clone(), self.resolve(value, visiting)))
                .collect(),
        )
    }
}

/// The client-side cache of normalized entities.
#[derive(Debug)]
pub struct NormalizedCache {
    possible_types: PossibleTypes,
    store: RwLock<Store>,
    accessed: AtomicBool,
}

impl Default for NormalizedCache {
    fn default() -> Self {
        Self::new(PossibleTypes::default())
    }
}

impl NormalizedCache {
    pub fn new(possible_types: PossibleTypes) -> Self {
        Self {
            possible_types,
            store: RwLock::new(Store::default()),
            accessed: AtomicBool::new(false),
        }
    }

    pub fn possible_types(&self) -> &PossibleTypes {
        &self.possible_types
    }

    /// Replace the contents with a snapshot taken by [`NormalizedCache::extract`],
    /// typically on the server. `null` restores an empty cache.
    ///
    /// Fails once the cache has been read or written.
    pub fn restore(&self, snapshot: Value) -> Result<(), CacheError> {
        let entities = match snapshot {
            Value::Null => Entities::new(),
            Value::Object(object) => object
                .into_iter()
                .map(|(key, entity)| match entity {
                    Value::Object(fields) => Ok((key.as_str().to_string(), fields)),
                    other => Err(CacheError::invalid_snapshot(&other)),
                })
                .collect::<Result<_, _>>()?,
            other => return Err(CacheError::invalid_snapshot(&other)),
        };

        let mut store = self.store.write();
        if self.accessed.load(Ordering::Acquire) {
            return Err(CacheError::RestoreAfterAccess);
        }
        tracing::debug!(entities = entities.len(), "restoring cache snapshot");
        store.base = entities;
        Ok(())
    }

    /// A snapshot of the base store, without optimistic layers.
    pub fn extract(&self) -> Value {
        self.mark_accessed();
        let store = self.store.read();
        Value::Object(
            store
                .base
                .iter()
                .map(|(key, fields)| (ByteString::from(key.as_str()), Value::Object(fields.clone())))
                .collect(),
        )
    }

    /// Normalize `data` into the store. Returns the keys written, root first.
    pub fn write_result(&self, root: RootType, data: &Value) -> Vec<String> {
        self.mark_accessed();
        let mut store = self.store.write();
        write_root(&mut store.base, root, data)
    }

    /// Write `data` to a new optimistic layer named `id`, replacing any layer
    /// with that name.
    pub fn record_optimistic(&self, id: &str, root: RootType, data: &Value) -> Vec<String> {
        self.mark_accessed();
        let mut layer = OptimisticLayer {
            id: id.to_string(),
            entities: Entities::new(),
        };
        let written = write_root(&mut layer.entities, root, data);

        let mut store = self.store.write();
        store.layers.retain(|layer| layer.id != id);
        store.layers.push(layer);
        written
    }

    /// Drop the optimistic layer `id` and write the real result to the base
    /// store, atomically for readers.
    pub fn commit_optimistic(&self, id: &str, root: RootType, data: &Value) -> Vec<String> {
        self.mark_accessed();
        let mut store = self.store.write();
        let before = store.layers.len();
        store.layers.retain(|layer| layer.id != id);
        if store.layers.len() == before {
            tracing::debug!(layer = id, "committing a result without optimistic layer");
        }
        write_root(&mut store.base, root, data)
    }

    /// Drop the optimistic layer `id`, leaving the base store untouched.
    pub fn rollback_optimistic(&self, id: &str) -> Result<(), CacheError> {
        let mut store = self.store.write();
        let before = store.layers.len();
        store.layers.retain(|layer| layer.id != id);
        if store.layers.len() == before {
            return Err(CacheError::UnknownOptimisticLayer(id.to_string()));
        }
        Ok(())
    }

    pub fn optimistic_layers(&self) -> usize {
        self.store.read().layers.len()
    }

    /// The stored fields of one entity, optimistic layers included.
    pub fn read_entity(&self, key: &str) -> Option<Object> {
        self.mark_accessed();
        self.store.read().entity(key)
    }

    /// An entity with its references resolved, if its type matches a fragment
    /// on `type_condition`.
    pub fn read_fragment(&self, key: &str, type_condition: &str) -> Option<Value> {
        self.mark_accessed();
        let store = self.store.read();
        let entity = store.entity(key)?;
        let typename = entity.get(TYPENAME).and_then(Value::as_str)?;
        if !self.possible_types.satisfies(typename, type_condition) {
            return None;
        }
        let mut visiting = vec![key.to_string()];
        Some(store.resolve_object(&entity, &mut visiting))
    }

    /// Everything known under a root, with references resolved.
    pub fn read_root(&self, root: RootType) -> Option<Value> {
        self.mark_accessed();
        let store = self.store.read();
        store.entity(root.key())?;
        Some(store.resolve(&reference_to(root.key()), &mut Vec::new()))
    }

    /// Replace every reference in `value` by the entity it points to.
    ///
    /// Dangling references resolve to `null`. A reference back to an entity
    /// being resolved is left as is.
    pub fn resolve(&self, value: &Value) -> Value {
        self.mark_accessed();
        self.store.read().resolve(value, &mut Vec::new())
    }

    /// Number of entities in the base store.
    pub fn len(&self) -> usize {
        self.store.read().base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mark_accessed(&self) {
        self.accessed.store(true, Ordering::Release);
    }
}

fn write_root(entities: &mut Entities, root: RootType, data: &Value) -> Vec<String> {
    let Some(object) = data.as_object() else {
        return Vec::new();
    };
    entities
        .entry(root.key().to_string())
        .or_default()
        .entry(TYPENAME)
        .or_insert(Value::String(root.typename().into()));

    let mut written = vec![root.key().to_string()];
    let mut fields = Object::new();
    for (field, value) in object {
        fields.insert(field.clone(), normalize(value, entities, &mut written));
    }
    if let Some(entity) = entities.get_mut(root.key()) {
        merge_fields(entity, fields);
    }
    written
}

fn normalize(value: &Value, entities: &mut Entities, written: &mut Vec<String>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize(item, entities, written))
                .collect(),
        ),
        Value::Object(object) => {
            let fields: Object = object
                .iter()
                .map(|(field, value)| (field.clone(), normalize(value, entities, written)))
                .collect();
            match entity_key(object) {
                Some(key) => {
                    merge_fields(entities.entry(key.clone()).or_default(), fields);
                    let reference = reference_to(&key);
                    if !written.contains(&key) {
                        written.push(key);
                    }
                    reference
                }
                None => Value::Object(fields),
            }
        }
        other => other.clone(),
    }
}

/// `Type:id` for objects that can be normalized.
fn entity_key(object: &Object) -> Option<String> {
    let typename = object.get(TYPENAME)?.as_str()?;
    let id = object.get("id").or_else(|| object.get("_id"))?;
    let id = match id {
        Value::String(id) => id.as_str().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    Some(format!("{typename}:{id}"))
}

fn reference(object: &Object) -> Option<&str> {
    if object.len() != 1 {
        return None;
    }
    object.get(REFERENCE)?.as_str()
}

fn reference_to(key: &str) -> Value {
    let mut object = Object::new();
    object.insert(REFERENCE, Value::String(key.into()));
    Value::Object(object)
}

/// Field-level merge: incoming fields replace stored ones, others are kept.
fn merge_fields(target: &mut Object, fields: Object) {
    for (field, value) in fields {
        target.insert(field, value);
    }
}

#[cfg(test)]
mod tests;
