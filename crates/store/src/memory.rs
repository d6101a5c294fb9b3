use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{Collection, DocumentStore, StoreError};

/// In-memory [`DocumentStore`] used by dev runs and tests.
///
/// Implements the same equality-match query semantics and the aggregation
/// subset the handlers rely on. Concurrent readers are never serialized
/// against each other; writers take the lock exclusively.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Collection, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(doc: &Value, query: &Map<String, Value>) -> bool {
    for (key, want) in query {
        if key == "$text" {
            let term = want
                .get("$search")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            let hit = doc.as_object().is_some_and(|fields| {
                fields
                    .values()
                    .filter_map(Value::as_str)
                    .any(|v| v.to_lowercase().contains(&term))
            });
            if !hit {
                return false;
            }
            continue;
        }
        if doc.get(key) != Some(want) {
            return false;
        }
    }
    true
}

fn as_query(query: &Value) -> Map<String, Value> {
    query.as_object().cloned().unwrap_or_default()
}

fn apply_update(doc: &mut Value, update: &Value) {
    let patch = match update.get("$set") {
        Some(set) => set,
        None => update,
    };
    let (Some(fields), Some(patch)) = (doc.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in patch {
        if key == "_id" || key.starts_with('$') {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
}

/// Resolve a `$a.b.c` path reference against a document.
fn resolve_path(doc: &Value, path: &str) -> Value {
    let mut current = doc;
    for part in path.trim_start_matches('$').split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn apply_stage(docs: Vec<Value>, stage: &Map<String, Value>, all: &HashMap<Collection, Vec<Value>>) -> Vec<Value> {
    if let Some(query) = stage.get("$match") {
        let query = as_query(query);
        return docs.into_iter().filter(|d| matches(d, &query)).collect();
    }
    if let Some(n) = stage.get("$skip").and_then(Value::as_u64) {
        return docs.into_iter().skip(n as usize).collect();
    }
    if let Some(n) = stage.get("$limit").and_then(Value::as_u64) {
        return docs.into_iter().take(n as usize).collect();
    }
    if let Some(spec) = stage.get("$sort").and_then(Value::as_object) {
        let mut docs = docs;
        if let Some((field, dir)) = spec.iter().next() {
            let descending = dir.as_i64() == Some(-1);
            docs.sort_by(|a, b| {
                let (a, b) = (resolve_path(a, field), resolve_path(b, field));
                let ord = a.to_string().cmp(&b.to_string());
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        return docs;
    }
    if let Some(spec) = stage.get("$project").and_then(Value::as_object) {
        return docs
            .into_iter()
            .map(|doc| {
                let mut out = Map::new();
                for (key, rule) in spec {
                    match rule {
                        Value::String(path) if path.starts_with('$') => {
                            out.insert(key.clone(), resolve_path(&doc, path));
                        }
                        rule if rule.as_i64() == Some(1) || rule.as_bool() == Some(true) => {
                            if let Some(v) = doc.get(key) {
                                out.insert(key.clone(), v.clone());
                            }
                        }
                        _ => {}
                    }
                }
                Value::Object(out)
            })
            .collect();
    }
    if let Some(spec) = stage.get("$lookup").and_then(Value::as_object) {
        let from = spec.get("from").and_then(Value::as_str).unwrap_or_default();
        let local = spec.get("localField").and_then(Value::as_str).unwrap_or_default();
        let foreign = spec.get("foreignField").and_then(Value::as_str).unwrap_or_default();
        let alias = spec.get("as").and_then(Value::as_str).unwrap_or_default();
        let foreign_docs: Vec<Value> = all
            .iter()
            .find(|(c, _)| c.as_str() == from)
            .map(|(_, docs)| docs.clone())
            .unwrap_or_default();
        return docs
            .into_iter()
            .map(|mut doc| {
                let key = doc.get(local).cloned().unwrap_or(Value::Null);
                let joined: Vec<Value> = foreign_docs
                    .iter()
                    .filter(|f| f.get(foreign) == Some(&key))
                    .cloned()
                    .collect();
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert(alias.to_string(), Value::Array(joined));
                }
                doc
            })
            .collect();
    }
    if let Some(spec) = stage.get("$unwind") {
        let (path, preserve) = match spec {
            Value::String(p) => (p.as_str(), false),
            Value::Object(o) => (
                o.get("path").and_then(Value::as_str).unwrap_or_default(),
                o.get("preserveNullAndEmptyArrays").and_then(Value::as_bool).unwrap_or(false),
            ),
            _ => return docs,
        };
        let field = path.trim_start_matches('$').to_string();
        let mut out = Vec::new();
        for mut doc in docs {
            let items = doc.get(&field).and_then(Value::as_array).cloned().unwrap_or_default();
            if items.is_empty() {
                if preserve {
                    out.push(doc);
                }
                continue;
            }
            for item in items {
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert(field.clone(), item);
                }
                out.push(doc.clone());
            }
        }
        return out;
    }
    docs
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save(&self, collection: Collection, mut document: Value) -> Result<String, StoreError> {
        let id = document
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(fields) = document.as_object_mut() {
            fields.insert("_id".to_string(), Value::String(id.clone()));
        }
        self.inner.write().await.entry(collection).or_default().push(document);
        tracing::debug!(collection = %collection, %id, "document saved");
        Ok(id)
    }

    async fn find(&self, collection: Collection, query: Value) -> Result<Vec<Value>, StoreError> {
        let query = as_query(&query);
        let guard = self.inner.read().await;
        Ok(guard
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| matches(d, &query)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        collection: Collection,
        query: Value,
    ) -> Result<Option<Value>, StoreError> {
        let query = as_query(&query);
        let guard = self.inner.read().await;
        Ok(guard
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, &query)).cloned()))
    }

    async fn find_and_update(
        &self,
        collection: Collection,
        query: Value,
        update: Value,
    ) -> Result<Option<Value>, StoreError> {
        let query = as_query(&query);
        let mut guard = self.inner.write().await;
        let Some(docs) = guard.get_mut(&collection) else {
            return Ok(None);
        };
        for doc in docs.iter_mut() {
            if matches(doc, &query) {
                apply_update(doc, &update);
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find_one_and_delete(
        &self,
        collection: Collection,
        query: Value,
    ) -> Result<Option<Value>, StoreError> {
        let query = as_query(&query);
        let mut guard = self.inner.write().await;
        let Some(docs) = guard.get_mut(&collection) else {
            return Ok(None);
        };
        match docs.iter().position(|d| matches(d, &query)) {
            Some(idx) => Ok(Some(docs.remove(idx))),
            None => Ok(None),
        }
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let guard = self.inner.read().await;
        let mut docs = guard.get(&collection).cloned().unwrap_or_default();
        for stage in &pipeline {
            let Some(stage) = stage.as_object() else { continue };
            docs = apply_stage(docs, stage, &guard);
        }
        Ok(docs)
    }

    async fn create_index(&self, _collection: Collection, _keys: Value) -> Result<(), StoreError> {
        // Nothing to maintain; scans are exhaustive.
        Ok(())
    }
}
