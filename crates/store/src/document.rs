use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Collections the service reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    AppUsers,
    Sessions,
    ActivationCodes,
    ResetCodes,
    Houses,
    Tenants,
    Payments,
    Tasks,
    Communications,
    Callbacks,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::AppUsers => "app_users",
            Collection::Sessions => "sessions",
            Collection::ActivationCodes => "activation_codes",
            Collection::ResetCodes => "reset_codes",
            Collection::Houses => "houses",
            Collection::Tenants => "tenants",
            Collection::Payments => "payments",
            Collection::Tasks => "tasks",
            Collection::Communications => "communications",
            Collection::Callbacks => "callbacks",
        }
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed (connection, timeout, engine error).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored document could not be decoded into the expected shape.
    #[error("malformed document in {collection}: {detail}")]
    Malformed { collection: &'static str, detail: String },
}

/// Document-database contract consumed by the handlers and the request gate.
///
/// Queries are equality matches over the given object's fields. Updates accept
/// either a `{"$set": {...}}` document or a plain object merged into the
/// match. Implementations must support concurrent lookups without serializing
/// unrelated requests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, assigning an `_id` when absent. Returns the id.
    async fn save(&self, collection: Collection, document: Value) -> Result<String, StoreError>;

    async fn find(&self, collection: Collection, query: Value) -> Result<Vec<Value>, StoreError>;

    async fn find_one(
        &self,
        collection: Collection,
        query: Value,
    ) -> Result<Option<Value>, StoreError>;

    /// Update the first match; returns the updated document when one existed.
    async fn find_and_update(
        &self,
        collection: Collection,
        query: Value,
        update: Value,
    ) -> Result<Option<Value>, StoreError>;

    /// Delete the first match; returns the removed document when one existed.
    async fn find_one_and_delete(
        &self,
        collection: Collection,
        query: Value,
    ) -> Result<Option<Value>, StoreError>;

    /// Run an aggregation pipeline ($match/$skip/$limit/$sort/$project/
    /// $lookup/$unwind subset).
    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Ensure an index over the given keys exists. Advisory for engines that
    /// do not need one.
    async fn create_index(&self, collection: Collection, keys: Value) -> Result<(), StoreError>;
}
