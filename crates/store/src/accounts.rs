use std::sync::Arc;

use async_trait::async_trait;
use kejani_auth::RoleSet;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::document::{Collection, DocumentStore, StoreError};

/// Account record as the gate and the handlers see it.
///
/// The bcrypt hash is carried for credential checks but never serialized, so
/// a resolved account can be echoed into payloads without leaking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default, rename = "password", skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default, rename = "addedBy")]
    pub added_by: Option<String>,
    #[serde(default, rename = "addedOn")]
    pub added_on: Option<i64>,
}

/// Subject-to-account resolution, the only storage dependency of the gate.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
}

/// [`AccountStore`] backed by the shared [`DocumentStore`] handle.
pub struct Accounts {
    store: Arc<dyn DocumentStore>,
}

impl Accounts {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccountStore for Accounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let doc = self
            .store
            .find_one(Collection::AppUsers, json!({ "email": email }))
            .await?;
        match doc {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    collection: Collection::AppUsers.as_str(),
                    detail: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_account_without_exposing_password() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(
                Collection::AppUsers,
                json!({
                    "email": "jane@kejani.io",
                    "username": "jane",
                    "verified": true,
                    "roles": {"user": true, "admin": true},
                    "password": "$2b$12$abcdefghijklmnopqrstuv"
                }),
            )
            .await
            .unwrap();

        let accounts = Accounts::new(store);
        let account = accounts.find_by_email("jane@kejani.io").await.unwrap().unwrap();
        assert!(account.verified);
        assert!(account.roles.satisfies("admin"));
        assert!(serde_json::to_string(&account).unwrap().find("$2b$").is_none());
    }

    #[tokio::test]
    async fn unknown_email_resolves_to_none() {
        let accounts = Accounts::new(Arc::new(MemoryStore::new()));
        assert!(accounts.find_by_email("ghost@kejani.io").await.unwrap().is_none());
    }
}
