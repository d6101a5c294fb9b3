use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named boolean capabilities attached to an account, e.g.
/// `{"user": true, "admin": true}`.
///
/// `satisfies` is a direct membership check: a role counts only when it is
/// present and mapped to `true`. In particular an empty map grants nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeMap<String, bool>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: impl Into<String>) -> Self {
        self.0.insert(role.into(), true);
        self
    }

    pub fn revoke(&mut self, role: &str) {
        self.0.insert(role.to_string(), false);
    }

    /// True iff `required` is present and mapped to `true`.
    pub fn satisfies(&self, required: &str) -> bool {
        self.0.get(required).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|r| (r.into(), true)).collect())
    }
}
