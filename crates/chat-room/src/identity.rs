//! User identity records.
//!
//! A [`User`] is the account-level identity behind a connection. It is
//! loaded by an external directory and consumed here, never mutated.
//! The credential hash is wrapped in [`SecretString`] so any `Debug`
//! output redacts it.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Account kind as stored in the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Member,
    Service,
}

/// An account identity. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct User {
    id: String,
    name: String,
    credential_hash: Option<SecretString>,
    kind: AccountKind,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            credential_hash: None,
            kind,
        }
    }

    /// Attach the stored credential hash (directory records carry one;
    /// token-admitted identities do not).
    #[must_use]
    pub fn with_credential_hash(mut self, hash: SecretString) -> Self {
        self.credential_hash = Some(hash);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> AccountKind {
        self.kind
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credential_hash() {
        let user = User::new("u-1", "alice", AccountKind::Member)
            .with_credential_hash(SecretString::from("$2b$12$abcdefg"));

        let debug = format!("{user:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("$2b$12$abcdefg"));
    }

    #[test]
    fn test_account_kind_tags() {
        assert_eq!(
            serde_json::to_string(&AccountKind::Member).unwrap(),
            "\"member\""
        );
        assert_eq!(
            serde_json::to_string(&AccountKind::Service).unwrap(),
            "\"service\""
        );
    }
}
