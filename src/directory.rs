//! User and credential directory interface
//!
//! The directory is owned by the embedding application; the ceremonies see
//! it through this trait and never hold their own storage. Implementations
//! enforce their own uniqueness constraints. The ceremonies do not retry a
//! violated constraint; they surface it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One principal known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Opaque user handle, base64url. Fixed for the lifetime of the user.
    pub user_handle: String,
}

/// One registered credential belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Credential identifier, base64url. Unique across all users.
    pub credential_id: String,
    /// Public key in the encoding the verification engine emits (PEM)
    pub public_key: String,
    /// Authenticator model identifier, base64url
    pub aaguid: String,
    /// Signature counter recorded at the last successful ceremony
    pub signature_counter: u32,
}

/// Filter for user lookups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserFilter {
    pub username: Option<String>,
}

impl UserFilter {
    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }
}

/// Filter for credential lookups within one user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialFilter {
    pub credential_id: Option<String>,
}

impl CredentialFilter {
    /// Every credential the user has.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_credential_id(credential_id: impl Into<String>) -> Self {
        Self {
            credential_id: Some(credential_id.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("uniqueness constraint violated: {0}")]
    Constraint(String),

    /// The write was accepted but could not be made durable.
    #[error("commit failed: {0}")]
    Commit(String),
}

/// The externally-owned user/credential store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// All users matching `filter`. More than one hit for a unique key is a
    /// directory invariant violation; the ceremonies refuse to guess which
    /// row was meant.
    async fn find_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, DirectoryError>;

    /// Credentials registered to `username`, narrowed by `filter`.
    async fn find_credentials(
        &self,
        username: &str,
        filter: &CredentialFilter,
    ) -> Result<Vec<CredentialRecord>, DirectoryError>;

    /// Persist `user` (creating it if absent) and `credential` as one unit:
    /// after this returns Ok, both are visible to subsequent requests;
    /// after an Err, neither is.
    async fn commit_registration(
        &self,
        user: &UserRecord,
        credential: &CredentialRecord,
    ) -> Result<(), DirectoryError>;

    /// Overwrite the stored signature counter for one credential.
    async fn commit_counter(
        &self,
        username: &str,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), DirectoryError>;

    /// Remove one credential. Administrative surface; no ceremony calls it.
    async fn destroy_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<(), DirectoryError>;
}
