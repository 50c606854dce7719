//! Capability seams over the managed authentication/document backend.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shared::{domain::UserId, protocol::PersistedCredentials};
use tokio::sync::watch;

use crate::error::BackendError;

/// Field map of a single document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Identity issued by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthIdentity {
    pub uid: UserId,
    pub email: String,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError>;

    /// Creates an account. Like the hosted service, this also signs the new
    /// account in on *this* instance.
    async fn create_account(&self, email: &str, password: &str)
        -> Result<AuthIdentity, BackendError>;

    /// Signing out an instance that has no user is a no-op.
    async fn sign_out(&self) -> Result<(), BackendError>;

    fn current(&self) -> Option<AuthIdentity>;

    /// Auth-state notifications; the receiver starts at the current state.
    fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>>;

    /// A separate instance against the same backend whose sign-in state is
    /// in-memory only and independent of this one.
    fn isolated(&self) -> Arc<dyn AuthBackend>;

    /// Reloads a persisted session, publishing it to subscribers.
    async fn restore(&self) -> Result<Option<AuthIdentity>, BackendError> {
        Ok(self.current())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, BackendError>;

    /// Replaces the whole document.
    async fn write_document(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
    ) -> Result<(), BackendError>;
}

/// Local persistence for an auth instance's credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, instance: &str) -> Result<Option<PersistedCredentials>>;
    async fn save(&self, instance: &str, credentials: &PersistedCredentials) -> Result<()>;
    async fn clear(&self, instance: &str) -> Result<()>;
}

#[async_trait]
impl CredentialStore for storage::Storage {
    async fn load(&self, instance: &str) -> Result<Option<PersistedCredentials>> {
        self.load_credentials(instance).await
    }

    async fn save(&self, instance: &str, credentials: &PersistedCredentials) -> Result<()> {
        self.save_credentials(instance, credentials).await
    }

    async fn clear(&self, instance: &str) -> Result<()> {
        self.clear_credentials(instance).await.map(|_| ())
    }
}

/// Explicitly constructed handle to the backend, shared by the components
/// that need it.
#[derive(Clone)]
pub struct BackendClient {
    auth: Arc<dyn AuthBackend>,
    documents: Arc<dyn DocumentStore>,
}

impl BackendClient {
    pub fn new(auth: Arc<dyn AuthBackend>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { auth, documents }
    }

    pub fn auth(&self) -> &Arc<dyn AuthBackend> {
        &self.auth
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub async fn read_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, BackendError> {
        let Some(document) = self.documents.read_document(collection, key).await? else {
            return Ok(None);
        };
        serde_json::from_value(serde_json::Value::Object(document))
            .map(Some)
            .map_err(|err| BackendError::Decode(format!("{collection}/{key}: {err}")))
    }

    pub async fn write_record<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        record: &T,
    ) -> Result<(), BackendError> {
        let fields = match serde_json::to_value(record) {
            Ok(serde_json::Value::Object(fields)) => fields,
            Ok(other) => {
                return Err(BackendError::Decode(format!(
                    "{collection}/{key}: record must serialize to an object, got {other}"
                )))
            }
            Err(err) => return Err(BackendError::Decode(format!("{collection}/{key}: {err}"))),
        };
        self.documents.write_document(collection, key, fields).await
    }
}
