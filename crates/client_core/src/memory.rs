//! In-process backend used by tests and the offline demo.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use shared::domain::UserId;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use crate::{
    backend::{AuthBackend, AuthIdentity, BackendClient, Document, DocumentStore},
    error::BackendError,
};

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    uid: UserId,
    email: String,
    password: String,
    disabled: bool,
}

#[derive(Default)]
struct AccountDirectory {
    by_email: HashMap<String, Account>,
}

/// Auth instance backed by an account directory shared with every instance
/// derived through [`AuthBackend::isolated`].
pub struct InMemoryAuth {
    directory: Arc<Mutex<AccountDirectory>>,
    state: watch::Sender<Option<AuthIdentity>>,
}

impl InMemoryAuth {
    pub fn new() -> Self {
        Self::with_directory(Arc::new(Mutex::new(AccountDirectory::default())))
    }

    fn with_directory(directory: Arc<Mutex<AccountDirectory>>) -> Self {
        let (state, _) = watch::channel(None);
        Self { directory, state }
    }

    /// Registers an account without touching this instance's sign-in state.
    pub async fn seed_account(&self, email: &str, password: &str) -> AuthIdentity {
        let mut directory = self.directory.lock().await;
        let key = email.trim().to_ascii_lowercase();
        let account = directory.by_email.entry(key).or_insert_with(|| Account {
            uid: UserId(uuid::Uuid::new_v4().simple().to_string()),
            email: email.trim().to_string(),
            password: password.to_string(),
            disabled: false,
        });
        account.password = password.to_string();
        AuthIdentity {
            uid: account.uid.clone(),
            email: account.email.clone(),
        }
    }

    pub async fn disable_account(&self, email: &str) -> bool {
        let mut directory = self.directory.lock().await;
        match directory.by_email.get_mut(&email.trim().to_ascii_lowercase()) {
            Some(account) => {
                account.disabled = true;
                true
            }
            None => false,
        }
    }

    pub async fn account_count(&self) -> usize {
        self.directory.lock().await.by_email.len()
    }

    fn publish(&self, identity: Option<AuthIdentity>) {
        self.state.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[async_trait]
impl AuthBackend for InMemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(BackendError::InvalidEmail);
        }
        let identity = {
            let directory = self.directory.lock().await;
            let account = directory
                .by_email
                .get(&email.to_ascii_lowercase())
                .filter(|account| account.password == password)
                .ok_or(BackendError::InvalidCredentials)?;
            if account.disabled {
                return Err(BackendError::UserDisabled);
            }
            AuthIdentity {
                uid: account.uid.clone(),
                email: account.email.clone(),
            }
        };
        debug!(uid = %identity.uid, "memory auth: signed in");
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, BackendError> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(BackendError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::WeakPassword);
        }
        let identity = {
            let mut directory = self.directory.lock().await;
            let key = email.to_ascii_lowercase();
            if directory.by_email.contains_key(&key) {
                return Err(BackendError::EmailAlreadyInUse);
            }
            let account = Account {
                uid: UserId(uuid::Uuid::new_v4().simple().to_string()),
                email: email.to_string(),
                password: password.to_string(),
                disabled: false,
            };
            let identity = AuthIdentity {
                uid: account.uid.clone(),
                email: account.email.clone(),
            };
            directory.by_email.insert(key, account);
            identity
        };
        debug!(uid = %identity.uid, "memory auth: account created");
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.publish(None);
        Ok(())
    }

    fn current(&self) -> Option<AuthIdentity> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.state.subscribe()
    }

    fn isolated(&self) -> Arc<dyn AuthBackend> {
        Arc::new(Self::with_directory(Arc::clone(&self.directory)))
    }
}

/// Document store keyed by `(collection, key)`.
pub struct InMemoryDocuments {
    documents: RwLock<HashMap<(String, String), Document>>,
    available: AtomicBool,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable every call fails with [`BackendError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn document_count(&self, collection: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(name, _)| name == collection)
            .count()
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(
                "document store is offline".to_string(),
            ))
        }
    }
}

impl Default for InMemoryDocuments {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocuments {
    async fn read_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, BackendError> {
        self.ensure_available()?;
        Ok(self
            .documents
            .read()
            .await
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn write_document(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
    ) -> Result<(), BackendError> {
        self.ensure_available()?;
        self.documents
            .write()
            .await
            .insert((collection.to_string(), key.to_string()), fields);
        Ok(())
    }
}

/// Both halves of an in-process backend, kept concrete so callers can seed
/// accounts and documents.
#[derive(Clone)]
pub struct InMemoryBackend {
    pub auth: Arc<InMemoryAuth>,
    pub documents: Arc<InMemoryDocuments>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            auth: Arc::new(InMemoryAuth::new()),
            documents: Arc::new(InMemoryDocuments::new()),
        }
    }

    pub fn client(&self) -> BackendClient {
        BackendClient::new(self.auth.clone(), self.documents.clone())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
