use super::*;
use crate::{
    backend::{AuthBackend, Document, DocumentStore},
    memory::{InMemoryBackend, InMemoryDocuments},
};
use serde_json::json;
use shared::protocol::USERS_COLLECTION;
use std::time::Duration;
use tokio::{sync::Notify, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

async fn seed_user(backend: &InMemoryBackend, email: &str, role: &str) -> AuthIdentity {
    let identity = backend.auth.seed_account(email, "secret1").await;
    backend
        .client()
        .write_record(
            USERS_COLLECTION,
            identity.uid.as_str(),
            &json!({ "name": email, "role": role }),
        )
        .await
        .expect("seed profile");
    identity
}

async fn started(backend: &InMemoryBackend) -> Arc<SessionStore> {
    let store = SessionStore::start(backend.client()).await;
    timeout(WAIT, store.settled()).await.expect("initial settle");
    store
}

#[tokio::test]
async fn starts_loading_then_settles_signed_out() {
    assert_eq!(select_route(&Session::starting()), Route::Loading);

    let backend = InMemoryBackend::new();
    let store = started(&backend).await;
    let session = store.snapshot();
    assert!(!session.loading);
    assert!(!session.is_signed_in());
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn admin_sign_in_resolves_profile_and_selects_admin_graph() {
    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;

    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");
    let session = timeout(WAIT, store.settled_as(&admin.uid))
        .await
        .expect("settle");

    assert_eq!(session.role(), Some(Role::Admin));
    assert_eq!(session.profile().map(|p| p.name.as_str()), Some("coach@example.com"));
    assert_eq!(store.route(), Route::Admin);
}

#[tokio::test]
async fn student_sign_in_selects_student_graph() {
    let backend = InMemoryBackend::new();
    let student = seed_user(&backend, "ana@example.com", "student").await;
    let store = started(&backend).await;

    store
        .sign_in("ana@example.com", "secret1")
        .await
        .expect("sign in");
    timeout(WAIT, store.settled_as(&student.uid))
        .await
        .expect("settle");
    assert_eq!(store.route(), Route::Student);
}

#[tokio::test]
async fn failed_sign_in_leaves_session_untouched() {
    let backend = InMemoryBackend::new();
    seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;
    let before = store.snapshot();

    let err = store
        .sign_in("coach@example.com", "not-the-password")
        .await
        .expect_err("bad password");
    assert_eq!(err, BackendError::InvalidCredentials);

    tokio::task::yield_now().await;
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn sign_out_clears_identity_and_returns_to_auth_graph() {
    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;
    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");
    timeout(WAIT, store.settled_as(&admin.uid))
        .await
        .expect("settle");

    store.sign_out().await.expect("sign out");

    let session = store.snapshot();
    assert!(session.identity.is_none());
    assert_eq!(session.profile, ProfileState::Unresolved);
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn sign_out_twice_is_not_an_error() {
    let backend = InMemoryBackend::new();
    seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;
    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");

    store.sign_out().await.expect("first sign out");
    store.sign_out().await.expect("second sign out");
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn identity_without_profile_routes_to_profile_error() {
    let backend = InMemoryBackend::new();
    let orphan = backend.auth.seed_account("orphan@example.com", "secret1").await;
    let store = started(&backend).await;

    store
        .sign_in("orphan@example.com", "secret1")
        .await
        .expect("sign in");
    let session = timeout(WAIT, store.settled_as(&orphan.uid))
        .await
        .expect("settle");

    assert_eq!(
        session.profile,
        ProfileState::Failed(ProfileError::NotFound(orphan.uid.clone()))
    );
    assert!(session.is_signed_in());
    assert_eq!(store.route(), Route::ProfileError);

    store.sign_out().await.expect("sign out");
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn unknown_role_routes_to_profile_error() {
    let backend = InMemoryBackend::new();
    let coach = seed_user(&backend, "odd@example.com", "coach").await;
    let store = started(&backend).await;

    store
        .sign_in("odd@example.com", "secret1")
        .await
        .expect("sign in");
    let session = timeout(WAIT, store.settled_as(&coach.uid))
        .await
        .expect("settle");
    assert!(matches!(
        session.profile,
        ProfileState::Failed(ProfileError::UnknownRole { .. })
    ));
    assert_eq!(store.route(), Route::ProfileError);
}

#[tokio::test]
async fn profile_read_failure_is_recorded_not_propagated() {
    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;
    backend.documents.set_available(false);

    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("credentials still verify");
    let session = timeout(WAIT, store.settled_as(&admin.uid))
        .await
        .expect("settle");
    assert!(matches!(
        session.profile,
        ProfileState::Failed(ProfileError::Backend(BackendError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn session_restored_from_already_signed_in_backend() {
    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    backend
        .auth
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in before start");

    let store = SessionStore::start(backend.client()).await;
    let session = timeout(WAIT, store.settled_as(&admin.uid))
        .await
        .expect("settle");
    assert_eq!(session.role(), Some(Role::Admin));
}

#[tokio::test]
async fn shutdown_stops_following_auth_changes() {
    let backend = InMemoryBackend::new();
    seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;

    store.shutdown();
    tokio::task::yield_now().await;
    backend
        .auth
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!store.snapshot().is_signed_in());
    assert_eq!(store.route(), Route::Auth);
}

#[tokio::test]
async fn change_stream_reports_route_transitions() {
    use futures::StreamExt;

    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    let store = started(&backend).await;
    let mut changes = store.changes();

    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");

    let reached_admin = timeout(WAIT, async {
        while let Some(session) = changes.next().await {
            if select_route(&session) == Route::Admin {
                return session;
            }
        }
        panic!("session stream ended");
    })
    .await
    .expect("admin route observed");
    assert_eq!(reached_admin.identity.map(|id| id.uid), Some(admin.uid));
}

/// Holds every profile read until the test releases it.
struct GatedDocuments {
    inner: Arc<InMemoryDocuments>,
    gate: Arc<Notify>,
}

#[async_trait::async_trait]
impl DocumentStore for GatedDocuments {
    async fn read_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, BackendError> {
        self.gate.notified().await;
        self.inner.read_document(collection, key).await
    }

    async fn write_document(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
    ) -> Result<(), BackendError> {
        self.inner.write_document(collection, key, fields).await
    }
}

async fn gated_store(backend: &InMemoryBackend) -> (Arc<SessionStore>, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let documents = Arc::new(GatedDocuments {
        inner: Arc::clone(&backend.documents),
        gate: Arc::clone(&gate),
    });
    let store = SessionStore::start(BackendClient::new(backend.auth.clone(), documents)).await;
    timeout(WAIT, store.settled()).await.expect("initial settle");
    (store, gate)
}

#[tokio::test]
async fn session_stays_loading_while_profile_read_is_outstanding() {
    let backend = InMemoryBackend::new();
    let admin = seed_user(&backend, "coach@example.com", "admin").await;
    let (store, gate) = gated_store(&backend).await;

    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");
    let pending = timeout(WAIT, store.wait_for(|s| s.is_signed_in() && s.loading))
        .await
        .expect("profile read pending");
    assert_eq!(pending.profile, ProfileState::Unresolved);
    assert_eq!(store.route(), Route::Loading);

    gate.notify_one();
    timeout(WAIT, store.settled_as(&admin.uid))
        .await
        .expect("settle");
    assert_eq!(store.route(), Route::Admin);
}

#[tokio::test]
async fn profile_arriving_after_sign_out_is_discarded() {
    let backend = InMemoryBackend::new();
    seed_user(&backend, "coach@example.com", "admin").await;
    let (store, gate) = gated_store(&backend).await;

    store
        .sign_in("coach@example.com", "secret1")
        .await
        .expect("sign in");
    timeout(WAIT, store.wait_for(|s| s.is_signed_in() && s.loading))
        .await
        .expect("profile read pending");

    store.sign_out().await.expect("sign out");
    assert_eq!(store.route(), Route::Auth);

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = store.snapshot();
    assert!(!session.is_signed_in());
    assert_eq!(session.profile, ProfileState::Unresolved);
    assert!(!session.loading);
    assert_eq!(store.route(), Route::Auth);
}
