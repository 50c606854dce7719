//! Session store: tracks the authenticated identity and its resolved profile,
//! driven by the auth backend's state notifications.

use std::sync::{Arc, Mutex as StdMutex};

use shared::domain::{Profile, Role, UserId};
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};

use crate::{
    backend::{AuthIdentity, BackendClient},
    error::BackendError,
    profile::{ProfileError, ProfileFetcher},
    route::{select_route, Route},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    Unresolved,
    Resolved(Profile),
    Failed(ProfileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<AuthIdentity>,
    pub profile: ProfileState,
    pub loading: bool,
}

impl Session {
    /// State at process start, before the first auth notification.
    pub fn starting() -> Self {
        Self {
            identity: None,
            profile: ProfileState::Unresolved,
            loading: true,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn profile(&self) -> Option<&Profile> {
        match &self.profile {
            ProfileState::Resolved(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile().map(|profile| profile.role)
    }

    pub fn is_admin(&self) -> bool {
        self.is_signed_in() && self.role() == Some(Role::Admin)
    }

    fn clear(&mut self) {
        self.identity = None;
        self.profile = ProfileState::Unresolved;
        self.loading = false;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::starting()
    }
}

pub struct SessionStore {
    client: BackendClient,
    state: Arc<watch::Sender<Session>>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Restores any persisted sign-in, then subscribes to auth-state changes
    /// for as long as the store lives. Must run inside a tokio runtime.
    pub async fn start(client: BackendClient) -> Arc<Self> {
        if let Err(err) = client.auth().restore().await {
            warn!(error = %err, "session: failed to restore persisted sign-in");
        }

        let (state, _) = watch::channel(Session::starting());
        let state = Arc::new(state);
        let auth_rx = client.auth().subscribe();
        let listener = tokio::spawn(run_listener(
            ProfileFetcher::new(client.clone()),
            auth_rx,
            Arc::clone(&state),
        ));

        Arc::new(Self {
            client,
            state,
            listener: StdMutex::new(Some(listener)),
        })
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn route(&self) -> Route {
        select_route(&self.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn changes(&self) -> WatchStream<Session> {
        WatchStream::new(self.state.subscribe())
    }

    /// Waits for the first snapshot matching `predicate`.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&Session) -> bool) -> Session {
        let mut rx = self.state.subscribe();
        let session = match rx.wait_for(|session| predicate(session)).await {
            Ok(session) => session.clone(),
            // The sender lives as long as `self`, so this only happens during
            // teardown; report whatever is current.
            Err(_) => self.snapshot(),
        };
        session
    }

    /// Waits until neither the auth state nor a profile read is pending.
    pub async fn settled(&self) -> Session {
        self.wait_for(|session| select_route(session) != Route::Loading)
            .await
    }

    /// Like [`settled`](Self::settled), but also waits for `uid` to be the
    /// session's identity.
    pub async fn settled_as(&self, uid: &UserId) -> Session {
        self.wait_for(|session| {
            session.identity.as_ref().map(|identity| &identity.uid) == Some(uid)
                && select_route(session) != Route::Loading
        })
        .await
    }

    /// Verifies credentials with the backend. The session itself changes only
    /// when the resulting auth notification is processed.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError> {
        match self.client.auth().sign_in(email, password).await {
            Ok(identity) => {
                info!(uid = %identity.uid, "session: credentials accepted");
                Ok(identity)
            }
            Err(err) => {
                error!(error = %err, code = ?err.code(), "session: sign-in failed");
                Err(err)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.client.auth().sign_out().await?;
        self.state.send_modify(Session::clear);
        info!("session: signed out");
        Ok(())
    }

    /// Stops listening for auth-state changes.
    pub fn shutdown(&self) {
        let handle = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_listener(
    profiles: ProfileFetcher,
    mut auth_rx: watch::Receiver<Option<AuthIdentity>>,
    state: Arc<watch::Sender<Session>>,
) {
    loop {
        let identity = auth_rx.borrow_and_update().clone();
        apply_auth_change(&profiles, &state, identity).await;
        if auth_rx.changed().await.is_err() {
            break;
        }
    }
}

async fn apply_auth_change(
    profiles: &ProfileFetcher,
    state: &watch::Sender<Session>,
    identity: Option<AuthIdentity>,
) {
    let Some(identity) = identity else {
        state.send_modify(Session::clear);
        return;
    };

    state.send_modify(|session| {
        session.identity = Some(identity.clone());
        session.profile = ProfileState::Unresolved;
        session.loading = true;
    });

    let profile = match profiles.fetch(&identity.uid).await {
        Ok(profile) => {
            info!(uid = %identity.uid, role = %profile.role, "session: profile resolved");
            ProfileState::Resolved(profile)
        }
        Err(err) => {
            warn!(uid = %identity.uid, error = %err, "session: profile unavailable; sign-out required");
            ProfileState::Failed(err)
        }
    };

    // A sign-out may have landed while the read was outstanding.
    let applied = state.send_if_modified(|session| {
        if session.identity.as_ref() != Some(&identity) {
            return false;
        }
        session.profile = profile;
        session.loading = false;
        true
    });
    if !applied {
        info!(uid = %identity.uid, "session: discarded profile for stale identity");
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
