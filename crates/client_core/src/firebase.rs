//! REST client for the hosted Firebase Authentication (Identity Toolkit) and
//! Cloud Firestore services.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{domain::UserId, protocol::PersistedCredentials};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    backend::{AuthBackend, AuthIdentity, BackendClient, CredentialStore, Document, DocumentStore},
    error::BackendError,
};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com";
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
pub const PRIMARY_INSTANCE: &str = "primary";
/// Id tokens are refreshed this long before they actually expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub auth_base_url: String,
    pub token_base_url: String,
    pub firestore_base_url: String,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            token_base_url: DEFAULT_TOKEN_BASE_URL.to_string(),
            firestore_base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
        }
    }

    /// Endpoints of the local Firebase emulator suite (auth on 9099,
    /// firestore on 8080).
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Self {
        Self {
            api_key: "emulator".to_string(),
            project_id: project_id.into(),
            auth_base_url: format!("http://{host}:9099/identitytoolkit.googleapis.com"),
            token_base_url: format!("http://{host}:9099/securetoken.googleapis.com"),
            firestore_base_url: format!("http://{host}:8080"),
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoints {
    auth: Url,
    token: Url,
    firestore: Url,
}

fn parse_base(label: &str, raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid {label} base url '{raw}'"))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("{label} base url '{raw}' cannot carry a path"));
    }
    Ok(url)
}

fn with_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Shared HTTP client and endpoints; one per configured project.
pub struct FirebaseApp {
    http: Client,
    config: FirebaseConfig,
    endpoints: Endpoints,
}

impl FirebaseApp {
    pub fn new(config: FirebaseConfig) -> anyhow::Result<Arc<Self>> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("firebase api key is not configured"));
        }
        if config.project_id.trim().is_empty() {
            return Err(anyhow!("firebase project id is not configured"));
        }
        let endpoints = Endpoints {
            auth: parse_base("auth", &config.auth_base_url)?,
            token: parse_base("token", &config.token_base_url)?,
            firestore: parse_base("firestore", &config.firestore_base_url)?,
        };
        Ok(Arc::new(Self {
            http: Client::new(),
            config,
            endpoints,
        }))
    }

    fn keyed(&self, mut url: Url) -> Url {
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        url
    }

    fn account_url(&self, action: &str) -> Url {
        self.keyed(with_segments(
            &self.endpoints.auth,
            &["v1", &format!("accounts:{action}")],
        ))
    }

    fn token_url(&self) -> Url {
        self.keyed(with_segments(&self.endpoints.token, &["v1", "token"]))
    }

    fn document_url(&self, collection: &str, key: &str) -> Url {
        with_segments(
            &self.endpoints.firestore,
            &[
                "v1",
                "projects",
                &self.config.project_id,
                "databases",
                "(default)",
                "documents",
                collection,
                key,
            ],
        )
    }
}

/// Builds a [`BackendClient`] talking to Firebase. `persistence`, when given,
/// keeps the primary instance signed in across restarts.
pub fn connect(
    config: FirebaseConfig,
    persistence: Option<Arc<dyn CredentialStore>>,
) -> anyhow::Result<BackendClient> {
    let app = FirebaseApp::new(config)?;
    let auth = Arc::new(FirebaseAuth::new(Arc::clone(&app), PRIMARY_INSTANCE, persistence));
    let documents = Arc::new(Firestore::new(app, Arc::clone(&auth)));
    Ok(BackendClient::new(auth, documents))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

async fn error_from_response(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => (status, envelope.error.message),
        Err(_) => (status, text),
    }
}

/// Maps Identity Toolkit / Secure Token error messages such as
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
pub fn map_auth_error(status: u16, message: &str) -> BackendError {
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default()
        .trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "MISSING_PASSWORD" => {
            BackendError::InvalidCredentials
        }
        "USER_DISABLED" => BackendError::UserDisabled,
        "EMAIL_EXISTS" => BackendError::EmailAlreadyInUse,
        "INVALID_EMAIL" | "MISSING_EMAIL" => BackendError::InvalidEmail,
        "WEAK_PASSWORD" => BackendError::WeakPassword,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => BackendError::TooManyAttempts,
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" | "USER_NOT_FOUND" => {
            BackendError::SessionExpired
        }
        _ if status >= 500 => BackendError::Unavailable(message.to_string()),
        _ => BackendError::Rejected {
            status,
            message: message.to_string(),
        },
    }
}

pub fn map_document_error(status: u16, message: &str) -> BackendError {
    match status {
        401 => BackendError::SessionExpired,
        403 => BackendError::PermissionDenied(message.to_string()),
        429 => BackendError::TooManyAttempts,
        500..=u16::MAX => BackendError::Unavailable(message.to_string()),
        _ => BackendError::Rejected {
            status,
            message: message.to_string(),
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

fn expiry_from(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    Utc::now() + Duration::seconds(secs)
}

/// One Firebase auth instance. The primary instance may persist its
/// credentials; instances from [`AuthBackend::isolated`] never do.
pub struct FirebaseAuth {
    app: Arc<FirebaseApp>,
    instance: String,
    persistence: Option<Arc<dyn CredentialStore>>,
    credentials: Mutex<Option<PersistedCredentials>>,
    state: watch::Sender<Option<AuthIdentity>>,
}

impl FirebaseAuth {
    pub fn new(
        app: Arc<FirebaseApp>,
        instance: impl Into<String>,
        persistence: Option<Arc<dyn CredentialStore>>,
    ) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            app,
            instance: instance.into(),
            persistence,
            credentials: Mutex::new(None),
            state,
        }
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

    async fn persist(&self, credentials: &PersistedCredentials) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = persistence.save(&self.instance, credentials).await {
            warn!(instance = %self.instance, error = %err, "firebase auth: failed to persist credentials");
        }
    }

    async fn forget(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = persistence.clear(&self.instance).await {
            warn!(instance = %self.instance, error = %err, "firebase auth: failed to clear persisted credentials");
        }
    }

    async fn password_call(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, BackendError> {
        let response = self
            .app
            .http
            .post(self.app.account_url(action))
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, message) = error_from_response(response).await;
            return Err(map_auth_error(status.as_u16(), &message));
        }
        let body: AccountResponse = response.json().await?;

        let credentials = PersistedCredentials {
            uid: UserId(body.local_id),
            email: body.email.unwrap_or_else(|| email.to_string()),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry_from(body.expires_in.as_deref()),
        };
        let identity = AuthIdentity {
            uid: credentials.uid.clone(),
            email: credentials.email.clone(),
        };
        self.persist(&credentials).await;
        *self.credentials.lock().await = Some(credentials);
        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    /// Current id token, refreshed first when it is about to expire. `None`
    /// when no user is signed in on this instance.
    pub async fn id_token(&self) -> Result<Option<String>, BackendError> {
        let mut guard = self.credentials.lock().await;
        let Some(credentials) = guard.as_mut() else {
            return Ok(None);
        };
        if credentials.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
            return Ok(Some(credentials.id_token.clone()));
        }

        debug!(instance = %self.instance, uid = %credentials.uid, "firebase auth: refreshing id token");
        match self.refresh(&credentials.refresh_token).await {
            Ok(refreshed) => {
                credentials.id_token = refreshed.id_token;
                credentials.refresh_token = refreshed.refresh_token;
                credentials.expires_at = expiry_from(refreshed.expires_in.as_deref());
                let snapshot = credentials.clone();
                drop(guard);
                self.persist(&snapshot).await;
                Ok(Some(snapshot.id_token))
            }
            Err(BackendError::SessionExpired) => {
                *guard = None;
                drop(guard);
                info!(instance = %self.instance, "firebase auth: refresh token rejected; signing out");
                self.forget().await;
                self.publish(None);
                Err(BackendError::SessionExpired)
            }
            Err(err) => Err(err),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, BackendError> {
        let response = self
            .app
            .http
            .post(self.app.token_url())
            .json(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, message) = error_from_response(response).await;
            return Err(map_auth_error(status.as_u16(), &message));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthBackend for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError> {
        self.password_call("signInWithPassword", email, password)
            .await
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthIdentity, BackendError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let had_user = self.credentials.lock().await.take().is_some();
        self.forget().await;
        self.publish(None);
        if had_user {
            debug!(instance = %self.instance, "firebase auth: signed out");
        }
        Ok(())
    }

    fn current(&self) -> Option<AuthIdentity> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.state.subscribe()
    }

    fn isolated(&self) -> Arc<dyn AuthBackend> {
        let instance = format!("isolated-{}", uuid::Uuid::new_v4().simple());
        Arc::new(Self::new(Arc::clone(&self.app), instance, None))
    }

    async fn restore(&self) -> Result<Option<AuthIdentity>, BackendError> {
        let Some(persistence) = &self.persistence else {
            return Ok(self.current());
        };
        let stored = persistence
            .load(&self.instance)
            .await
            .map_err(|err| BackendError::Persistence(format!("{err:#}")))?;
        let Some(credentials) = stored else {
            return Ok(self.current());
        };

        let identity = AuthIdentity {
            uid: credentials.uid.clone(),
            email: credentials.email.clone(),
        };
        *self.credentials.lock().await = Some(credentials);
        self.publish(Some(identity.clone()));
        info!(instance = %self.instance, uid = %identity.uid, "firebase auth: restored persisted sign-in");
        Ok(Some(identity))
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

/// Firestore document access authorised as whoever is signed in on `auth`.
pub struct Firestore {
    app: Arc<FirebaseApp>,
    auth: Arc<FirebaseAuth>,
}

impl Firestore {
    pub fn new(app: Arc<FirebaseApp>, auth: Arc<FirebaseAuth>) -> Self {
        Self { app, auth }
    }

    async fn authorised(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, BackendError> {
        Ok(match self.auth.id_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn read_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, BackendError> {
        let url = self.app.document_url(collection, key);
        let response = self
            .authorised(self.app.http.get(url))
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let (status, message) = error_from_response(response).await;
            return Err(map_document_error(status.as_u16(), &message));
        }
        let document: FirestoreDocument = response.json().await?;
        decode_fields(&document.fields).map(Some)
    }

    async fn write_document(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
    ) -> Result<(), BackendError> {
        let url = self.app.document_url(collection, key);
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .authorised(self.app.http.patch(url))
            .await?
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, message) = error_from_response(response).await;
            return Err(map_document_error(status.as_u16(), &message));
        }
        debug!(collection, key, "firestore: document written");
        Ok(())
    }
}

pub fn encode_fields(fields: &Document) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), encode_value(value)))
            .collect(),
    )
}

/// Converts plain JSON into Firestore's typed value representation.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                json!({ "integerValue": int.to_string() })
            } else if let Some(uint) = number.as_u64() {
                json!({ "integerValue": uint.to_string() })
            } else {
                json!({ "doubleValue": number.as_f64() })
            }
        }
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn decode_fields(fields: &serde_json::Map<String, Value>) -> Result<Document, BackendError> {
    fields
        .iter()
        .map(|(name, value)| {
            decode_value(value)
                .map(|decoded| (name.clone(), decoded))
                .map_err(|err| BackendError::Decode(format!("field `{name}`: {err}")))
        })
        .collect()
}

fn malformed(kind: &str) -> BackendError {
    BackendError::Decode(format!("malformed {kind}"))
}

pub fn decode_value(value: &Value) -> Result<Value, BackendError> {
    let Some((kind, inner)) = value.as_object().and_then(|typed| typed.iter().next()) else {
        return Err(BackendError::Decode("expected a typed value object".into()));
    };
    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| malformed(kind)),
        "integerValue" => match inner {
            Value::String(raw) => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| malformed(kind)),
            Value::Number(number) => Ok(Value::Number(number.clone())),
            _ => Err(malformed(kind)),
        },
        "doubleValue" => match inner {
            Value::Number(number) => Ok(Value::Number(number.clone())),
            // NaN and the infinities arrive as strings and have no JSON form.
            Value::String(_) => Ok(Value::Null),
            _ => Err(malformed(kind)),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|text| Value::String(text.to_string()))
            .ok_or_else(|| malformed(kind)),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => match inner.get("values") {
            None => Ok(Value::Array(Vec::new())),
            Some(Value::Array(items)) => items
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Some(_) => Err(malformed(kind)),
        },
        "mapValue" => match inner.get("fields") {
            None => Ok(Value::Object(Document::new())),
            Some(Value::Object(fields)) => decode_fields(fields).map(Value::Object),
            Some(_) => Err(malformed(kind)),
        },
        other => Err(BackendError::Decode(format!(
            "unsupported firestore value type `{other}`"
        ))),
    }
}

#[cfg(test)]
#[path = "tests/firebase_tests.rs"]
mod tests;
