use shared::{
    domain::{Profile, Role, UserId},
    protocol::{ProfileDocument, USERS_COLLECTION},
};
use thiserror::Error;
use tracing::debug;

use crate::{backend::BackendClient, error::BackendError};

/// Name used when a profile record carries no `name`.
pub const DEFAULT_PROFILE_NAME: &str = "User";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("no profile record for {0}")]
    NotFound(UserId),
    #[error("profile for {uid} has unrecognized role `{role}`")]
    UnknownRole { uid: UserId, role: String },
    #[error("profile for {uid} is malformed: {reason}")]
    Malformed { uid: UserId, reason: String },
    #[error("failed to read profile: {0}")]
    Backend(#[from] BackendError),
}

/// Resolves the role/profile record of an authenticated identity.
#[derive(Clone)]
pub struct ProfileFetcher {
    client: BackendClient,
}

impl ProfileFetcher {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, uid: &UserId) -> Result<Profile, ProfileError> {
        let document = self
            .client
            .read_record::<ProfileDocument>(USERS_COLLECTION, uid.as_str())
            .await
            .map_err(|err| match err {
                BackendError::Decode(reason) => ProfileError::Malformed {
                    uid: uid.clone(),
                    reason,
                },
                other => ProfileError::Backend(other),
            })?
            .ok_or_else(|| ProfileError::NotFound(uid.clone()))?;
        let profile = parse_profile(uid, document)?;
        debug!(%uid, role = %profile.role, "profile: resolved");
        Ok(profile)
    }
}

pub fn parse_profile(uid: &UserId, document: ProfileDocument) -> Result<Profile, ProfileError> {
    let role = document.role.ok_or_else(|| ProfileError::Malformed {
        uid: uid.clone(),
        reason: "missing role".to_string(),
    })?;
    let role = role
        .parse::<Role>()
        .map_err(|unknown| ProfileError::UnknownRole {
            uid: uid.clone(),
            role: unknown.0,
        })?;
    let name = document
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
    Ok(Profile { name, role })
}
