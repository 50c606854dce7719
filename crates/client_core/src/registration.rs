//! Student registration performed by a signed-in admin.
//!
//! Account creation signs the new account in on whichever auth instance
//! performs it, so it runs on an isolated instance and the admin's own
//! session is never disturbed.

use chrono::Utc;
use serde_json::json;
use shared::{
    domain::{Role, TrainingGoal, UserId},
    error::ErrorNotice,
    protocol::{StudentDocument, STUDENTS_COLLECTION, USERS_COLLECTION},
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    backend::{AuthBackend, BackendClient},
    error::BackendError,
    session::Session,
};

#[derive(Debug, Clone)]
pub struct StudentRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub goal: TrainingGoal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredStudent {
    pub uid: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("only a signed-in admin can register students")]
    NotAdmin,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RegistrationError {
    pub fn notice(&self) -> ErrorNotice {
        match self {
            Self::NotAdmin => ErrorNotice::new(
                shared::error::ErrorCode::Forbidden,
                "Only trainers can register students.",
            ),
            Self::Backend(
                err @ (BackendError::EmailAlreadyInUse
                | BackendError::InvalidEmail
                | BackendError::WeakPassword),
            ) => err.notice(),
            Self::Backend(err) => {
                ErrorNotice::new(err.code(), "Could not register the student.")
            }
        }
    }
}

pub async fn register_student(
    client: &BackendClient,
    acting: &Session,
    registration: StudentRegistration,
) -> Result<RegisteredStudent, RegistrationError> {
    let trainer_id = match (&acting.identity, acting.role()) {
        (Some(identity), Some(Role::Admin)) => identity.uid.clone(),
        _ => return Err(RegistrationError::NotAdmin),
    };

    let secondary = client.auth().isolated();
    let outcome = create_and_record(client, secondary.as_ref(), &trainer_id, &registration).await;
    if let Err(err) = secondary.sign_out().await {
        warn!(error = %err, "registration: failed to sign out secondary instance");
    }
    drop(secondary);

    match &outcome {
        Ok(student) => info!(uid = %student.uid, trainer = %trainer_id, "registration: student registered"),
        Err(err) => error!(error = %err, trainer = %trainer_id, "registration: failed"),
    }
    outcome
}

async fn create_and_record(
    client: &BackendClient,
    secondary: &dyn AuthBackend,
    trainer_id: &UserId,
    registration: &StudentRegistration,
) -> Result<RegisteredStudent, RegistrationError> {
    let email = registration.email.trim();
    let name = registration.name.trim();
    let identity = secondary
        .create_account(email, &registration.password)
        .await?;

    let student = StudentDocument {
        uid: identity.uid.clone(),
        name: name.to_string(),
        email: identity.email.clone(),
        phone: registration.phone.trim().to_string(),
        goal: registration.goal,
        personal_trainer_id: trainer_id.clone(),
        created_at: Utc::now(),
        active: true,
        role: Role::Student.as_str().to_string(),
    };
    client
        .write_record(STUDENTS_COLLECTION, identity.uid.as_str(), &student)
        .await?;
    client
        .write_record(
            USERS_COLLECTION,
            identity.uid.as_str(),
            &json!({ "name": name, "role": Role::Student.as_str() }),
        )
        .await?;

    Ok(RegisteredStudent {
        uid: identity.uid,
        name: name.to_string(),
        email: identity.email,
    })
}

#[cfg(test)]
#[path = "tests/registration_tests.rs"]
mod tests;
