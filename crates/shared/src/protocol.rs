//! Document shapes exchanged with the managed backend's document database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExerciseId, TrainingGoal, UserId};

pub const USERS_COLLECTION: &str = "users";
pub const STUDENTS_COLLECTION: &str = "students";
pub const WORKOUTS_COLLECTION: &str = "workouts";

/// Raw `users/{uid}` payload. Both fields are optional on the wire so that a
/// malformed record can be reported rather than failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDocument {
    pub uid: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub goal: TrainingGoal,
    pub personal_trainer_id: UserId,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub id: ExerciseId,
    pub name: String,
    pub sets: String,
    pub reps: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDocument {
    pub workout_name: String,
    pub student_id: UserId,
    pub exercises: Vec<ExerciseEntry>,
    pub created_at: DateTime<Utc>,
}

/// Credentials of a signed-in auth instance, as kept in local persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCredentials {
    pub uid: UserId,
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}
