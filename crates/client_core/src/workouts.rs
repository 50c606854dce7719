//! Workout plans drafted by a trainer and tracked by the student.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ExerciseId, UserId},
    protocol::{ExerciseEntry, WorkoutDocument, WORKOUTS_COLLECTION},
};
use thiserror::Error;
use tracing::info;

use crate::{backend::BackendClient, error::BackendError, session::Session};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkoutError {
    #[error("exercise needs a name, sets and reps")]
    IncompleteExercise,
    #[error("workout needs a name")]
    MissingName,
    #[error("workout needs at least one exercise")]
    NoExercises,
    #[error("only a signed-in admin can assign workouts")]
    NotAdmin,
    #[error("no signed-in user")]
    NotSignedIn,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutPlan {
    pub name: String,
    pub student_id: UserId,
    pub exercises: Vec<ExerciseEntry>,
    pub created_at: DateTime<Utc>,
}

impl From<WorkoutDocument> for WorkoutPlan {
    fn from(document: WorkoutDocument) -> Self {
        Self {
            name: document.workout_name,
            student_id: document.student_id,
            exercises: document.exercises,
            created_at: document.created_at,
        }
    }
}

impl From<&WorkoutPlan> for WorkoutDocument {
    fn from(plan: &WorkoutPlan) -> Self {
        Self {
            workout_name: plan.name.clone(),
            student_id: plan.student_id.clone(),
            exercises: plan.exercises.clone(),
            created_at: plan.created_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkoutDraft {
    name: String,
    exercises: Vec<ExerciseEntry>,
}

fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl WorkoutDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exercises: Vec::new(),
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn exercises(&self) -> &[ExerciseEntry] {
        &self.exercises
    }

    /// A blank `load` is stored as no load.
    pub fn add_exercise(
        &mut self,
        name: &str,
        sets: &str,
        reps: &str,
        load: Option<&str>,
    ) -> Result<ExerciseId, WorkoutError> {
        let (Some(name), Some(sets), Some(reps)) = (required(name), required(sets), required(reps))
        else {
            return Err(WorkoutError::IncompleteExercise);
        };
        let id = ExerciseId::generate();
        self.exercises.push(ExerciseEntry {
            id: id.clone(),
            name,
            sets,
            reps,
            load: load.and_then(required),
        });
        Ok(id)
    }

    pub fn remove_exercise(&mut self, id: &ExerciseId) -> bool {
        let before = self.exercises.len();
        self.exercises.retain(|exercise| &exercise.id != id);
        self.exercises.len() != before
    }

    pub fn build(&self, student_id: UserId) -> Result<WorkoutPlan, WorkoutError> {
        let name = required(&self.name).ok_or(WorkoutError::MissingName)?;
        if self.exercises.is_empty() {
            return Err(WorkoutError::NoExercises);
        }
        Ok(WorkoutPlan {
            name,
            student_id,
            exercises: self.exercises.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Stores `plan` as the student's current workout, replacing any previous one.
pub async fn assign_workout(
    client: &BackendClient,
    acting: &Session,
    plan: &WorkoutPlan,
) -> Result<(), WorkoutError> {
    if !acting.is_admin() {
        return Err(WorkoutError::NotAdmin);
    }
    client
        .write_record(
            WORKOUTS_COLLECTION,
            plan.student_id.as_str(),
            &WorkoutDocument::from(plan),
        )
        .await?;
    info!(
        student = %plan.student_id,
        exercises = plan.exercises.len(),
        "workouts: plan assigned"
    );
    Ok(())
}

pub async fn workout_for(
    client: &BackendClient,
    student_id: &UserId,
) -> Result<Option<WorkoutPlan>, WorkoutError> {
    Ok(client
        .read_record::<WorkoutDocument>(WORKOUTS_COLLECTION, student_id.as_str())
        .await?
        .map(WorkoutPlan::from))
}

/// The signed-in user's own current workout.
pub async fn current_workout(
    client: &BackendClient,
    acting: &Session,
) -> Result<Option<WorkoutPlan>, WorkoutError> {
    let identity = acting.identity.as_ref().ok_or(WorkoutError::NotSignedIn)?;
    workout_for(client, &identity.uid).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStats {
    pub total: usize,
    pub completed: usize,
    /// Rounded to the nearest whole percent; 0 for an empty plan.
    pub percentage: u8,
}

/// Completion state of a plan on the student's device.
#[derive(Debug, Clone)]
pub struct WorkoutProgress {
    plan: WorkoutPlan,
    done: HashSet<ExerciseId>,
}

impl WorkoutProgress {
    pub fn new(plan: WorkoutPlan) -> Self {
        Self {
            plan,
            done: HashSet::new(),
        }
    }

    pub fn plan(&self) -> &WorkoutPlan {
        &self.plan
    }

    pub fn is_done(&self, id: &ExerciseId) -> bool {
        self.done.contains(id)
    }

    /// Flips the exercise's done flag and returns the new value, or `None`
    /// if the plan has no such exercise.
    pub fn toggle(&mut self, id: &ExerciseId) -> Option<bool> {
        if !self.plan.exercises.iter().any(|exercise| &exercise.id == id) {
            return None;
        }
        if self.done.remove(id) {
            Some(false)
        } else {
            self.done.insert(id.clone());
            Some(true)
        }
    }

    pub fn stats(&self) -> ProgressStats {
        let total = self.plan.exercises.len();
        let completed = self
            .plan
            .exercises
            .iter()
            .filter(|exercise| self.done.contains(&exercise.id))
            .count();
        let percentage = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u8
        };
        ProgressStats {
            total,
            completed,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::AuthIdentity, memory::InMemoryBackend, session::ProfileState};
    use shared::domain::{Profile, Role};

    fn session(role: Role) -> Session {
        Session {
            identity: Some(AuthIdentity {
                uid: UserId::new(match role {
                    Role::Admin => "coach",
                    Role::Student => "ana",
                }),
                email: "someone@example.com".into(),
            }),
            profile: ProfileState::Resolved(Profile {
                name: "Someone".into(),
                role,
            }),
            loading: false,
        }
    }

    fn leg_day() -> WorkoutDraft {
        let mut draft = WorkoutDraft::new("Treino A - Pernas");
        draft
            .add_exercise("Agachamento Livre", "4", "10-12", None)
            .expect("squat");
        draft
            .add_exercise("Leg Press 45", "3", "12", Some("120kg"))
            .expect("press");
        draft
            .add_exercise("Cadeira Extensora", "3", "15", Some("  "))
            .expect("extension");
        draft
    }

    #[test]
    fn exercises_need_name_sets_and_reps() {
        let mut draft = WorkoutDraft::new("A");
        assert_eq!(
            draft.add_exercise("  ", "4", "10", None),
            Err(WorkoutError::IncompleteExercise)
        );
        assert_eq!(
            draft.add_exercise("Squat", "", "10", None),
            Err(WorkoutError::IncompleteExercise)
        );
        assert!(draft.exercises().is_empty());

        let draft = leg_day();
        assert_eq!(draft.exercises()[1].load.as_deref(), Some("120kg"));
        assert_eq!(draft.exercises()[2].load, None);
    }

    #[test]
    fn build_requires_name_and_exercises() {
        let student = UserId::new("ana");
        assert_eq!(
            WorkoutDraft::new("Empty").build(student.clone()),
            Err(WorkoutError::NoExercises)
        );

        let mut draft = leg_day();
        draft.rename("   ");
        assert_eq!(draft.build(student.clone()), Err(WorkoutError::MissingName));

        draft.rename("Treino B");
        let plan = draft.build(student.clone()).expect("plan");
        assert_eq!(plan.name, "Treino B");
        assert_eq!(plan.student_id, student);
        assert_eq!(plan.exercises.len(), 3);
    }

    #[test]
    fn removing_exercises_by_id() {
        let mut draft = leg_day();
        let id = draft.exercises()[0].id.clone();
        assert!(draft.remove_exercise(&id));
        assert!(!draft.remove_exercise(&id));
        assert_eq!(draft.exercises().len(), 2);
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        let plan = leg_day().build(UserId::new("ana")).expect("plan");
        let first = plan.exercises[0].id.clone();
        let mut progress = WorkoutProgress::new(plan);
        assert_eq!(
            progress.stats(),
            ProgressStats {
                total: 3,
                completed: 0,
                percentage: 0
            }
        );

        assert_eq!(progress.toggle(&first), Some(true));
        assert_eq!(progress.stats().percentage, 33);
        let second = progress.plan().exercises[1].id.clone();
        progress.toggle(&second);
        assert_eq!(progress.stats().percentage, 67);

        assert_eq!(progress.toggle(&first), Some(false));
        assert!(!progress.is_done(&first));
        assert_eq!(progress.toggle(&ExerciseId::new("missing")), None);
        assert_eq!(progress.stats().completed, 1);
    }

    #[test]
    fn empty_plan_reports_zero_percent() {
        let progress = WorkoutProgress::new(WorkoutPlan {
            name: "Rest".into(),
            student_id: UserId::new("ana"),
            exercises: Vec::new(),
            created_at: Utc::now(),
        });
        assert_eq!(progress.stats().percentage, 0);
    }

    #[tokio::test]
    async fn assigned_plan_is_read_back_by_the_student() {
        let backend = InMemoryBackend::new();
        let client = backend.client();
        let plan = leg_day().build(UserId::new("ana")).expect("plan");

        assign_workout(&client, &session(Role::Admin), &plan)
            .await
            .expect("assign");
        let loaded = current_workout(&client, &session(Role::Student))
            .await
            .expect("read")
            .expect("plan present");
        assert_eq!(loaded, plan);
    }

    #[tokio::test]
    async fn students_cannot_assign_and_signed_out_users_cannot_read() {
        let backend = InMemoryBackend::new();
        let client = backend.client();
        let plan = leg_day().build(UserId::new("ana")).expect("plan");

        assert_eq!(
            assign_workout(&client, &session(Role::Student), &plan).await,
            Err(WorkoutError::NotAdmin)
        );
        assert_eq!(
            current_workout(&client, &Session::starting()).await,
            Err(WorkoutError::NotSignedIn)
        );
        assert_eq!(
            current_workout(&client, &session(Role::Student)).await,
            Ok(None)
        );
    }
}
