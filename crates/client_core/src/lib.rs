//! Client-side core of the trainer/student app: session tracking, route
//! gating, and the backend operations the screens perform.

pub mod backend;
pub mod error;
pub mod firebase;
pub mod memory;
pub mod profile;
pub mod registration;
pub mod route;
pub mod session;
pub mod workouts;

pub use backend::{AuthBackend, AuthIdentity, BackendClient, CredentialStore, Document, DocumentStore};
pub use error::BackendError;
pub use memory::InMemoryBackend;
pub use profile::{ProfileError, ProfileFetcher};
pub use registration::{register_student, RegisteredStudent, RegistrationError, StudentRegistration};
pub use route::{select_route, Route, Screen};
pub use session::{ProfileState, Session, SessionStore};
pub use workouts::{
    assign_workout, current_workout, workout_for, ProgressStats, WorkoutDraft, WorkoutError,
    WorkoutPlan, WorkoutProgress,
};
