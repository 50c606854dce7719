//! Offline walk-through of the trainer and student flows on the in-memory
//! backend.

use anyhow::{anyhow, Context, Result};
use client_core::{
    assign_workout, current_workout, register_student, select_route, InMemoryBackend,
    SessionStore, StudentRegistration, WorkoutDraft, WorkoutProgress,
};
use futures::StreamExt;
use serde_json::json;
use shared::{domain::TrainingGoal, protocol::USERS_COLLECTION};
use tracing::info;

use crate::print_workout;

const COACH_EMAIL: &str = "coach@example.com";
const COACH_PASSWORD: &str = "coach123";
const STUDENT_EMAIL: &str = "carlos@example.com";
const STUDENT_PASSWORD: &str = "carlos123";

pub async fn run() -> Result<()> {
    let backend = InMemoryBackend::new();
    let client = backend.client();

    let coach = backend.auth.seed_account(COACH_EMAIL, COACH_PASSWORD).await;
    client
        .write_record(
            USERS_COLLECTION,
            coach.uid.as_str(),
            &json!({ "name": "Coach Rafael", "role": "admin" }),
        )
        .await
        .context("seed coach profile")?;

    let store = SessionStore::start(client.clone()).await;
    let mut changes = store.changes();
    let watcher = tokio::spawn(async move {
        let mut last = None;
        while let Some(session) = changes.next().await {
            let route = select_route(&session);
            if last != Some(route) {
                info!(?route, "demo: route changed");
                last = Some(route);
            }
        }
    });

    store
        .sign_in(COACH_EMAIL, COACH_PASSWORD)
        .await
        .map_err(|err| anyhow!(err.user_message()))?;
    let admin = store.settled_as(&coach.uid).await;
    println!("coach signed in, route {:?}", store.route());

    let student = register_student(
        &client,
        &admin,
        StudentRegistration {
            name: "Carlos Mendes".into(),
            email: STUDENT_EMAIL.into(),
            password: STUDENT_PASSWORD.into(),
            phone: "555-0100".into(),
            goal: TrainingGoal::Hypertrophy,
        },
    )
    .await
    .map_err(|err| anyhow!(err.notice().message))?;
    println!("registered {} ({}), coach still signed in", student.name, student.uid);

    let mut draft = WorkoutDraft::new("Upper body A");
    draft.add_exercise("Bench press", "4", "8-10", Some("60kg"))?;
    draft.add_exercise("Bent-over row", "4", "10", None)?;
    draft.add_exercise("Overhead press", "3", "12", Some("30kg"))?;
    let plan = draft.build(student.uid.clone())?;
    assign_workout(&client, &admin, &plan).await?;
    println!("assigned '{}'", plan.name);

    store
        .sign_out()
        .await
        .map_err(|err| anyhow!(err.user_message()))?;

    store
        .sign_in(STUDENT_EMAIL, STUDENT_PASSWORD)
        .await
        .map_err(|err| anyhow!(err.user_message()))?;
    let session = store.settled_as(&student.uid).await;
    println!("student signed in, route {:?}", store.route());

    if let Some(plan) = current_workout(&client, &session).await? {
        let mut progress = WorkoutProgress::new(plan);
        if let Some(first) = progress.plan().exercises.first().map(|e| e.id.clone()) {
            progress.toggle(&first);
        }
        print_workout(&progress);
    }

    store
        .sign_out()
        .await
        .map_err(|err| anyhow!(err.user_message()))?;
    store.shutdown();
    drop(store);
    watcher.abort();
    Ok(())
}
