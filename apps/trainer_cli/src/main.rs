mod config;
mod demo;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    assign_workout, current_workout, firebase::FirebaseConfig, register_student, Route, Session,
    SessionStore, StudentRegistration, WorkoutDraft, WorkoutProgress,
};
use shared::domain::{TrainingGoal, UserId};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trainer", about = "Personal trainer / student client")]
struct Cli {
    #[arg(long, default_value = "trainer.toml")]
    config: PathBuf,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    project_id: Option<String>,
    /// host:port of a local Firebase emulator suite
    #[arg(long)]
    emulator: Option<String>,
    #[arg(long)]
    session_db: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Show the persisted session and the route it resolves to.
    #[command(alias = "whoami")]
    Status,
    SignOut,
    RegisterStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "hypertrophy")]
        goal: TrainingGoal,
    },
    #[command(alias = "create-workout")]
    AssignWorkout {
        #[arg(long)]
        student: String,
        #[arg(long)]
        name: String,
        /// name:sets:reps[:load], repeatable
        #[arg(long = "exercise", required = true, value_parser = parse_exercise)]
        exercises: Vec<ExerciseArg>,
    },
    /// Show the signed-in student's workout; `--done N` marks exercise N (1-based).
    #[command(alias = "show-workout")]
    Workout {
        #[arg(long = "done")]
        done: Vec<usize>,
    },
    /// Run the whole trainer/student flow against the in-memory backend.
    Demo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExerciseArg {
    name: String,
    sets: String,
    reps: String,
    load: Option<String>,
}

fn parse_exercise(raw: &str) -> Result<ExerciseArg, String> {
    let parts: Vec<&str> = raw.splitn(4, ':').collect();
    match parts.as_slice() {
        [name, sets, reps] => Ok(ExerciseArg {
            name: name.to_string(),
            sets: sets.to_string(),
            reps: reps.to_string(),
            load: None,
        }),
        [name, sets, reps, load] => Ok(ExerciseArg {
            name: name.to_string(),
            sets: sets.to_string(),
            reps: reps.to_string(),
            load: Some(load.to_string()),
        }),
        _ => Err(format!("expected name:sets:reps[:load], got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load_settings(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.clone())),
        )
        .init();

    if matches!(cli.command, Command::Demo) {
        return demo::run().await;
    }

    if let Some(host) = &cli.emulator {
        let project_id = cli
            .project_id
            .clone()
            .unwrap_or_else(|| settings.firebase.project_id.clone());
        settings.firebase = FirebaseConfig::emulator(host, project_id);
    }
    if let Some(api_key) = cli.api_key {
        settings.firebase.api_key = api_key;
    }
    if let Some(project_id) = cli.project_id {
        settings.firebase.project_id = project_id;
    }
    if let Some(url) = cli.session_db {
        settings.session_database_url = config::normalize_database_url(&url);
    }

    let storage = Storage::new(&settings.session_database_url)
        .await
        .with_context(|| format!("failed to open {}", settings.session_database_url))?;
    let client = client_core::firebase::connect(settings.firebase.clone(), Some(Arc::new(storage)))?;
    let store = SessionStore::start(client.clone()).await;
    let session = store.settled().await;
    info!(route = ?store.route(), "session restored");

    let outcome = run_command(&store, session, cli.command).await;
    store.shutdown();
    outcome
}

async fn run_command(store: &SessionStore, session: Session, command: Command) -> Result<()> {
    let client = store.client();
    match command {
        Command::SignIn { email, password } => {
            let identity = store
                .sign_in(&email, &password)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            store.settled_as(&identity.uid).await;
            print_status(store);
        }
        Command::Status => print_status(store),
        Command::SignOut => {
            store
                .sign_out()
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("signed out");
        }
        Command::RegisterStudent {
            name,
            email,
            password,
            phone,
            goal,
        } => {
            let student = register_student(
                client,
                &session,
                StudentRegistration {
                    name,
                    email,
                    password,
                    phone,
                    goal,
                },
            )
            .await
            .map_err(|err| anyhow!(err.notice().message))?;
            println!("registered {} <{}> as {}", student.name, student.email, student.uid);
        }
        Command::AssignWorkout {
            student,
            name,
            exercises,
        } => {
            let mut draft = WorkoutDraft::new(name);
            for exercise in &exercises {
                draft.add_exercise(
                    &exercise.name,
                    &exercise.sets,
                    &exercise.reps,
                    exercise.load.as_deref(),
                )?;
            }
            let plan = draft.build(UserId::new(student))?;
            assign_workout(client, &session, &plan).await?;
            println!(
                "assigned '{}' ({} exercises) to {}",
                plan.name,
                plan.exercises.len(),
                plan.student_id
            );
        }
        Command::Workout { done } => {
            let Some(plan) = current_workout(client, &session).await? else {
                println!("no workout assigned yet");
                return Ok(());
            };
            let mut progress = WorkoutProgress::new(plan);
            for index in done {
                let id = index
                    .checked_sub(1)
                    .and_then(|i| progress.plan().exercises.get(i))
                    .map(|exercise| exercise.id.clone());
                match id {
                    Some(id) => {
                        progress.toggle(&id);
                    }
                    None => bail!("no exercise number {index}"),
                }
            }
            print_workout(&progress);
        }
        Command::Demo => demo::run().await?,
    }
    Ok(())
}

fn print_status(store: &SessionStore) {
    let session = store.snapshot();
    let route = store.route();
    match (&session.identity, session.profile()) {
        (Some(identity), Some(profile)) => println!(
            "{} <{}> signed in as {} ({})",
            profile.name, identity.email, profile.role, identity.uid
        ),
        (Some(identity), None) => println!("<{}> signed in, profile unavailable", identity.email),
        (None, _) => println!("not signed in"),
    }
    let screens: Vec<String> = route
        .screens()
        .iter()
        .map(|screen| format!("{screen:?}"))
        .collect();
    println!("route: {route:?} [{}]", screens.join(", "));
    if route == Route::ProfileError {
        println!("profile could not be loaded; run `trainer sign-out` and sign in again");
    }
}

pub(crate) fn print_workout(progress: &WorkoutProgress) {
    let plan = progress.plan();
    println!("{} (assigned {})", plan.name, plan.created_at.format("%Y-%m-%d"));
    for (index, exercise) in plan.exercises.iter().enumerate() {
        let mark = if progress.is_done(&exercise.id) { "x" } else { " " };
        let load = exercise
            .load
            .as_deref()
            .map(|load| format!(" @ {load}"))
            .unwrap_or_default();
        println!(
            "  [{mark}] {}. {} {}x{}{load}",
            index + 1,
            exercise.name,
            exercise.sets,
            exercise.reps
        );
    }
    let stats = progress.stats();
    println!(
        "progress: {}/{} ({}%)",
        stats.completed, stats.total, stats.percentage
    );
}
