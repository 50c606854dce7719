use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use client_core::firebase::FirebaseConfig;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub firebase: FirebaseConfig,
    pub session_database_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            firebase: FirebaseConfig::new("", ""),
            session_database_url: "sqlite://./data/session.db".into(),
            log_filter: "info".into(),
        }
    }
}

/// Keys accepted in `trainer.toml`; all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_key: Option<String>,
    project_id: Option<String>,
    auth_base_url: Option<String>,
    token_base_url: Option<String>,
    firestore_base_url: Option<String>,
    session_database_url: Option<String>,
    log_filter: Option<String>,
}

/// Defaults, then `path` if it exists, then the process environment.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_file(&mut settings, file);
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, lookup);
    settings.session_database_url = normalize_database_url(&settings.session_database_url);
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file: FileSettings) {
    let firebase = &mut settings.firebase;
    if let Some(v) = file.api_key {
        firebase.api_key = v;
    }
    if let Some(v) = file.project_id {
        firebase.project_id = v;
    }
    if let Some(v) = file.auth_base_url {
        firebase.auth_base_url = v;
    }
    if let Some(v) = file.token_base_url {
        firebase.token_base_url = v;
    }
    if let Some(v) = file.firestore_base_url {
        firebase.firestore_base_url = v;
    }
    if let Some(v) = file.session_database_url {
        settings.session_database_url = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let firebase = &mut settings.firebase;

    if let Some(v) = lookup("FIREBASE_API_KEY") {
        firebase.api_key = v;
    }
    if let Some(v) = lookup("APP__FIREBASE_API_KEY") {
        firebase.api_key = v;
    }

    if let Some(v) = lookup("FIREBASE_PROJECT_ID") {
        firebase.project_id = v;
    }
    if let Some(v) = lookup("APP__FIREBASE_PROJECT_ID") {
        firebase.project_id = v;
    }

    if let Some(v) = lookup("APP__AUTH_BASE_URL") {
        firebase.auth_base_url = v;
    }
    if let Some(v) = lookup("APP__TOKEN_BASE_URL") {
        firebase.token_base_url = v;
    }
    if let Some(v) = lookup("APP__FIRESTORE_BASE_URL") {
        firebase.firestore_base_url = v;
    }

    if let Some(v) = lookup("APP__SESSION_DATABASE_URL") {
        settings.session_database_url = v;
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().session_database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
