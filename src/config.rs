use std::{
    collections::HashMap,
    env,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_INSTANCE: &str = "scitran";

// overrides the api key stored in auth.json
pub const API_KEY_ENV: &str = "SDM_API_KEY";

// turns `run` into a read-only status report
pub const STATUS_ONLY_ENV: &str = "SDM_ANALYZER_STATUS_ONLY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub url: String,

    pub api_key: String,
}

// partial entry as found on disk; both keys are required in the end
#[derive(Debug, Deserialize)]
struct AuthEntry {
    url: Option<String>,

    api_key: Option<String>,
}

// <home>/.stclient
pub fn default_auth_dir() -> Result<PathBuf> {
    let home = home::home_dir()
        .ok_or_else(|| Error::Auth("home dir is not available".to_string()))?;
    Ok(home.join(".stclient"))
}

/// Loads the credentials of `instance` from `<dir>/auth.json`, a map of
/// instance name to `{ "url": .., "api_key": .. }`.
pub fn load_credentials(dir: &Path, instance: &str) -> Result<Credentials> {
    let auth_path = dir.join("auth.json");
    let example = r#"{"url": "https://myflywheel.io", "api_key": "<secret>"}"#;
    let raw = fs::read_to_string(&auth_path)
        .map_err(|e| Error::Auth(format!(
            "unable to read `{}`: {e}; add an entry for `{instance}` like {example}",
            auth_path.display()
        )))?;
    let mut entries: HashMap<String, AuthEntry> = serde_json::from_str(&raw)?;
    let entry = entries
        .remove(instance)
        .ok_or_else(|| Error::Auth(format!(
            "missing entry for `{instance}` in `{}`, it should look like {example}",
            auth_path.display()
        )))?;
    let api_key = env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or(entry.api_key)
        .filter(|k| !k.is_empty());
    match (entry.url, api_key) {
        (Some(url), Some(api_key)) => Ok(Credentials {
            url: url,
            api_key: api_key,
        }),

        _ => Err(Error::Auth(format!(
            "incomplete entry for `{instance}` in `{}`, it should look like {example}",
            auth_path.display()
        ))),
    }
}

pub fn status_only() -> bool {
    toggle_is_set(env::var(STATUS_ONLY_ENV).ok().as_deref())
}

fn toggle_is_set(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}
