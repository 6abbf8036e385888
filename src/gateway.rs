use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{
    DateTime, Utc
};
use serde::{
    Serialize, Deserialize
};
use serde_json::{
    Map, Value
};

use crate::{
    error::Result,
    files::FileRef,
};

// read-only views onto the remote service's records

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub subject: Option<SubjectRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub measurement: Option<String>,

    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
    #[serde(other)]
    Other,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRef {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub job: Option<JobRef>,

    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl Analysis {
    // an analysis without a job record has nothing to report yet
    pub fn state(&self) -> Option<JobState> {
        self.job.as_ref().map(|j| j.state)
    }

    pub fn is_complete(&self) -> bool {
        self.state() == Some(JobState::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gear {
    pub name: String,

    #[serde(default)]
    pub config: BTreeMap<String, ConfigField>,
}

impl Gear {
    // every config key that declares a default
    pub fn default_config(&self) -> Map<String, Value> {
        self.config
            .iter()
            .filter_map(|(key, field)| {
                field.default
                    .as_ref()
                    .map(|v| (key.clone(), v.clone()))
            })
            .collect()
    }
}

// everything needed to start one gear run against a session
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub gear_name: String,

    pub inputs: BTreeMap<String, FileRef>,

    pub config: Map<String, Value>,

    pub label: String,
}

/// Request/response access to the remote data service.
///
/// Implementations must return the authoritative analysis list of a session
/// (the one that reflects deletions), not a log of every job ever run.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_gears(&self) -> Result<Vec<Gear>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>>;

    async fn list_acquisitions(&self, session_id: &str) -> Result<Vec<Acquisition>>;

    async fn session_analyses(&self, session_id: &str) -> Result<Vec<Analysis>>;

    /// Returns the id of the new analysis.
    async fn submit_analysis(
        &self,
        session_id: &str,
        request: &AnalysisRequest
    ) -> Result<String>;
}

pub type SharedGateway = Arc<dyn Gateway>;

pub async fn find_project(
    gateway: &dyn Gateway,
    label: &str
) -> Result<Project> {
    gateway.list_projects()
        .await?
        .into_iter()
        .find(|p| p.label == label)
        .ok_or_else(|| crate::Error::ProjectNotFound(label.to_string()))
}
