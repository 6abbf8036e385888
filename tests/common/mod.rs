#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use sdm_analyzer::{
    define_analysis,
    gateway::{ConfigField, FileEntry, JobRef},
    Acquisition, Analysis, AnalysisRequest, Error, Gateway, Gear, InputContext, JobState,
    Operation, Project, Result, Session, StageInputs,
};

pub struct Transition {
    pub session_id: String,
    pub label: String,
    // applied on this analyses read of the session (1-based)
    pub on_read: usize,
    pub state: JobState,
}

#[derive(Default)]
pub struct MockState {
    pub gears: Vec<Gear>,
    pub projects: Vec<Project>,
    pub sessions: Vec<Session>,
    pub acquisitions: HashMap<String, Vec<Acquisition>>,
    pub analyses: HashMap<String, Vec<Analysis>>,
    // files an analysis (by label) exposes once its job completes
    pub outputs: HashMap<String, Vec<String>>,

    pub transitions: Vec<Transition>,
    // submitted jobs complete on the Nth read after submission; None = never
    pub complete_after_reads: Option<usize>,
    pub failing_sessions: HashSet<String>,
    // analyses reads of these sessions never answer
    pub hanging_sessions: HashSet<String>,

    pub submissions: Vec<(String, AnalysisRequest)>,
    pub analysis_reads: HashMap<String, usize>,
    pub acquisition_reads: HashMap<String, usize>,
    pub session_list_calls: usize,
    // session ids in the order of their first analyses read
    pub first_reads: Vec<String>,

    pending: Vec<(String, String, usize)>,
    next_id: usize,
}

/// In-memory gateway with scripted job progress.
#[derive(Default)]
pub struct MockGateway {
    pub state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn submitted_labels(&self, session_id: &str) -> Vec<String> {
        self.with(|s| {
            s.submissions
                .iter()
                .filter(|(id, _)| id == session_id)
                .map(|(_, r)| r.label.clone())
                .collect()
        })
    }

    pub fn total_submissions(&self) -> usize {
        self.with(|s| s.submissions.len())
    }

    pub fn reads(&self, session_id: &str) -> usize {
        self.with(|s| s.analysis_reads.get(session_id).copied().unwrap_or(0))
    }

    pub fn acquisition_reads(&self, session_id: &str) -> usize {
        self.with(|s| s.acquisition_reads.get(session_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn list_gears(&self) -> Result<Vec<Gear>> {
        Ok(self.with(|s| s.gears.clone()))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.with(|s| s.projects.clone()))
    }

    async fn list_sessions(&self, _project_id: &str) -> Result<Vec<Session>> {
        Ok(self.with(|s| {
            s.session_list_calls += 1;
            s.sessions.clone()
        }))
    }

    async fn list_acquisitions(&self, session_id: &str) -> Result<Vec<Acquisition>> {
        Ok(self.with(|s| {
            *s.acquisition_reads.entry(session_id.to_string()).or_default() += 1;
            s.acquisitions.get(session_id).cloned().unwrap_or_default()
        }))
    }

    async fn session_analyses(&self, session_id: &str) -> Result<Vec<Analysis>> {
        if self.with(|s| s.hanging_sessions.contains(session_id)) {
            futures::future::pending::<()>().await;
        }
        self.with(|s| {
            if s.failing_sessions.contains(session_id) {
                return Err(Error::Api {
                    status: 500,
                    method: "GET".to_string(),
                    url: format!("sessions/{session_id}"),
                    body: "boom".to_string(),
                });
            }
            let reads = {
                let n = s.analysis_reads.entry(session_id.to_string()).or_default();
                *n += 1;
                *n
            };
            if reads == 1 {
                s.first_reads.push(session_id.to_string());
            }

            let mut flips = vec![];
            for t in s.transitions.iter().filter(|t| t.session_id == session_id && t.on_read == reads) {
                flips.push((t.label.clone(), t.state));
            }
            for p in s.pending.iter_mut().filter(|p| p.0 == session_id) {
                p.2 = p.2.saturating_sub(1);
                if p.2 == 0 {
                    flips.push((p.1.clone(), JobState::Complete));
                }
            }
            s.pending.retain(|p| p.2 > 0);

            let outputs = s.outputs.clone();
            let analyses = s.analyses.entry(session_id.to_string()).or_default();
            for (label, state) in flips {
                if let Some(a) = analyses.iter_mut().find(|a| a.label == label) {
                    a.job = Some(JobRef { id: None, state: state });
                    if state == JobState::Complete && a.files.is_empty() {
                        a.files = outputs
                            .get(&label)
                            .map(|names| names.iter().map(|n| FileEntry { name: n.clone() }).collect())
                            .unwrap_or_default();
                    }
                }
            }
            Ok(analyses.clone())
        })
    }

    async fn submit_analysis(&self, session_id: &str, request: &AnalysisRequest) -> Result<String> {
        Ok(self.with(|s| {
            s.next_id += 1;
            let id = format!("an-{}", s.next_id);
            s.analyses
                .entry(session_id.to_string())
                .or_default()
                .push(Analysis {
                    id: id.clone(),
                    label: request.label.clone(),
                    job: Some(JobRef { id: None, state: JobState::Pending }),
                    files: vec![],
                });
            if let Some(n) = s.complete_after_reads {
                s.pending.push((session_id.to_string(), request.label.clone(), n));
            }
            s.submissions.push((session_id.to_string(), request.clone()));
            id
        }))
    }
}

pub fn project() -> Project {
    Project {
        id: "p1".to_string(),
        label: "ENGAGE".to_string(),
    }
}

pub fn session(id: &str, day: u32) -> Session {
    Session {
        id: id.to_string(),
        label: format!("visit {id}"),
        timestamp: Some(Utc.with_ymd_and_hms(2017, 1, day, 10, 0, 0).unwrap()),
        subject: None,
    }
}

pub fn analysis(id: &str, label: &str, state: JobState) -> Analysis {
    Analysis {
        id: id.to_string(),
        label: label.to_string(),
        job: Some(JobRef { id: None, state: state }),
        files: vec![],
    }
}

pub fn gear(name: &str) -> Gear {
    Gear {
        name: name.to_string(),
        config: Default::default(),
    }
}

pub fn gear_with_defaults(name: &str, defaults: &[(&str, Value)]) -> Gear {
    Gear {
        name: name.to_string(),
        config: defaults
            .iter()
            .map(|(k, v)| (k.to_string(), ConfigField { default: Some(v.clone()) }))
            .collect(),
    }
}

// a stage that needs nothing from the session
pub fn op(gear_name: &str) -> Operation {
    define_analysis(
        gear_name,
        |_: &InputContext<'_>| -> Result<StageInputs> { Ok(StageInputs::default()) },
        None,
        None,
    )
    .unwrap()
}

pub fn gears(names: &[&str]) -> Vec<Gear> {
    names.iter().map(|n| gear(n)).collect()
}

pub fn config_value(request: &AnalysisRequest, key: &str) -> Value {
    request.config.get(key).cloned().unwrap_or(json!(null))
}
