use std::fmt;

use log::info;

use crate::{
    error::Result,
    gateway::{Gateway, Project},
    operation::Operation,
    resolver::{resolve, StageState},
    scheduler::order_sessions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NotStarted,

    InProgress {
        completed: usize,
        total: usize,
    },

    Complete,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::NotStarted => write!(f, "not started"),
            Progress::InProgress { completed, total } => {
                write!(f, "in progress ({completed} of {total})")
            },
            Progress::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub session_id: String,

    pub session_label: String,

    // labels with a matching analysis, whatever its state
    pub started: Vec<String>,

    pub completed: Vec<String>,

    pub progress: Progress,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub not_started: usize,

    pub in_progress: usize,

    pub complete: usize,
}

impl StatusSummary {
    pub fn of(statuses: &[SessionStatus]) -> Self {
        let mut summary = Self::default();
        for s in statuses {
            match s.progress {
                Progress::NotStarted => summary.not_started += 1,
                Progress::InProgress { .. } => summary.in_progress += 1,
                Progress::Complete => summary.complete += 1,
            }
        }
        summary
    }
}

pub fn classify(total: usize, started: usize, completed: usize) -> Progress {
    if completed == total {
        Progress::Complete
    } else if started == 0 {
        Progress::NotStarted
    } else {
        Progress::InProgress {
            completed: completed,
            total: total,
        }
    }
}

/// Read-only progress report: one analyses read per session, no writes.
///
/// Only remote analyses are counted, so a stage skipped by its inputs looks
/// the same as one never started.
pub async fn status(
    gateway: &dyn Gateway,
    operations: &[Operation],
    project: &Project,
    session_limit: Option<usize>,
) -> Result<Vec<SessionStatus>> {
    let sessions = order_sessions(
        gateway.list_sessions(&project.id).await?,
        session_limit
    );
    let mut statuses = Vec::with_capacity(sessions.len());
    for session in sessions {
        let analyses = gateway.session_analyses(&session.id).await?;
        let mut started = vec![];
        let mut completed = vec![];
        for operation in operations {
            match resolve(operation, &analyses) {
                StageState::Absent => {},

                StageState::InProgress(_) => started.push(operation.label.clone()),

                StageState::Complete(_) => {
                    started.push(operation.label.clone());
                    completed.push(operation.label.clone());
                },
            }
        }
        let progress = classify(operations.len(), started.len(), completed.len());
        info!("`{}` ({}): {progress}", session.id, session.label);
        statuses.push(SessionStatus {
            session_id: session.id,
            session_label: session.label,
            started: started,
            completed: completed,
            progress: progress,
        });
    }
    Ok(statuses)
}
