use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use log::{info, warn};

use crate::{
    cancel::{ShutdownToken, DEFAULT_TICK},
    error::{Error, Result},
    gateway::{
        Acquisition, Analysis, AnalysisRequest, Gear, JobState, Session, SharedGateway
    },
    operation::{InputContext, Operation},
    resolver::{resolve, StageState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    // time between two reads of a session's analyses
    pub interval: Duration,

    // granularity at which a sleeping poll notices shutdown
    pub tick: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            tick: DEFAULT_TICK,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,

    // labels submitted by this run
    pub submitted: Vec<String>,

    // labels whose inputs declared the stage inapplicable
    pub skipped: Vec<String>,
}

/// Drives one session through the pipeline stages, in order.
#[derive(Clone)]
pub struct SessionRunner {
    gateway: SharedGateway,
    gears: Arc<HashMap<String, Gear>>,
    poll: PollSettings,
    shutdown: ShutdownToken,
}

impl SessionRunner {
    pub fn new(
        gateway: SharedGateway,
        gears: Arc<HashMap<String, Gear>>,
        poll: PollSettings,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            gateway: gateway,
            gears: gears,
            poll: poll,
            shutdown: shutdown,
        }
    }

    /// Runs every stage of `operations` for `session`.
    ///
    /// Stage N+1 never starts before stage N is complete. Completed stages are
    /// never resubmitted and in-progress ones are only waited for, so a re-run
    /// picks up exactly where the previous one stopped.
    pub async fn run_session(
        &self,
        operations: &[Operation],
        session: &Session
    ) -> Result<SessionSummary> {
        let session_id = session.id.as_str();
        let mut summary = SessionSummary {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        // fetched on first need only; finished sessions never pay for it
        let mut acquisitions: Option<Vec<Acquisition>> = None;
        let mut analyses = self.gateway.session_analyses(session_id).await?;

        for operation in operations {
            match resolve(operation, &analyses) {
                StageState::Complete(_) => continue,

                StageState::InProgress(_) => {
                    info!("waiting for `{}` for session `{}`", operation.label, session_id);
                },

                StageState::Absent => {
                    if acquisitions.is_none() {
                        acquisitions = Some(
                            self.gateway.list_acquisitions(session_id).await?
                        );
                    }
                    let context = InputContext {
                        acquisitions: acquisitions.as_deref().unwrap_or_default(),
                        analyses: &analyses,
                        session: session,
                    };
                    let stage_inputs = match operation.create_inputs(&context) {
                        Ok(s) => s,

                        Err(Error::Skip(reason)) => {
                            info!(
                                "skipping `{}` for session `{}`: {reason}",
                                operation.label,
                                session_id
                            );
                            summary.skipped.push(operation.label.clone());
                            continue;
                        },

                        Err(e) => return Err(e),
                    };
                    info!("starting `{}` for session `{}`", operation.label, session_id);
                    let defaults = self.gears
                        .get(&operation.gear_name)
                        .map(|g| g.default_config())
                        .unwrap_or_default();
                    let request = AnalysisRequest {
                        gear_name: operation.gear_name.clone(),
                        config: stage_inputs.resolve_config(defaults),
                        inputs: stage_inputs.inputs,
                        label: operation.label.clone(),
                    };
                    // no writes once shutdown is requested
                    self.shutdown.check()?;
                    let analysis_id = self.gateway
                        .submit_analysis(session_id, &request)
                        .await?;
                    info!(
                        "submitted `{}` as analysis `{analysis_id}` for session `{}`",
                        operation.label,
                        session_id
                    );
                    summary.submitted.push(operation.label.clone());
                },
            }
            analyses = self.wait_for_analysis(session_id, operation).await?;
        }
        info!("`{session_id}` all analysis complete");
        Ok(summary)
    }

    // polls until the stage's analysis completes; returns the latest analyses
    // so the next stage starts from fresh remote state
    async fn wait_for_analysis(
        &self,
        session_id: &str,
        operation: &Operation
    ) -> Result<Vec<Analysis>> {
        loop {
            let analyses = self.gateway.session_analyses(session_id).await?;
            match resolve(operation, &analyses) {
                StageState::Complete(_) => return Ok(analyses),

                StageState::InProgress(analysis) => {
                    match analysis.state() {
                        Some(state @ (JobState::Failed | JobState::Cancelled)) => {
                            warn!(
                                "`{session_id}` `{}` state `{state}`, still waiting",
                                operation.label
                            );
                        },

                        Some(state) => info!("`{session_id}` `{}` state `{state}`", operation.label),

                        None => info!("`{session_id}` `{}` has no job yet", operation.label),
                    }
                },

                StageState::Absent => {
                    return Err(Error::AnalysisVanished {
                        session_id: session_id.to_string(),
                        label: operation.label.clone(),
                    });
                },
            }
            self.shutdown.check()?;
            self.shutdown
                .sleep(self.poll.interval, self.poll.tick)
                .await?;
        }
    }
}
