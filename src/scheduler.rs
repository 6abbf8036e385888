use std::{
    collections::HashMap,
    sync::Arc,
};

use futures::{
    stream::{
        self,
        FuturesUnordered,
        Stream,
        StreamExt,
    },
    FutureExt,
};
use log::{error, info, warn};
use tokio::{
    sync::Semaphore,
    task::AbortHandle,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    cancel::ShutdownToken,
    error::{Error, Result},
    gateway::{Gear, Project, Session, SharedGateway},
    operation::Operation,
    runner::{PollSettings, SessionRunner, SessionSummary},
};

pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    // sessions processed concurrently; bounds the load put on the remote service
    pub max_workers: usize,

    // process only the first N sessions in timestamp order
    pub session_limit: Option<usize>,

    pub poll: PollSettings,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            session_limit: None,
            poll: PollSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,

    Cancelled,

    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    // in dispatch order
    pub outcomes: Vec<(String, Outcome)>,
}

impl BatchReport {
    pub fn outcome(&self, session_id: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == session_id)
            .map(|(_, o)| o)
    }

    pub fn count(&self, wanted: fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| wanted(o)).count()
    }
}

/// Fans a pipeline out over every session of a project.
pub struct Scheduler {
    gateway: SharedGateway,
    options: BatchOptions,
    shutdown: ShutdownToken,
}

impl Scheduler {
    pub fn new(gateway: SharedGateway, options: BatchOptions) -> Self {
        Self {
            gateway: gateway,
            options: options,
            shutdown: ShutdownToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Runs the batch, stopping cooperatively on ctrl-c. A second ctrl-c
    /// aborts the sessions still running.
    pub async fn run(
        &self,
        operations: Vec<Operation>,
        project: &Project
    ) -> Result<BatchReport> {
        let interrupts = stream::unfold((), |_| async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some(((), ())),

                Err(e) => {
                    warn!("Unable to listen for interrupts: `{e:?}`");
                    None
                },
            }
        });
        self.run_until(operations, project, interrupts).await
    }

    /// Like [`Scheduler::run`], with `interrupts` standing in for ctrl-c.
    ///
    /// On the first interrupt the shutdown flag is set, sessions that have
    /// not started are dropped, running ones unwind at their next poll, and
    /// `Error::Interrupted` is returned after every task has settled. A second
    /// interrupt aborts the tasks still running, e.g. ones stuck in a remote
    /// call.
    pub async fn run_until<S>(
        &self,
        operations: Vec<Operation>,
        project: &Project,
        interrupts: S,
    ) -> Result<BatchReport>
    where
        S: Stream<Item = ()>,
    {
        let gears = self.check_gears(&operations).await?;
        let sessions = self.ordered_sessions(project).await?;
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        info!(
            "Run `{run_id}`: {} operation(s) over {} session(s) of project `{}`, {} worker(s).",
            operations.len(),
            sessions.len(),
            project.label,
            self.options.max_workers
        );

        let operations: Arc<[Operation]> = operations.into();
        let runner = SessionRunner::new(
            self.gateway.clone(),
            Arc::new(gears),
            self.options.poll,
            self.shutdown.clone(),
        );
        let permits = Arc::new(Semaphore::new(self.options.max_workers.max(1)));

        let mut tasks = FuturesUnordered::new();
        let mut aborts: Vec<AbortHandle> = Vec::with_capacity(sessions.len());
        for session in sessions.iter().cloned() {
            let session_id = session.id.clone();
            let runner = runner.clone();
            let operations = operations.clone();
            let permits = permits.clone();
            let shutdown = self.shutdown.clone();
            let span = tracing::info_span!("session", run = %run_id, id = %session.id);
            let handle = tokio::spawn(
                async move {
                    admit_and_run(runner, operations, session, permits, shutdown).await
                }
                .instrument(span)
            );
            aborts.push(handle.abort_handle());
            tasks.push(handle.map(move |joined| (session_id, joined)));
        }

        let mut outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut interrupted = false;
        let mut listening = true;
        futures::pin_mut!(interrupts);
        loop {
            tokio::select! {
                signal = interrupts.next(), if listening => match signal {
                    None => listening = false,

                    Some(()) if !interrupted => {
                        warn!("stopping work...");
                        interrupted = true;
                        self.shutdown.cancel();
                        // queued tasks wake up, see the flag and bail out
                        permits.close();
                    },

                    Some(()) => {
                        warn!("interrupted again, aborting running sessions");
                        listening = false;
                        for handle in &aborts {
                            handle.abort();
                        }
                    },
                },

                finished = tasks.next() => match finished {
                    None => break,

                    Some((session_id, joined)) => {
                        let outcome = match joined {
                            Ok(Ok(_)) => Outcome::Completed,

                            Ok(Err(e)) if e.is_cancellation() => Outcome::Cancelled,

                            Ok(Err(e)) => {
                                error!("Session `{session_id}` failed: {}", e.report());
                                Outcome::Failed(e.to_string())
                            },

                            Err(join_err) if join_err.is_cancelled() => Outcome::Cancelled,

                            Err(join_err) => {
                                error!("Session `{session_id}` task aborted: `{join_err:?}`");
                                Outcome::Failed(join_err.to_string())
                            },
                        };
                        outcomes.insert(session_id, outcome);
                    },
                },
            }
        }

        let report = BatchReport {
            outcomes: sessions
                .iter()
                .filter_map(|s| outcomes.remove(&s.id).map(|o| (s.id.clone(), o)))
                .collect(),
        };
        info!(
            "Run `{run_id}` finished: {} complete, {} failed, {} cancelled.",
            report.count(|o| *o == Outcome::Completed),
            report.count(|o| matches!(o, Outcome::Failed(_))),
            report.count(|o| *o == Outcome::Cancelled),
        );
        if interrupted {
            return Err(Error::Interrupted);
        }
        Ok(report)
    }

    // every operation must name a gear the instance knows about
    async fn check_gears(&self, operations: &[Operation]) -> Result<HashMap<String, Gear>> {
        let gears_by_name: HashMap<String, Gear> = self.gateway
            .list_gears()
            .await?
            .into_iter()
            .map(|g| (g.name.clone(), g))
            .collect();
        for operation in operations {
            if false == gears_by_name.contains_key(&operation.gear_name) {
                return Err(Error::UnknownGear {
                    gear_name: operation.gear_name.clone(),
                    label: operation.label.clone(),
                });
            }
        }
        Ok(gears_by_name)
    }

    async fn ordered_sessions(&self, project: &Project) -> Result<Vec<Session>> {
        let sessions = self.gateway.list_sessions(&project.id).await?;
        Ok(order_sessions(sessions, self.options.session_limit))
    }
}

// pool slot first; a task still queued at shutdown never starts
async fn admit_and_run(
    runner: SessionRunner,
    operations: Arc<[Operation]>,
    session: Session,
    permits: Arc<Semaphore>,
    shutdown: ShutdownToken,
) -> Result<SessionSummary> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| Error::Cancelled)?;
    shutdown.check()?;
    runner.run_session(&operations, &session).await
}

// timestamp ascending (undated first), id as tie breaker, so a session limit
// selects the same subset on every run
pub fn order_sessions(mut sessions: Vec<Session>, limit: Option<usize>) -> Vec<Session> {
    sessions.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(n) = limit {
        sessions.truncate(n);
    }
    sessions
}
