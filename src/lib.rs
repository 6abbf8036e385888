#![doc = include_str!("../README.md")]

pub mod cancel;
pub mod config;
pub mod error;
pub mod files;
pub mod gateway;
pub mod http;
pub mod job;
pub mod operation;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod status;

pub use cancel::ShutdownToken;
pub use error::{Error, Result};
pub use files::{ContainerKind, FileContainer, FileRef};
pub use gateway::{
    Acquisition, Analysis, AnalysisRequest, Gateway, Gear, JobState, Project, Session,
    SharedGateway,
};
pub use operation::{define_analysis, InputContext, LabelMatcher, Operation, StageInputs};
pub use resolver::{resolve, StageState};
pub use runner::{PollSettings, SessionRunner, SessionSummary};
pub use scheduler::{BatchOptions, BatchReport, Outcome, Scheduler};
pub use status::{status, Progress, SessionStatus, StatusSummary};
