use thiserror::Error;

// failure taxonomy of a batch:
//  - configuration errors are raised before any session work begins
//  - `Skip` is a signal from input construction, not a failure
//  - `Cancelled` unwinds a session task once shutdown is requested
//  - everything else is local to the session that hit it
#[derive(Debug, Error)]
pub enum Error {
    #[error("operation(name=`{gear_name}`, label=`{label}`) rejects its own label")]
    SelfRejectingLabel {
        gear_name: String,
        label: String,
    },

    #[error("operation(name=`{gear_name}`, label=`{label}`) has an invalid gear name")]
    UnknownGear {
        gear_name: String,
        label: String,
    },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no project labeled `{0}`")]
    ProjectNotFound(String),

    #[error("credentials: {0}")]
    Auth(String),

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("skipped: {0}")]
    Skip(String),

    #[error("shutting down")]
    Cancelled,

    #[error("interrupted")]
    Interrupted,

    #[error("no {kind} matching `{selector}`")]
    MissingContainer {
        kind: &'static str,
        selector: String,
    },

    #[error("no file matching `{pattern}` in {container}")]
    NoMatchingFile {
        pattern: String,
        container: String,
    },

    #[error("pattern `{pattern}` is ambiguous in {container}: {matches:?}")]
    AmbiguousFile {
        pattern: String,
        container: String,
        matches: Vec<String>,
    },

    #[error("analysis `{label}` disappeared from session `{session_id}` while waiting")]
    AnalysisVanished {
        session_id: String,
        label: String,
    },

    #[error("{status} for {method} {url}: {body}")]
    Api {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that invalidate the whole batch rather than a single session.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::SelfRejectingLabel { .. }
                | Self::UnknownGear { .. }
                | Self::InvalidPipeline(_)
                | Self::InvalidPattern { .. }
                | Self::ProjectNotFound(_)
                | Self::Auth(_)
                | Self::InvalidUrl(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The error followed by every underlying cause, `: ` separated.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(e) = cause {
            report.push_str(": ");
            report.push_str(&e.to_string());
            cause = e.source();
        }
        report
    }
}
