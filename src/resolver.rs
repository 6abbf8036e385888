use crate::{
    files::find_analysis,
    gateway::Analysis,
    operation::Operation,
};

// where a session stands with respect to one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageState<'a> {
    // nothing submitted yet
    Absent,

    // submitted, not finished successfully (yet)
    InProgress(&'a Analysis),

    Complete(&'a Analysis),
}

impl<'a> StageState<'a> {
    pub fn analysis(&self) -> Option<&'a Analysis> {
        match self {
            StageState::Absent => None,
            StageState::InProgress(a) | StageState::Complete(a) => Some(a),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StageState::Complete(_))
    }
}

// first analysis accepted by the stage's matcher wins; only a `complete` job
// counts as done, any other state (including failed) is still in progress
pub fn resolve<'a>(operation: &Operation, analyses: &'a [Analysis]) -> StageState<'a> {
    match find_analysis(analyses, &operation.label_matcher) {
        None => StageState::Absent,

        Some(analysis) if analysis.is_complete() => StageState::Complete(analysis),

        Some(analysis) => StageState::InProgress(analysis),
    }
}
