use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

use glob::Pattern;
use serde_json::{
    Map, Value
};

use crate::{
    error::{Error, Result},
    files::FileRef,
    gateway::{Acquisition, Analysis, Session},
};

/// Predicate recognising the remote analyses that belong to a pipeline stage.
///
/// Literal labels are lifted with [`LabelMatcher::exact`].
#[derive(Clone)]
pub struct LabelMatcher {
    describe: String,
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl LabelMatcher {
    pub fn exact(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            describe: format!("== `{label}`"),
            predicate: Arc::new(move |candidate| candidate == label),
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            describe: format!("starts with `{prefix}`"),
            predicate: Arc::new(move |candidate| candidate.starts_with(prefix.as_str())),
        }
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        let compiled = Pattern::new(pattern)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source: e,
            })?;
        Ok(Self {
            describe: format!("like `{pattern}`"),
            predicate: Arc::new(move |candidate| compiled.matches(candidate)),
        })
    }

    pub fn from_fn<F>(describe: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            describe: describe.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        (self.predicate)(label)
    }
}

impl fmt::Debug for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelMatcher({})", self.describe)
    }
}

impl From<&str> for LabelMatcher {
    fn from(label: &str) -> Self {
        Self::exact(label)
    }
}

impl From<String> for LabelMatcher {
    fn from(label: String) -> Self {
        Self::exact(label)
    }
}

// what a stage hands over for submission: named inputs, plus optional config
// that is merged over the gear's defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInputs {
    pub inputs: BTreeMap<String, FileRef>,

    pub config: Option<Map<String, Value>>,
}

impl StageInputs {
    pub fn new(inputs: BTreeMap<String, FileRef>) -> Self {
        Self {
            inputs: inputs,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn input(mut self, name: impl Into<String>, file: FileRef) -> Self {
        self.inputs.insert(name.into(), file);
        self
    }

    // defaults first, overrides win
    pub fn resolve_config(&self, defaults: Map<String, Value>) -> Map<String, Value> {
        let mut merged = defaults;
        if let Some(overrides) = &self.config {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// Everything a stage may look at when building its inputs.
pub struct InputContext<'a> {
    pub acquisitions: &'a [Acquisition],

    pub analyses: &'a [Analysis],

    pub session: &'a Session,
}

/// Pure input construction for a stage. Returning [`Error::Skip`] marks the
/// stage as not applicable to the session.
pub type CreateInputs = Arc<dyn Fn(&InputContext<'_>) -> Result<StageInputs> + Send + Sync>;

#[derive(Clone)]
pub struct Operation {
    pub gear_name: String,

    pub label: String,

    pub label_matcher: LabelMatcher,

    create_inputs: CreateInputs,
}

impl Operation {
    pub fn create_inputs(&self, context: &InputContext<'_>) -> Result<StageInputs> {
        (self.create_inputs)(context)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("gear_name", &self.gear_name)
            .field("label", &self.label)
            .field("label_matcher", &self.label_matcher)
            .finish()
    }
}

/// Declares one pipeline stage.
///
/// `label` defaults to `gear_name`, `label_matcher` to exact equality with
/// the label. A matcher that rejects the stage's own label is a
/// configuration error.
pub fn define_analysis<F>(
    gear_name: impl Into<String>,
    create_inputs: F,
    label: Option<String>,
    label_matcher: Option<LabelMatcher>,
) -> Result<Operation>
where
    F: Fn(&InputContext<'_>) -> Result<StageInputs> + Send + Sync + 'static,
{
    let gear_name = gear_name.into();
    let label = label.unwrap_or_else(|| gear_name.clone());
    let label_matcher = label_matcher.unwrap_or_else(|| LabelMatcher::exact(label.clone()));
    if !label_matcher.matches(&label) {
        return Err(Error::SelfRejectingLabel {
            gear_name: gear_name,
            label: label,
        });
    }
    Ok(Operation {
        gear_name: gear_name,
        label: label,
        label_matcher: label_matcher,
        create_inputs: Arc::new(create_inputs),
    })
}
