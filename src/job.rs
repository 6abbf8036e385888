use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use serde_json::{
    Map, Value
};

use crate::{
    error::{Error, Result},
    files::{find_acquisition, find_analysis, find_measurement, FileContainer},
    operation::{define_analysis, InputContext, LabelMatcher, Operation, StageInputs},
    runner::PollSettings,
    scheduler::BatchOptions,
};

// where an input file is picked from; exactly one selector per input
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSchema {
    // acquisition label
    pub acquisition: Option<String>,

    // acquisition measurement, e.g. "diffusion"
    pub measurement: Option<String>,

    // label of an analysis produced by an earlier stage
    pub analysis: Option<String>,

    pub pattern: String,

    // no match => input left out
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSchema {
    pub gear: String,

    pub label: Option<String>,

    // glob over analysis labels, must accept `label`
    pub label_pattern: Option<String>,

    // a missing container skips the stage instead of failing the session
    #[serde(default)]
    pub skip_if_missing: bool,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputSchema>,

    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

// job template as read in(e.g. from disk)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub title: Option<String>,

    // project label
    pub project: String,

    pub session_limit: Option<usize>,

    pub max_workers: Option<usize>,

    // in seconds
    pub poll_interval_secs: Option<u64>,

    #[serde(rename = "stage", default)]
    pub stages: Vec<StageSchema>,
}

#[derive(Debug)]
pub struct Job {
    pub title: String,

    pub schema: Schema,
}

impl Job {
    pub fn from_file(path: &Path) -> Result<Job> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn from_toml(raw: &str) -> Result<Job> {
        let schema: Schema = toml::from_str(raw)?;
        if schema.stages.is_empty() {
            return Err(Error::InvalidPipeline("no stages declared".to_string()));
        }
        // a zero interval would poll the remote service back to back
        if schema.poll_interval_secs == Some(0) {
            return Err(Error::InvalidPipeline(
                "`poll_interval_secs` must be at least 1".to_string()
            ));
        }
        Ok(Job {
            title: schema.title
                .clone()
                .unwrap_or_else(|| schema.project.clone()),
            schema: schema,
        })
    }

    pub fn batch_options(&self) -> BatchOptions {
        let defaults = BatchOptions::default();
        BatchOptions {
            max_workers: self.schema.max_workers.unwrap_or(defaults.max_workers),
            session_limit: self.schema.session_limit,
            poll: PollSettings {
                interval: self.schema.poll_interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.poll.interval),
                ..defaults.poll
            },
        }
    }

    // the declared stages, in order, as pipeline operations
    pub fn operations(&self) -> Result<Vec<Operation>> {
        self.schema.stages
            .iter()
            .map(stage_operation)
            .collect()
    }
}

enum Selector {
    Acquisition(LabelMatcher),
    Measurement(String),
    Analysis(LabelMatcher),
}

struct Binding {
    name: String,
    selector: Selector,
    describe: String,
    pattern: String,
    optional: bool,
}

fn binding(name: &str, input: &InputSchema) -> Result<Binding> {
    let selector = match (&input.acquisition, &input.measurement, &input.analysis) {
        (Some(label), None, None) => Selector::Acquisition(LabelMatcher::exact(label.clone())),
        (None, Some(measurement), None) => Selector::Measurement(measurement.clone()),
        (None, None, Some(label)) => Selector::Analysis(LabelMatcher::exact(label.clone())),
        _ => {
            return Err(Error::InvalidPipeline(format!(
                "input `{name}` needs exactly one of `acquisition`, `measurement` or `analysis`"
            )));
        },
    };
    let describe = input.acquisition
        .as_ref()
        .or(input.measurement.as_ref())
        .or(input.analysis.as_ref())
        .cloned()
        .unwrap_or_default();
    // reject bad globs up front rather than per session
    glob::Pattern::new(&input.pattern)
        .map_err(|e| Error::InvalidPattern {
            pattern: input.pattern.clone(),
            source: e,
        })?;
    Ok(Binding {
        name: name.to_string(),
        selector: selector,
        describe: describe,
        pattern: input.pattern.clone(),
        optional: input.optional,
    })
}

impl Binding {
    fn container<'a>(&self, context: &'a InputContext<'_>) -> Option<&'a dyn FileContainer> {
        match &self.selector {
            Selector::Acquisition(m) => find_acquisition(context.acquisitions, m)
                .map(|a| a as &dyn FileContainer),
            Selector::Measurement(m) => find_measurement(context.acquisitions, m)
                .map(|a| a as &dyn FileContainer),
            Selector::Analysis(m) => find_analysis(context.analyses, m)
                .map(|a| a as &dyn FileContainer),
        }
    }

    fn kind(&self) -> &'static str {
        match self.selector {
            Selector::Acquisition(_) | Selector::Measurement(_) => "acquisition",
            Selector::Analysis(_) => "analysis",
        }
    }
}

fn stage_operation(stage: &StageSchema) -> Result<Operation> {
    let bindings = stage.inputs
        .iter()
        .map(|(name, input)| binding(name, input))
        .collect::<Result<Vec<_>>>()?;
    let matcher = match &stage.label_pattern {
        Some(pattern) => Some(LabelMatcher::glob(pattern)?),
        None => None,
    };
    let config = stage.config.clone();
    let skip_if_missing = stage.skip_if_missing;

    let create_inputs = move |context: &InputContext<'_>| -> Result<StageInputs> {
        let mut inputs = StageInputs::default();
        for b in &bindings {
            let container = match b.container(context) {
                Some(c) => c,

                None if skip_if_missing => {
                    return Err(Error::Skip(format!("no {} `{}`", b.kind(), b.describe)));
                },

                None => {
                    return Err(Error::MissingContainer {
                        kind: b.kind(),
                        selector: b.describe.clone(),
                    });
                },
            };
            let file = if b.optional {
                container.find_file_opt(&b.pattern)?
            } else {
                Some(container.find_file(&b.pattern)?)
            };
            if let Some(file) = file {
                inputs = inputs.input(b.name.clone(), file);
            }
        }
        if let Some(config) = &config {
            inputs = inputs.with_config(config.clone());
        }
        Ok(inputs)
    };
    define_analysis(stage.gear.clone(), create_inputs, stage.label.clone(), matcher)
}
