use glob::Pattern;
use serde::{
    Serialize, Deserialize
};

use crate::{
    error::{Error, Result},
    gateway::{Acquisition, Analysis, FileEntry},
    operation::LabelMatcher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Acquisition,
    Analysis,
}

// a file as a job input refers to it: owner container + file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "type")]
    pub kind: ContainerKind,

    pub id: String,

    pub name: String,
}

/// Uniform read view over the files of an acquisition or an analysis.
///
/// Patterns are shell globs (`*` also crosses `/`) and must select a single
/// file: several matches are always an error.
pub trait FileContainer {
    fn kind(&self) -> ContainerKind;

    fn container_id(&self) -> &str;

    fn container_label(&self) -> &str;

    fn files(&self) -> &[FileEntry];

    /// `Ok(None)` when nothing matches.
    fn find_file_opt(&self, pattern: &str) -> Result<Option<FileRef>> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source: e,
            })?;
        let matches: Vec<&FileEntry> = self.files()
            .iter()
            .filter(|f| matcher.matches(&f.name))
            .collect();
        match matches.as_slice() {
            [] => Ok(None),

            [only] => Ok(Some(FileRef {
                kind: self.kind(),
                id: self.container_id().to_string(),
                name: only.name.clone(),
            })),

            _ => Err(Error::AmbiguousFile {
                pattern: pattern.to_string(),
                container: describe(self),
                matches: matches.iter().map(|f| f.name.clone()).collect(),
            }),
        }
    }

    fn find_file(&self, pattern: &str) -> Result<FileRef> {
        self.find_file_opt(pattern)?
            .ok_or_else(|| Error::NoMatchingFile {
                pattern: pattern.to_string(),
                container: describe(self),
            })
    }

    fn find_file_or(&self, pattern: &str, default: FileRef) -> Result<FileRef> {
        Ok(self.find_file_opt(pattern)?.unwrap_or(default))
    }
}

fn describe<C: FileContainer + ?Sized>(container: &C) -> String {
    let kind = match container.kind() {
        ContainerKind::Acquisition => "acquisition",
        ContainerKind::Analysis => "analysis",
    };
    format!("{kind} `{}`({})", container.container_label(), container.container_id())
}

impl FileContainer for Acquisition {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Acquisition
    }

    fn container_id(&self) -> &str {
        &self.id
    }

    fn container_label(&self) -> &str {
        &self.label
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

impl FileContainer for Analysis {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Analysis
    }

    fn container_id(&self) -> &str {
        &self.id
    }

    fn container_label(&self) -> &str {
        &self.label
    }

    fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

// lookups used by input construction; first match wins

pub fn find_analysis<'a>(
    analyses: &'a [Analysis],
    matcher: &LabelMatcher
) -> Option<&'a Analysis> {
    analyses.iter().find(|a| matcher.matches(&a.label))
}

pub fn find_acquisition<'a>(
    acquisitions: &'a [Acquisition],
    matcher: &LabelMatcher
) -> Option<&'a Acquisition> {
    acquisitions.iter().find(|a| matcher.matches(&a.label))
}

pub fn find_measurement<'a>(
    acquisitions: &'a [Acquisition],
    measurement: &str
) -> Option<&'a Acquisition> {
    acquisitions
        .iter()
        .find(|a| a.measurement.as_deref() == Some(measurement))
}
