// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Steward - runs the assembly pipeline and commits its result
//!
//! A run lists source files, fans per-file header work out through an
//! [`Executor`], reduces each variable with the `vref` merger, assembles
//! the dataset and commits it to a `catalog` repository. Every input to
//! a run arrives through an immutable [`PipelineConfig`] and injected
//! collaborators; nothing survives between runs.

use std::fmt;
use thiserror::Error;
use vref::ErrorClass;

mod cache;
mod config;
mod executor;
mod pipeline;
mod retry;
mod sources;

pub use cache::{NoTransientCache, ScratchDirectory, TransientCache};
pub use config::{
    AttributeConfig, CommitPolicy, ContainerSpec, CoordinateConfig, ExecutorConfig, ListingSpec,
    NamingConfig, Ordering, PipelineConfig, SourcesConfig,
};
pub use executor::{
    Executor, InlineExecutor, TaskFuture, TaskHandle, TokioExecutor, join_collect, join_fail_fast,
};
pub use pipeline::{Pipeline, RunReport};
pub use retry::commit_with_retry;
pub use sources::{
    DescriptorInspector, ObjectStoreListing, SourceInspector, SourceLister, StaticListing,
    lister_for,
};

pub type Result<T> = std::result::Result<T, StewardError>;

/// One failed task of a fan-out, named by what it was working on
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: StewardError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.error)
    }
}

#[derive(Debug, Error)]
pub enum StewardError {
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml_ng::Error),

    #[error("No source files listed")]
    NoSources,

    #[error("No descriptor for source {0}")]
    SourceNotDescribed(String),

    #[error("Source {url} has no data variable matching {expected}")]
    VariableNotFound { url: String, expected: String },

    #[error("Task {0} was cancelled")]
    TaskCancelled(String),

    #[error("Task {task} panicked: {detail}")]
    TaskPanicked { task: String, detail: String },

    #[error("{task}: {source}")]
    Task {
        task: String,
        #[source]
        source: Box<StewardError>,
    },

    #[error("{} input error(s):{}", .0.len(), render_failures(.0))]
    InputErrors(Vec<TaskFailure>),

    #[error("Transient cache reset failed for {path}: {source}")]
    CacheReset {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest error: {0}")]
    Manifest(#[from] vref::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_failures(failures: &[TaskFailure]) -> String {
    failures.iter().map(|f| format!("\n  {f}")).collect()
}

impl StewardError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            StewardError::Manifest(e) => e.class(),
            StewardError::Catalog(e) => e.class(),
            StewardError::Task { source, .. } => source.class(),
            StewardError::InvalidConfig { .. }
            | StewardError::ConfigParse(_)
            | StewardError::NoSources
            | StewardError::SourceNotDescribed(_)
            | StewardError::VariableNotFound { .. }
            | StewardError::InputErrors(_)
            | StewardError::Url(_) => ErrorClass::Input,
            _ => ErrorClass::Store,
        }
    }

    /// Wrap with the name of the task that raised it.
    #[must_use]
    pub fn in_task(self, task: &str) -> Self {
        match self {
            e @ (StewardError::Task { .. } | StewardError::TaskCancelled(_)) => e,
            e => StewardError::Task {
                task: task.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// The error with any task wrapping removed
    #[must_use]
    pub fn root(&self) -> &StewardError {
        match self {
            StewardError::Task { source, .. } => source.root(),
            e => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_follows_wrapped_error() {
        let e = StewardError::from(vref::Error::EmptyInput("x".into())).in_task("RZSM");
        assert_eq!(e.class(), ErrorClass::Consistency);
        assert!(matches!(e.root(), StewardError::Manifest(_)));
        assert!(e.to_string().starts_with("RZSM: "));

        let e = StewardError::SourceNotDescribed("s3://b/a.nc".into()).in_task("a");
        assert_eq!(e.class(), ErrorClass::Input);
        // already named tasks keep their first name
        assert!(e.in_task("b").to_string().starts_with("a: "));
    }

    #[test]
    fn test_input_errors_list_every_failure() {
        let e = StewardError::InputErrors(vec![
            TaskFailure {
                task: "RZSM".into(),
                error: StewardError::SourceNotDescribed("a".into()),
            },
            TaskFailure {
                task: "SWE".into(),
                error: StewardError::SourceNotDescribed("b".into()),
            },
        ]);
        let text = e.to_string();
        assert!(text.starts_with("2 input error(s):"));
        assert!(text.contains("RZSM: No descriptor for source a"));
        assert!(text.contains("SWE: No descriptor for source b"));
    }
}
