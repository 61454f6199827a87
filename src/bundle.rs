// src/bundle.rs

//! Per-invocation compile bundles and last-successful results.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::compiler::{BuildLogger, ClientInfo, Diagnostic, Reporter};
use crate::fingerprint::CompileFingerprint;
use crate::mirror::{EventMirror, MirroringLogger, MirroringReporter};
use crate::project::{Project, ProjectName};
use crate::task::{ready, SharedTask, TaskResult};

/// What a [`crate::compiler::BundleFactory`] receives to build a bundle.
pub struct BundleInputs {
    pub project: Arc<Project>,
    pub client: Arc<dyn ClientInfo>,
}

/// Output directories of one compilation: the previous successful output
/// (readable while compiling) and the fresh directory being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutPaths {
    pub read_only_classes_dir: PathBuf,
    pub new_classes_dir: PathBuf,
}

/// Analysis attached to a successful compilation. The scheduler only uses
/// the recorded problems, to reconstruct compiler output for deduplicated
/// subscribers.
#[derive(Debug, Clone, Default)]
pub struct CompileAnalysis {
    pub problems: Vec<Diagnostic>,
}

/// The most recent successful compilation of a project.
///
/// `populating_products` is the idempotent, memoized asynchronous action
/// that makes the class files under `classes_dir` visible to later readers.
/// It may run zero, one or many times per record; it must complete before
/// the directory can be safely deleted.
pub struct LastSuccessfulResult {
    pub project: ProjectName,
    pub classes_dir: PathBuf,
    pub analysis: Option<Arc<CompileAnalysis>>,
    populating: Mutex<SharedTask<TaskResult<()>>>,
    empty: bool,
}

impl LastSuccessfulResult {
    pub fn new(
        project: impl Into<ProjectName>,
        classes_dir: PathBuf,
        analysis: Option<Arc<CompileAnalysis>>,
        populating: SharedTask<TaskResult<()>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            project: project.into(),
            classes_dir,
            analysis,
            populating: Mutex::new(populating),
            empty: false,
        })
    }

    /// A fresh record standing in for "never compiled successfully". Its
    /// classes directory never exists on disk and is never deleted.
    pub fn empty(project: &Project) -> Arc<Self> {
        Arc::new(Self {
            project: project.name.clone(),
            classes_dir: project.empty_classes_dir(),
            analysis: None,
            populating: Mutex::new(ready(Ok(()))),
            empty: true,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// The current populating action. Awaiting the returned handle runs the
    /// action at most once; the result is cached for later callers.
    pub fn populating_products(&self) -> SharedTask<TaskResult<()>> {
        self.populating.lock().clone()
    }

    /// Swap in a composite populating action (populate-then-delete-orphan).
    pub(crate) fn replace_populating_products(&self, task: SharedTask<TaskResult<()>>) {
        *self.populating.lock() = task;
    }
}

impl std::fmt::Debug for LastSuccessfulResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastSuccessfulResult")
            .field("project", &self.project)
            .field("classes_dir", &self.classes_dir)
            .field("empty", &self.empty)
            .finish()
    }
}

/// Per-invocation context: the project, its fingerprint, the client's
/// reporter and logger, the most recent successful result, and the event
/// mirror shared with deduplicated subscribers.
pub struct CompileBundle {
    pub project: Arc<Project>,
    pub fingerprint: CompileFingerprint,
    pub reporter: Arc<dyn Reporter>,
    pub logger: Arc<dyn BuildLogger>,
    pub latest_result: Arc<LastSuccessfulResult>,
    /// Whether the previous compilation of this project produced an `Empty`
    /// result, in which case the last successful record is not reusable.
    pub previous_was_empty: bool,
    pub mirror: EventMirror,
    pub out: CompileOutPaths,
}

impl CompileBundle {
    pub fn new(
        project: Arc<Project>,
        reporter: Arc<dyn Reporter>,
        logger: Arc<dyn BuildLogger>,
    ) -> Self {
        let fingerprint = CompileFingerprint::of(&project);
        let latest_result = LastSuccessfulResult::empty(&project);
        let out = CompileOutPaths {
            read_only_classes_dir: latest_result.classes_dir.clone(),
            new_classes_dir: project.new_classes_dir(fingerprint.short()),
        };
        Self {
            project,
            fingerprint,
            reporter,
            logger,
            latest_result,
            previous_was_empty: false,
            mirror: EventMirror::new(),
            out,
        }
    }

    /// Rebind the bundle to the last successful result chosen by the
    /// deduplication registry, updating the read-only output path to match.
    pub(crate) fn with_latest_result(&self, latest: Arc<LastSuccessfulResult>) -> Self {
        let out = CompileOutPaths {
            read_only_classes_dir: latest.classes_dir.clone(),
            new_classes_dir: self.out.new_classes_dir.clone(),
        };
        Self {
            project: self.project.clone(),
            fingerprint: self.fingerprint.clone(),
            reporter: self.reporter.clone(),
            logger: self.logger.clone(),
            latest_result: latest,
            previous_was_empty: self.previous_was_empty,
            mirror: self.mirror.clone(),
            out,
        }
    }

    /// Reporter handed to the compiler: tees into the mirror, then forwards
    /// to the client's reporter.
    pub fn mirrored_reporter(&self) -> Arc<dyn Reporter> {
        MirroringReporter::new(self.reporter.clone(), self.mirror.clone())
    }

    pub fn mirrored_logger(&self) -> Arc<dyn BuildLogger> {
        MirroringLogger::new(self.logger.clone(), self.mirror.clone())
    }
}
