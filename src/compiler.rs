// src/compiler.rs

//! External collaborator seams.
//!
//! The scheduler orders and deduplicates compilations but never performs
//! them: the actual compiler, the per-client bundle setup and the client
//! identity are pluggable. Production code wires the real toolchain here;
//! tests provide fakes that record invocations and script outcomes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bundle::{BundleInputs, CompileBundle, LastSuccessfulResult};
use crate::project::{Project, ProjectName};
use crate::signal::JavaSignal;
use crate::signatures::SignatureStore;
use crate::task::{ready, Promise, SharedTask, TaskResult};

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single compiler diagnostic, opaque to the scheduler beyond severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSummary {
    pub errors: usize,
    pub warnings: usize,
}

/// Sink for structured compilation progress, per client.
///
/// The compiler reports against the mirrored wrapper so that every action is
/// also recorded for replay to deduplicated subscribers (see
/// [`crate::mirror`]).
pub trait Reporter: Send + Sync {
    fn report_start_compilation(&self);
    fn report_start_incremental_cycle(&self, sources: &[PathBuf], output_dirs: &[PathBuf]);
    fn report_problem(&self, problem: &Diagnostic);
    fn publish_diagnostics_summary(&self, summary: DiagnosticsSummary);
    fn report_next_phase(&self, phase: &str);
    fn report_progress(&self, current: u64, total: u64);
    fn report_end_incremental_cycle(&self, duration_ms: u64, succeeded: bool);
    fn report_cancelled(&self);
    fn report_end_compilation(&self, exit_code: i32);
}

/// Sink for freeform log lines, per client.
pub trait BuildLogger: Send + Sync {
    fn error(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn trace(&self, msg: &str);
}

/// Identity of a connected client, plus the per-client location that
/// deduplicated outputs are copied into.
pub trait ClientInfo: Send + Sync {
    /// Stable identifier for log lines.
    fn client_id(&self) -> &str;

    /// Per-client destination directory for a project's class files. Used
    /// for the post-deduplication copy so every subscriber ends up with its
    /// own populated classes directory.
    fn unique_classes_dir_for(&self, project: &Project) -> PathBuf;
}

/// Products of a successful compilation, as seen by dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileProducts {
    /// The previous successful output, readable while the new one is built.
    pub read_only_classes_dir: PathBuf,
    /// The directory the compilation wrote into.
    pub new_classes_dir: PathBuf,
}

/// Tagged outcome of one external compiler invocation.
#[derive(Debug, Clone)]
pub enum CompileResult {
    Ok(CompileProducts),
    Failed(Vec<Diagnostic>),
    Cancelled,
    Blocked(Vec<ProjectName>),
    Empty,
}

/// Outcome carried back from the external compiler, together with the
/// successful record to register (if any) and a handle to background I/O
/// still in flight (e.g. an output copy).
#[derive(Clone)]
pub struct ResultBundle {
    pub result: CompileResult,
    pub successful: Option<Arc<LastSuccessfulResult>>,
    pub background_io: SharedTask<TaskResult<()>>,
}

impl std::fmt::Debug for ResultBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBundle")
            .field("result", &self.result)
            .field("successful", &self.successful)
            .finish()
    }
}

impl ResultBundle {
    pub fn ok(products: CompileProducts, successful: Arc<LastSuccessfulResult>) -> Self {
        Self {
            result: CompileResult::Ok(products),
            successful: Some(successful),
            background_io: ready(Ok(())),
        }
    }

    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            result: CompileResult::Failed(diagnostics),
            successful: None,
            background_io: ready(Ok(())),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            result: CompileResult::Cancelled,
            successful: None,
            background_io: ready(Ok(())),
        }
    }

    pub fn blocked(on: Vec<ProjectName>) -> Self {
        Self {
            result: CompileResult::Blocked(on),
            successful: None,
            background_io: ready(Ok(())),
        }
    }

    pub fn empty() -> Self {
        Self {
            result: CompileResult::Empty,
            successful: None,
            background_io: ready(Ok(())),
        }
    }

    pub fn with_background_io(&self, background_io: SharedTask<TaskResult<()>>) -> Self {
        Self {
            result: self.result.clone(),
            successful: self.successful.clone(),
            background_io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, CompileResult::Cancelled)
    }
}

/// Everything one compiler invocation receives.
pub struct CompileInputs {
    pub bundle: Arc<CompileBundle>,
    /// Reporter tee'd into the bundle's event mirror.
    pub reporter: Arc<dyn Reporter>,
    /// Logger tee'd into the bundle's event mirror.
    pub logger: Arc<dyn BuildLogger>,
    /// Signatures of direct upstreams, concatenated in classpath order.
    /// Empty in sequential mode.
    pub dependency_signatures: SignatureStore,
    /// Pipelined mode only: the compiler completes this with its own pickled
    /// signatures as soon as typechecking finishes.
    pub signatures: Option<Promise<SignatureStore>>,
    /// Pipelined mode only: the compiler completes this when Java code
    /// generation finishes (or fails it).
    pub java_completed: Option<Promise<()>>,
    /// Signal to consult before entering the Java phase. Always `Continue`
    /// in sequential mode.
    pub java_trigger: SharedTask<JavaSignal>,
    /// Whether Java sources compile in a separate, gated phase.
    pub separate_java_and_scala: bool,
    /// Last-successful results of upstream projects, keyed by classes
    /// directory (both new and read-only directories may appear).
    pub dependent_results: HashMap<PathBuf, Arc<LastSuccessfulResult>>,
    /// Products of *direct* upstream compilations, keyed by their new
    /// classes directory.
    pub dependent_products: HashMap<PathBuf, CompileProducts>,
}

/// The external compiler invocation.
///
/// An `Err` here means the compiler blew up instead of producing a result;
/// the traversal wraps it into a `PartialFailure` so graph semantics are
/// preserved and exceptions never escape out of band.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, inputs: CompileInputs) -> anyhow::Result<ResultBundle>;
}

/// Per-client bundle construction.
///
/// Must be deterministic: equal [`BundleInputs`] produce bundles with equal
/// fingerprints, otherwise deduplication cannot work.
#[async_trait]
pub trait BundleFactory: Send + Sync {
    async fn setup(&self, inputs: BundleInputs) -> anyhow::Result<CompileBundle>;
}
