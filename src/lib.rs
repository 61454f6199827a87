// src/lib.rs

//! Compilation DAG scheduler for an incremental JVM build server.
//!
//! Given a DAG of projects, [`graph::CompileGraph::traverse`] schedules
//! per-project compilations so that:
//!
//! - dependencies compile before dependents (or, in pipelined mode,
//!   dependents start as soon as upstream type signatures are available
//!   while upstream code generation continues);
//! - identical compilations issued concurrently by different clients are
//!   deduplicated to a single executing task whose diagnostics, progress
//!   and log events are replayed to every subscriber;
//! - the last successful output directory of each project is reference
//!   counted across clients and deleted exactly once it is superseded and
//!   unreferenced;
//! - downstream projects are marked blocked, never attempted, when any
//!   transitive dependency failed.
//!
//! The compiler invocation itself, the per-client bundle setup and the
//! client identity are external collaborators (see [`compiler`]); the
//! embedding server owns configuration, the wire protocol and the CLI.

pub mod bundle;
pub mod compiler;
pub mod dag;
pub mod errors;
pub mod fingerprint;
pub mod fsops;
pub mod graph;
pub mod logging;
pub mod mirror;
pub mod project;
pub mod signal;
pub mod signatures;
pub mod state;
pub mod task;

pub use bundle::{BundleInputs, CompileAnalysis, CompileBundle, CompileOutPaths, LastSuccessfulResult};
pub use compiler::{
    BuildLogger, BundleFactory, ClientInfo, CompileInputs, CompileProducts, CompileResult,
    Compiler, Diagnostic, DiagnosticsSummary, Reporter, ResultBundle, Severity,
};
pub use dag::{blocked_by, Dag, PartialCompileResult, PartialFailure, PartialSuccess, ResultDag};
pub use errors::{FailureCause, Result, SchedulerError};
pub use fingerprint::CompileFingerprint;
pub use graph::CompileGraph;
pub use project::{Project, ProjectConfig, ProjectName};
pub use signal::JavaSignal;
pub use signatures::{PickledSignatures, SignatureStore};
pub use state::SchedulerState;
pub use task::{Promise, SharedTask, TaskError, TaskResult};
