// src/errors.rs

//! Crate-wide error types.
//!
//! Two layers: [`SchedulerError`] for fallible operations with a caller
//! (graph construction, setup), and [`FailureCause`] for failures that are
//! *results* rather than errors. The latter travel through the result DAG
//! as `PartialFailure` nodes and feed `blocked_by` for descendants.

use thiserror::Error;

use crate::project::ProjectName;
use crate::task::TaskError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("project graph error: {0}")]
    Graph(String),

    #[error("cycle detected in project graph involving '{0}'")]
    GraphCycle(ProjectName),

    #[error("project '{project}' has unknown dependency '{dependency}'")]
    UnknownDependency {
        project: ProjectName,
        dependency: ProjectName,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why a node of the result DAG is not a success.
///
/// These are first-class results: they are matched exhaustively by the
/// schedulers and never thrown across the traversal boundary.
#[derive(Debug, Clone, Error)]
pub enum FailureCause {
    /// The external compiler reported a failed compilation.
    #[error("compilation failed")]
    Compiler,

    /// At least one direct upstream project failed or was itself blocked.
    #[error("blocked by failed upstream projects {0:?}")]
    Blocked(Vec<ProjectName>),

    /// The compilation task was cancelled.
    #[error("compilation was cancelled")]
    Cancelled,

    /// A pipelined upstream failed before publishing its type signatures.
    #[error("upstream failed before publishing signatures: {0}")]
    SignaturePromise(TaskError),

    /// Copying deduplicated outputs into a subscriber's classes directory
    /// failed. Reported to the subscribing client only.
    #[error("deduplicated output copy failed: {0}")]
    DeduplicationIo(TaskError),

    /// The external compiler blew up instead of returning a result.
    #[error("internal compiler error: {0}")]
    Internal(TaskError),
}
