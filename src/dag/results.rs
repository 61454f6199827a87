// src/dag/results.rs

//! The result DAG and its algebra.
//!
//! A traversal yields a result DAG isomorphic to the input DAG: same shape,
//! same node identity, with `Aggregate` nodes becoming parents of an `Empty`
//! placeholder. [`blocked_by`] decides whether a dependent may run.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bundle::CompileBundle;
use crate::compiler::ResultBundle;
use crate::errors::FailureCause;
use crate::project::{Project, ProjectName};
use crate::signal::JavaSignal;
use crate::signatures::SignatureStore;
use crate::task::{ready, SharedTask, TaskResult};

/// A compilation that is proceeding or done.
///
/// In pipelined mode this node exists as soon as the project's signatures
/// are available, while `result` may still be running. The node is pure
/// value data referencing the bundle by shared ownership; the bundle never
/// points back into the result DAG.
pub struct PartialSuccess {
    pub bundle: Arc<CompileBundle>,
    /// Signatures this project publishes to its dependents. Empty in
    /// sequential mode.
    pub signatures: SignatureStore,
    /// One-shot signal that this project's Java code generation finished.
    /// Pre-completed in sequential mode.
    pub java_completed: SharedTask<TaskResult<()>>,
    /// The aggregated upstream signal this project's compile consults before
    /// entering its Java phase.
    pub java_trigger: SharedTask<JavaSignal>,
    /// The memoized compilation outcome. Late subscribers join this task.
    pub result: SharedTask<TaskResult<Arc<ResultBundle>>>,
}

impl PartialSuccess {
    /// Same node with a different result task (finalized or per-client
    /// enriched variants).
    pub(crate) fn with_result(
        &self,
        result: SharedTask<TaskResult<Arc<ResultBundle>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bundle: self.bundle.clone(),
            signatures: self.signatures.clone(),
            java_completed: self.java_completed.clone(),
            java_trigger: self.java_trigger.clone(),
            result,
        })
    }
}

pub struct PartialFailure {
    pub project: Arc<Project>,
    pub cause: FailureCause,
    pub result: SharedTask<TaskResult<Arc<ResultBundle>>>,
}

impl PartialFailure {
    pub fn new(
        project: Arc<Project>,
        cause: FailureCause,
        result: ResultBundle,
    ) -> Arc<Self> {
        Arc::new(Self {
            project,
            cause,
            result: ready(Ok(Arc::new(result))),
        })
    }

    pub fn with_result_task(
        project: Arc<Project>,
        cause: FailureCause,
        result: SharedTask<TaskResult<Arc<ResultBundle>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            project,
            cause,
            result,
        })
    }
}

/// Tagged outcome at one node of the result DAG.
#[derive(Clone)]
pub enum PartialCompileResult {
    /// Placeholder for aggregate nodes.
    Empty,
    Success(Arc<PartialSuccess>),
    Failure(Arc<PartialFailure>),
    Failures(Vec<Arc<PartialFailure>>),
}

/// Result DAG node: same shape as the input DAG.
pub enum ResultDag {
    Leaf(PartialCompileResult),
    Parent(PartialCompileResult, Vec<Arc<ResultDag>>),
}

impl ResultDag {
    pub fn result(&self) -> &PartialCompileResult {
        match self {
            ResultDag::Leaf(result) => result,
            ResultDag::Parent(result, _) => result,
        }
    }

    pub fn children(&self) -> &[Arc<ResultDag>] {
        match self {
            ResultDag::Leaf(_) => &[],
            ResultDag::Parent(_, children) => children,
        }
    }

    /// Same node with a different root result, children untouched.
    pub(crate) fn with_root_result(&self, result: PartialCompileResult) -> ResultDag {
        match self {
            ResultDag::Leaf(_) => ResultDag::Leaf(result),
            ResultDag::Parent(_, children) => ResultDag::Parent(result, children.clone()),
        }
    }
}

/// The project blocking this DAG, if any.
///
/// Returns `Some` iff the root is a failure or contains failures. Aggregate
/// placeholders are transparent: their children are inspected left to right
/// and the first blocked child wins.
pub fn blocked_by(dag: &ResultDag) -> Option<Arc<Project>> {
    match dag.result() {
        PartialCompileResult::Success(_) => None,
        PartialCompileResult::Failure(failure) => Some(failure.project.clone()),
        PartialCompileResult::Failures(failures) => {
            failures.first().map(|failure| failure.project.clone())
        }
        PartialCompileResult::Empty => {
            // Walk the remaining children only, so detection terminates and
            // the leftmost blocked child is reported.
            for child in dag.children() {
                if let Some(project) = blocked_by(child) {
                    return Some(project);
                }
            }
            None
        }
    }
}

/// Names of the direct children that are blocked or failed, left to right.
/// Aggregate children are transparent.
pub fn direct_failed_projects(children: &[Arc<ResultDag>]) -> Vec<ProjectName> {
    let mut failed = Vec::new();
    for child in children {
        match child.result() {
            PartialCompileResult::Failure(failure) => {
                failed.push(failure.project.name.clone());
            }
            PartialCompileResult::Failures(failures) => {
                failed.extend(failures.iter().map(|f| f.project.name.clone()));
            }
            PartialCompileResult::Empty => {
                failed.extend(direct_failed_projects(child.children()));
            }
            PartialCompileResult::Success(_) => {}
        }
    }
    failed
}

/// All transitive successes of a DAG, deduplicated by project, children
/// before parents.
pub fn collect_successes(dag: &Arc<ResultDag>) -> Vec<Arc<PartialSuccess>> {
    let mut seen: HashSet<ProjectName> = HashSet::new();
    let mut successes = Vec::new();
    collect_successes_into(dag, &mut seen, &mut successes);
    successes
}

/// Transitive successes across a set of sibling DAGs, deduplicated by
/// project across the whole set.
pub fn collect_successes_from(children: &[Arc<ResultDag>]) -> Vec<Arc<PartialSuccess>> {
    let mut seen: HashSet<ProjectName> = HashSet::new();
    let mut successes = Vec::new();
    for child in children {
        collect_successes_into(child, &mut seen, &mut successes);
    }
    successes
}

/// Successes at the roots of the given siblings. Aggregate placeholders are
/// transparent: their children count as direct.
pub fn direct_successes(children: &[Arc<ResultDag>]) -> Vec<Arc<PartialSuccess>> {
    let mut successes = Vec::new();
    for child in children {
        match child.result() {
            PartialCompileResult::Success(success) => successes.push(success.clone()),
            PartialCompileResult::Empty => {
                successes.extend(direct_successes(child.children()));
            }
            _ => {}
        }
    }
    successes
}

fn collect_successes_into(
    dag: &Arc<ResultDag>,
    seen: &mut HashSet<ProjectName>,
    successes: &mut Vec<Arc<PartialSuccess>>,
) {
    for child in dag.children() {
        collect_successes_into(child, seen, successes);
    }
    if let PartialCompileResult::Success(success) = dag.result() {
        if seen.insert(success.bundle.project.name.clone()) {
            successes.push(success.clone());
        }
    }
}

/// Whether any node of the DAG observed a cancellation.
pub fn contains_cancelled(dag: &ResultDag) -> bool {
    let root = match dag.result() {
        PartialCompileResult::Failure(failure) => {
            matches!(failure.cause, FailureCause::Cancelled)
        }
        PartialCompileResult::Failures(failures) => failures
            .iter()
            .any(|f| matches!(f.cause, FailureCause::Cancelled)),
        PartialCompileResult::Success(success) => match success.result.peek() {
            Some(Ok(bundle)) => bundle.is_cancelled(),
            _ => false,
        },
        PartialCompileResult::Empty => false,
    };
    root || dag.children().iter().any(|child| contains_cancelled(child))
}
