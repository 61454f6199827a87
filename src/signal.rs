// src/signal.rs

//! The Java gating signal threaded through pipelined traversals.
//!
//! In pipelined mode a dependent may start compiling against upstream type
//! signatures while upstream Java code generation is still running. Before
//! entering its own Java phase the dependent consults its [`JavaSignal`]:
//! `Continue` means every upstream finished Java successfully, `FailFast`
//! names the upstream projects whose Java phase failed.

use futures::future::join_all;

use crate::project::ProjectName;
use crate::task::{shared, SharedTask, TaskResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JavaSignal {
    Continue,
    FailFast(Vec<ProjectName>),
}

impl JavaSignal {
    /// Combine two signals. `FailFast` dominates and accumulates names in
    /// argument order.
    pub fn merge(self, other: JavaSignal) -> JavaSignal {
        match (self, other) {
            (JavaSignal::Continue, JavaSignal::Continue) => JavaSignal::Continue,
            (JavaSignal::Continue, fail @ JavaSignal::FailFast(_)) => fail,
            (fail @ JavaSignal::FailFast(_), JavaSignal::Continue) => fail,
            (JavaSignal::FailFast(mut left), JavaSignal::FailFast(right)) => {
                left.extend(right);
                JavaSignal::FailFast(left)
            }
        }
    }

    pub fn aggregate(signals: impl IntoIterator<Item = JavaSignal>) -> JavaSignal {
        signals
            .into_iter()
            .fold(JavaSignal::Continue, JavaSignal::merge)
    }
}

/// Materialize an upstream Java-completion future into its per-upstream
/// signal: success means `Continue`, failure means `FailFast([project])`.
pub fn materialize_java_completion(
    project: ProjectName,
    completed: SharedTask<TaskResult<()>>,
) -> SharedTask<JavaSignal> {
    shared(async move {
        match completed.await {
            Ok(()) => JavaSignal::Continue,
            Err(_) => JavaSignal::FailFast(vec![project]),
        }
    })
}

/// Aggregate the per-upstream signals of all direct upstreams into the
/// trigger a dependent consults before its Java phase.
pub fn aggregate_triggers(triggers: Vec<SharedTask<JavaSignal>>) -> SharedTask<JavaSignal> {
    if triggers.is_empty() {
        return crate::task::ready(JavaSignal::Continue);
    }
    shared(async move { JavaSignal::aggregate(join_all(triggers).await) })
}
