// src/graph/sequential.rs

//! Sequential scheduling: dependencies complete before dependents enter the
//! compiler. Upstream results are final when a node compiles, so dependent
//! maps are built from the completed result bundles.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bundle::CompileBundle;
use crate::compiler::{CompileInputs, CompileResult, ResultBundle};
use crate::dag::results::{
    collect_successes_from, PartialCompileResult, PartialFailure, PartialSuccess, ResultDag,
};
use crate::errors::FailureCause;
use crate::signal::JavaSignal;
use crate::signatures::SignatureStore;
use crate::task::{ready, TaskError};

use super::Traversal;

pub(crate) async fn compile_bundle(
    t: &Arc<Traversal>,
    bundle: Arc<CompileBundle>,
    children: &[Arc<ResultDag>],
) -> PartialCompileResult {
    let project = bundle.project.clone();

    // Last successful results of every transitive upstream, keyed by both
    // the new and the read-only classes directory.
    let mut dependent_results = HashMap::new();
    for upstream in collect_successes_from(children) {
        let outcome = upstream.result.clone().await;
        if let Ok(result) = outcome {
            if let Some(successful) = &result.successful {
                dependent_results.insert(successful.classes_dir.clone(), successful.clone());
                dependent_results.insert(
                    upstream.bundle.out.read_only_classes_dir.clone(),
                    successful.clone(),
                );
            }
        }
    }

    // Fresh products of the direct upstreams only.
    let mut dependent_products = HashMap::new();
    for child in children {
        if let PartialCompileResult::Success(direct) = child.result() {
            if let Ok(result) = direct.result.clone().await {
                if let CompileResult::Ok(products) = &result.result {
                    dependent_products
                        .insert(products.new_classes_dir.clone(), products.clone());
                }
            }
        }
    }

    let inputs = CompileInputs {
        reporter: bundle.mirrored_reporter(),
        logger: bundle.mirrored_logger(),
        bundle: bundle.clone(),
        dependency_signatures: SignatureStore::empty(),
        signatures: None,
        java_completed: None,
        java_trigger: ready(JavaSignal::Continue),
        separate_java_and_scala: false,
        dependent_results,
        dependent_products,
    };

    debug!(project = %project.name, "invoking compiler");
    match t.compiler.compile(inputs).await {
        Ok(result) => completed_result(&bundle, Arc::new(result)),
        Err(err) => {
            warn!(project = %project.name, error = %err, "compiler raised instead of returning a result");
            PartialCompileResult::Failure(PartialFailure::new(
                project,
                FailureCause::Internal(TaskError::from(err)),
                ResultBundle::failed(vec![]),
            ))
        }
    }
}

/// Map a completed result bundle onto its node result. Shared with the
/// pipelined scheduler for compiles that finished without pipelining.
pub(crate) fn completed_result(
    bundle: &Arc<CompileBundle>,
    result: Arc<ResultBundle>,
) -> PartialCompileResult {
    match &result.result {
        CompileResult::Ok(_) | CompileResult::Empty => {
            PartialCompileResult::Success(Arc::new(PartialSuccess {
                bundle: bundle.clone(),
                signatures: SignatureStore::empty(),
                java_completed: ready(Ok(())),
                java_trigger: ready(JavaSignal::Continue),
                result: ready(Ok(result.clone())),
            }))
        }
        CompileResult::Failed(_) => failure(bundle, FailureCause::Compiler, result),
        CompileResult::Cancelled => failure(bundle, FailureCause::Cancelled, result),
        CompileResult::Blocked(on) => failure(bundle, FailureCause::Blocked(on.clone()), result),
    }
}

fn failure(
    bundle: &Arc<CompileBundle>,
    cause: FailureCause,
    result: Arc<ResultBundle>,
) -> PartialCompileResult {
    PartialCompileResult::Failure(PartialFailure::with_result_task(
        bundle.project.clone(),
        cause,
        ready(Ok(result)),
    ))
}
