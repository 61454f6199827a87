// src/graph/pipelined.rs

//! Pipelined scheduling: a dependent starts as soon as every direct
//! upstream has published its type signatures, overlapping with upstream
//! Java code generation. The compile is forked onto the runtime and the
//! node resolves at signature availability; the Java gating signal threads
//! through the graph via one-shot completion promises.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bundle::CompileBundle;
use crate::compiler::{CompileInputs, CompileProducts, CompileResult};
use crate::dag::results::{
    collect_successes_from, direct_successes, PartialCompileResult, PartialFailure,
    PartialSuccess, ResultDag,
};
use crate::errors::FailureCause;
use crate::signal::{aggregate_triggers, materialize_java_completion};
use crate::signatures::SignatureStore;
use crate::task::{ready, spawn_shared, Promise, TaskError};

use super::{sequential, Traversal};

pub(crate) async fn compile_bundle(
    t: &Arc<Traversal>,
    bundle: Arc<CompileBundle>,
    children: &[Arc<ResultDag>],
) -> PartialCompileResult {
    let project = bundle.project.clone();
    let direct = direct_successes(children);

    // Upstream signatures concatenated in this project's classpath order.
    let dependency_signatures = SignatureStore::merge_for_classpath(
        &project.config.classpath,
        direct
            .iter()
            .map(|upstream| {
                (
                    upstream.signatures.clone(),
                    [
                        upstream.bundle.out.read_only_classes_dir.clone(),
                        upstream.bundle.out.new_classes_dir.clone(),
                    ],
                )
            })
            .collect(),
    );

    // The Java gate: materialize every direct upstream's completion and
    // aggregate. FailFast dominates and accumulates project names.
    let java_trigger = aggregate_triggers(
        direct
            .iter()
            .map(|upstream| {
                materialize_java_completion(
                    upstream.bundle.project.name.clone(),
                    upstream.java_completed.clone(),
                )
            })
            .collect(),
    );

    // Upstream results are still in flight; dependents see the bundle-level
    // output paths instead of completed result bundles.
    let mut dependent_results = HashMap::new();
    for upstream in collect_successes_from(children) {
        dependent_results.insert(
            upstream.bundle.out.read_only_classes_dir.clone(),
            upstream.bundle.latest_result.clone(),
        );
    }
    let mut dependent_products = HashMap::new();
    for upstream in &direct {
        dependent_products.insert(
            upstream.bundle.out.new_classes_dir.clone(),
            CompileProducts {
                read_only_classes_dir: upstream.bundle.out.read_only_classes_dir.clone(),
                new_classes_dir: upstream.bundle.out.new_classes_dir.clone(),
            },
        );
    }

    let (signatures_promise, signatures_future) = Promise::<SignatureStore>::new();
    let (java_promise, java_completed) = Promise::<()>::new();

    let inputs = CompileInputs {
        reporter: bundle.mirrored_reporter(),
        logger: bundle.mirrored_logger(),
        bundle: bundle.clone(),
        dependency_signatures,
        signatures: Some(signatures_promise),
        java_completed: Some(java_promise),
        java_trigger: java_trigger.clone(),
        separate_java_and_scala: true,
        dependent_results,
        dependent_products,
    };

    debug!(project = %project.name, "forking pipelined compilation");
    let compiler = t.compiler.clone();
    let result = spawn_shared(async move {
        compiler
            .compile(inputs)
            .await
            .map(Arc::new)
            .map_err(TaskError::from)
    });

    // Resolve the node at signature availability; Java codegen continues in
    // the background and downstream awaits it only through the gate.
    match signatures_future.await {
        Ok(signatures) => PartialCompileResult::Success(Arc::new(PartialSuccess {
            bundle,
            signatures,
            java_completed,
            java_trigger,
            result,
        })),
        Err(promise_err) => {
            // No signatures will ever arrive. Resolve the final outcome so
            // the failure carries an accurate cause.
            match result.clone().await {
                Ok(result_bundle) => match &result_bundle.result {
                    CompileResult::Ok(_) | CompileResult::Empty => {
                        // The compiler finished without pipelining; publish
                        // no signatures but keep the success.
                        PartialCompileResult::Success(Arc::new(PartialSuccess {
                            bundle,
                            signatures: SignatureStore::empty(),
                            java_completed: ready(Ok(())),
                            java_trigger,
                            result,
                        }))
                    }
                    _ => sequential::completed_result(&bundle, result_bundle),
                },
                Err(err) => {
                    warn!(
                        project = %project.name,
                        error = %err,
                        "upstream failed before publishing signatures"
                    );
                    PartialCompileResult::Failure(PartialFailure::with_result_task(
                        project,
                        FailureCause::SignaturePromise(promise_err),
                        result,
                    ))
                }
            }
        }
    }
}
