// src/graph/dedup.rs

//! Deduplication of concurrent compilations.
//!
//! The first request for a fingerprint becomes the unique executing compile;
//! every later concurrent request subscribes to it instead: mirrored
//! reporter/logger events are replayed in emission order, the shared result
//! is awaited, and the shared output directory is copied into the late
//! client's own classes directory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::bundle::{BundleInputs, LastSuccessfulResult};
use crate::compiler::{BuildLogger, ResultBundle};
use crate::dag::results::{
    contains_cancelled, PartialCompileResult, PartialFailure, PartialSuccess, ResultDag,
};
use crate::errors::FailureCause;
use crate::fingerprint::CompileFingerprint;
use crate::fsops;
use crate::mirror::{apply_event, EventMirror};
use crate::project::Project;
use crate::state::{RunningCompilation, SchedulerState};
use crate::task::{shared, SharedTask, TaskError, TaskResult};

use super::{pipelined, sequential, Traversal};

/// Build this node's bundle, then either start the unique compilation for
/// its fingerprint or join the one already in flight.
pub(crate) async fn setup_and_deduplicate(
    t: &Arc<Traversal>,
    project: Arc<Project>,
    children: Vec<Arc<ResultDag>>,
) -> Arc<ResultDag> {
    let inputs = BundleInputs {
        project: project.clone(),
        client: t.client.clone(),
    };
    let bundle = match t.bundles.setup(inputs).await {
        Ok(bundle) => bundle,
        Err(err) => {
            warn!(project = %project.name, error = %err, "bundle setup failed");
            let cause = FailureCause::Internal(TaskError::from(err));
            let failure = PartialFailure::new(project, cause, ResultBundle::failed(vec![]));
            return Arc::new(node_dag(children, PartialCompileResult::Failure(failure)));
        }
    };
    let fingerprint = bundle.fingerprint.clone();

    let state = t.state.clone();
    let traversal = t.clone();
    let factory_project = project.clone();
    let factory_children = children.clone();
    let mut setup_ctx = Some(bundle);

    let (running, fresh) = t.state.running_compilation_for(&fingerprint, || {
        let bundle = setup_ctx.take().expect("factory runs at most once");

        // Take the directory reference for the installed last successful
        // result. This happens once per fingerprint miss, never per
        // subscriber: deletion gating relies on at most one live holder per
        // fingerprint.
        let installed = state.acquire_last_successful(&factory_project);

        // A vanished directory or a previously-empty outcome means the
        // record is not reusable; substitute a fresh empty result without
        // touching the counter.
        let effective = if bundle.previous_was_empty || !installed.classes_dir.exists() {
            LastSuccessfulResult::empty(&factory_project)
        } else {
            installed.clone()
        };

        let bound = Arc::new(bundle.with_latest_result(effective.clone()));
        let mirror = bound.mirror.clone();
        let is_unsubscribed = Arc::new(AtomicBool::new(false));
        let task = spawn_compilation(
            traversal,
            fingerprint.clone(),
            factory_project.clone(),
            installed,
            is_unsubscribed.clone(),
            bound,
            factory_children,
        );
        RunningCompilation {
            task,
            previous_last_successful: effective,
            is_unsubscribed,
            mirror,
            client_id: t.client.client_id().to_string(),
        }
    });

    if fresh {
        debug!(
            project = %project.name,
            fingerprint = %fingerprint,
            client = %t.client.client_id(),
            "starting unique compilation"
        );
        let mut guard = UnsubscribeOnDrop::new(running.is_unsubscribed.clone());
        let outcome = running.task.clone().await;
        guard.disarm();
        return match outcome {
            Ok(dag) => dag,
            Err(err) => {
                warn!(project = %project.name, error = %err, "compilation task died");
                let cause = FailureCause::Internal(err);
                let failure =
                    PartialFailure::new(project, cause, ResultBundle::failed(vec![]));
                Arc::new(node_dag(children, PartialCompileResult::Failure(failure)))
            }
        };
    }

    deduplicate(t, project, children, fingerprint, setup_ctx, running).await
}

/// Join an in-flight compilation as a late subscriber.
async fn deduplicate(
    t: &Arc<Traversal>,
    project: Arc<Project>,
    children: Vec<Arc<ResultDag>>,
    fingerprint: CompileFingerprint,
    setup_ctx: Option<crate::bundle::CompileBundle>,
    running: RunningCompilation,
) -> Arc<ResultDag> {
    let bundle = setup_ctx.expect("deduplicated request keeps its bundle");
    info!(
        project = %project.name,
        fingerprint = %fingerprint,
        origin = %running.client_id,
        client = %t.client.client_id(),
        "deduplicating concurrent compilation"
    );

    // Replay runs apart from the producer: previous-problem diagnostics from
    // the shared last successful analysis first, then every mirrored event
    // in emission order.
    let reporter = bundle.reporter.clone();
    let replay_logger = bundle.logger.clone();
    let previous_analysis = running.previous_last_successful.analysis.clone();
    let mut receiver = running.mirror.subscribe();
    let replay = tokio::spawn(async move {
        if let Some(analysis) = previous_analysis {
            for problem in &analysis.problems {
                reporter.report_problem(problem);
            }
        }
        while let Some(event) = receiver.recv().await {
            apply_event(event, reporter.as_ref(), replay_logger.as_ref());
        }
    });
    let mut replay_guard = AbortOnDrop::new(replay.abort_handle());

    let outcome = running.task.clone().await;
    let dag = match outcome {
        Ok(dag) => dag,
        Err(err) => {
            warn!(project = %project.name, error = %err, "shared compilation task died");
            let cause = FailureCause::Internal(err);
            let failure = PartialFailure::new(project, cause, ResultBundle::failed(vec![]));
            return Arc::new(node_dag(children, PartialCompileResult::Failure(failure)));
        }
    };

    if contains_cancelled(&dag) {
        debug!(
            project = %project.name,
            "shared compilation was cancelled; dropping replay subscription"
        );
        return dag;
    }

    replay_guard.disarm();
    if running.mirror.is_closed() {
        // Producer finished; drain the remaining events before returning so
        // the subscriber's reporter saw the complete stream.
        let _ = replay.await;
    }

    attach_client_copies(t, &dag, bundle.logger.clone())
}

/// Fork the node compilation, finalize registry state on its completion and
/// return the memoized handle subscribers join.
fn spawn_compilation(
    t: Arc<Traversal>,
    fingerprint: CompileFingerprint,
    project: Arc<Project>,
    counted: Arc<LastSuccessfulResult>,
    is_unsubscribed: Arc<AtomicBool>,
    bundle: Arc<crate::bundle::CompileBundle>,
    children: Vec<Arc<ResultDag>>,
) -> SharedTask<TaskResult<Arc<ResultDag>>> {
    let handle = tokio::spawn(async move {
        let mirror = bundle.mirror.clone();
        let node_result = if t.pipeline {
            pipelined::compile_bundle(&t, bundle, &children).await
        } else {
            sequential::compile_bundle(&t, bundle, &children).await
        };
        let dag = Arc::new(node_dag(children, node_result));
        let dag = finalize_root(
            &t.state,
            &fingerprint,
            &project,
            &counted,
            &mirror,
            &is_unsubscribed,
            dag,
        );
        if !t.pipeline {
            // Sequential callers observe a quiescent registry on return:
            // wait for registration before resolving the traversal node.
            if let PartialCompileResult::Success(success) = dag.result() {
                let _ = success.result.clone().await;
            }
        }
        dag
    });
    shared(async move {
        handle
            .await
            .map_err(|err| TaskError::msg(format!("compilation task aborted: {err}")))
    })
}

/// Attach registry finalization to the root result of a freshly produced
/// DAG.
///
/// Only the root belongs to this fingerprint: children were produced under
/// their own registry entries and already carry their own finalizers. The
/// wrapped result task is memoized, so registration, counter updates and
/// orphan deletion happen exactly once no matter how often consumers
/// re-evaluate it; a background driver guarantees they happen even if every
/// client walks away.
fn finalize_root(
    state: &Arc<SchedulerState>,
    fingerprint: &CompileFingerprint,
    project: &Arc<Project>,
    counted: &Arc<LastSuccessfulResult>,
    mirror: &EventMirror,
    is_unsubscribed: &Arc<AtomicBool>,
    dag: Arc<ResultDag>,
) -> Arc<ResultDag> {
    match dag.result().clone() {
        PartialCompileResult::Success(success) => {
            let original = success.result.clone();
            let state = state.clone();
            let fingerprint = fingerprint.clone();
            let name = project.name.clone();
            let counted = counted.clone();
            let mirror = mirror.clone();
            let is_unsubscribed = is_unsubscribed.clone();
            let finalized = shared(async move {
                let outcome = original.await;
                match &outcome {
                    Ok(bundle) => match &bundle.successful {
                        Some(new_successful) => {
                            state.unregister_and_register_successful(
                                &fingerprint,
                                &name,
                                new_successful,
                            );
                            if is_unsubscribed.load(Ordering::SeqCst) {
                                debug!(
                                    project = %name,
                                    "originating client disconnected; result registered anyway"
                                );
                            }
                        }
                        None => state.unregister_on_error(&fingerprint, &counted),
                    },
                    Err(err) => {
                        warn!(project = %name, error = %err, "compilation failed to produce a result");
                        state.unregister_on_error(&fingerprint, &counted);
                    }
                }
                mirror.close();
                outcome
            });
            let driver = finalized.clone();
            tokio::spawn(async move {
                let _ = driver.await;
            });
            Arc::new(dag.with_root_result(PartialCompileResult::Success(
                success.with_result(finalized),
            )))
        }
        _ => {
            // Failed or blocked before producing a registrable result; the
            // entry must go away so repeated requests can retry cleanly.
            state.unregister_on_error(fingerprint, counted);
            mirror.close();
            dag
        }
    }
}

/// Rebuild the shared DAG for a late subscriber, arranging a copy of every
/// successful node's classes directory into this client's own directory.
fn attach_client_copies(
    t: &Arc<Traversal>,
    dag: &Arc<ResultDag>,
    logger: Arc<dyn BuildLogger>,
) -> Arc<ResultDag> {
    let children: Vec<Arc<ResultDag>> = dag
        .children()
        .iter()
        .map(|child| attach_client_copies(t, child, logger.clone()))
        .collect();
    let result = match dag.result() {
        PartialCompileResult::Success(success) => {
            PartialCompileResult::Success(with_client_copy(t, success, logger))
        }
        other => other.clone(),
    };
    Arc::new(match &**dag {
        ResultDag::Leaf(_) => ResultDag::Leaf(result),
        ResultDag::Parent(_, _) => ResultDag::Parent(result, children),
    })
}

fn with_client_copy(
    t: &Arc<Traversal>,
    success: &Arc<PartialSuccess>,
    logger: Arc<dyn BuildLogger>,
) -> Arc<PartialSuccess> {
    let target = t.client.unique_classes_dir_for(&success.bundle.project);
    let project = success.bundle.project.name.clone();
    let original = success.result.clone();

    let result = shared(async move {
        let bundle = original.await?;
        let Some(successful) = bundle.successful.clone() else {
            return Ok(bundle);
        };
        // Outputs must be visible before they are copied.
        if let Err(err) = successful.populating_products().await {
            let cause = FailureCause::DeduplicationIo(err);
            logger.error(&format!("{project}: {cause}"));
            return Ok(bundle);
        }

        let source = successful.classes_dir.clone();
        let copy: SharedTask<TaskResult<()>> = shared(async move {
            fsops::copy_directory(&source, &target)
                .await
                .map_err(TaskError::from)
        });
        if let Err(err) = copy.clone().await {
            // Reported to the subscribing client only; the originating
            // compilation is unaffected.
            let cause = FailureCause::DeduplicationIo(err);
            logger.error(&format!("{project}: {cause}"));
        }
        Ok(Arc::new(bundle.with_background_io(copy)))
    });

    // Start the copy now; the caller can still await it through the result.
    let driver = result.clone();
    tokio::spawn(async move {
        let _ = driver.await;
    });

    success.with_result(result)
}

fn node_dag(children: Vec<Arc<ResultDag>>, result: PartialCompileResult) -> ResultDag {
    if children.is_empty() {
        ResultDag::Leaf(result)
    } else {
        ResultDag::Parent(result, children)
    }
}

/// Aborts a replay subscription when its subscriber disappears mid-await.
struct AbortOnDrop {
    handle: Option<AbortHandle>,
}

impl AbortOnDrop {
    fn new(handle: AbortHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Marks the running compilation as unsubscribed if the originating client
/// abandons the await before completion.
struct UnsubscribeOnDrop {
    flag: Option<Arc<AtomicBool>>,
}

impl UnsubscribeOnDrop {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag: Some(flag) }
    }

    fn disarm(&mut self) {
        self.flag = None;
    }
}

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
