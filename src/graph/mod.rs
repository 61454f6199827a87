// src/graph/mod.rs

//! The compilation graph scheduler.
//!
//! [`CompileGraph::traverse`] walks a project DAG and yields a result DAG of
//! the same shape. The walk is memoized per input node identity within one
//! traversal, so shared dependencies are visited once; across traversals and
//! clients, sharing happens through the deduplication registry instead.

pub mod dedup;
pub mod pipelined;
pub mod sequential;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::compiler::{BundleFactory, ClientInfo, Compiler, ResultBundle};
use crate::dag::results::{
    blocked_by, PartialCompileResult, PartialFailure, ResultDag,
};
use crate::dag::Dag;
use crate::errors::FailureCause;
use crate::state::SchedulerState;
use crate::task::{shared, SharedTask};

/// Scheduler instance: process-wide state plus the external collaborators.
pub struct CompileGraph {
    state: Arc<SchedulerState>,
    bundles: Arc<dyn BundleFactory>,
    compiler: Arc<dyn Compiler>,
}

impl CompileGraph {
    pub fn new(
        state: Arc<SchedulerState>,
        bundles: Arc<dyn BundleFactory>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            state,
            bundles,
            compiler,
        }
    }

    pub fn state(&self) -> &Arc<SchedulerState> {
        &self.state
    }

    /// Schedule the DAG for `client`, compiling dependencies before
    /// dependents. With `pipeline` set, dependents start as soon as upstream
    /// signatures are available.
    ///
    /// Failures never escape as errors: blocked and failed projects come
    /// back as `PartialFailure` nodes in the result DAG.
    pub async fn traverse(
        &self,
        dag: Arc<Dag>,
        client: Arc<dyn ClientInfo>,
        pipeline: bool,
    ) -> Arc<ResultDag> {
        let traversal = Arc::new(Traversal {
            state: self.state.clone(),
            bundles: self.bundles.clone(),
            compiler: self.compiler.clone(),
            client,
            pipeline,
            memo: Mutex::new(HashMap::new()),
        });
        debug!(pipeline, "starting compile graph traversal");
        traversal.results_of(&dag).await
    }
}

/// One client's walk over one DAG. The memo table is local to the traversal
/// and keyed by input node identity, not by project: the same sub-DAG
/// encountered twice yields the same task.
pub(crate) struct Traversal {
    pub(crate) state: Arc<SchedulerState>,
    pub(crate) bundles: Arc<dyn BundleFactory>,
    pub(crate) compiler: Arc<dyn Compiler>,
    pub(crate) client: Arc<dyn ClientInfo>,
    pub(crate) pipeline: bool,
    memo: Mutex<HashMap<usize, SharedTask<Arc<ResultDag>>>>,
}

impl Traversal {
    pub(crate) fn results_of(self: &Arc<Self>, node: &Arc<Dag>) -> SharedTask<Arc<ResultDag>> {
        let key = Arc::as_ptr(node) as usize;
        let mut memo = self.memo.lock();
        if let Some(task) = memo.get(&key) {
            return task.clone();
        }
        let task = shared(self.clone().walk(node.clone()));
        memo.insert(key, task.clone());
        task
    }

    fn walk(self: Arc<Self>, node: Arc<Dag>) -> BoxFuture<'static, Arc<ResultDag>> {
        Box::pin(async move {
            match &*node {
                Dag::Leaf(project) => {
                    dedup::setup_and_deduplicate(&self, project.clone(), Vec::new()).await
                }
                Dag::Parent(project, deps) => {
                    let children =
                        join_all(deps.iter().map(|dep| self.results_of(dep))).await;

                    let blocking: Vec<_> = children
                        .iter()
                        .filter_map(|child| blocked_by(child))
                        .map(|blocked| blocked.name.clone())
                        .collect();
                    if !blocking.is_empty() {
                        warn!(
                            project = %project.name,
                            blocked_on = ?blocking,
                            "upstream failure; project will not be compiled"
                        );
                        let failure = PartialFailure::new(
                            project.clone(),
                            FailureCause::Blocked(blocking.clone()),
                            ResultBundle::blocked(blocking),
                        );
                        return Arc::new(ResultDag::Parent(
                            PartialCompileResult::Failure(failure),
                            children,
                        ));
                    }

                    dedup::setup_and_deduplicate(&self, project.clone(), children).await
                }
                Dag::Aggregate(dags) => {
                    let children =
                        join_all(dags.iter().map(|dag| self.results_of(dag))).await;
                    Arc::new(ResultDag::Parent(PartialCompileResult::Empty, children))
                }
            }
        })
    }
}
