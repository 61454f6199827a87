// src/state.rs

//! Process-wide scheduler state.
//!
//! Three maps, all keyed individually and mutated only through per-key
//! compute primitives: in-flight compilations by fingerprint, last
//! successful results by project, and reference counts for the output
//! directories concurrent clients still read. No lock ever spans more than
//! one key; tests construct fresh instances.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::bundle::LastSuccessfulResult;
use crate::dag::results::ResultDag;
use crate::fingerprint::CompileFingerprint;
use crate::fsops;
use crate::mirror::EventMirror;
use crate::project::{Project, ProjectName};
use crate::task::{shared, SharedTask, TaskError, TaskResult};

/// One in-flight compilation, shared by every client that requested its
/// fingerprint.
#[derive(Clone)]
pub struct RunningCompilation {
    /// Memoized traversal outcome. Late subscribers join this task; it is
    /// driven to completion by a background driver regardless of clients.
    pub task: SharedTask<TaskResult<Arc<ResultDag>>>,
    /// The last successful result the unique compile ran against. Used to
    /// reconstruct previous-problem diagnostics for late subscribers.
    pub previous_last_successful: Arc<LastSuccessfulResult>,
    /// Set when the originating client abandoned the await. The compilation
    /// itself is never cancelled on behalf of a disconnected client.
    pub is_unsubscribed: Arc<AtomicBool>,
    pub mirror: EventMirror,
    /// Originating client, for deduplication log lines.
    pub client_id: String,
}

#[derive(Default)]
pub struct SchedulerState {
    running: DashMap<CompileFingerprint, RunningCompilation>,
    last_successful: DashMap<ProjectName, Arc<LastSuccessfulResult>>,
    using_dirs: DashMap<PathBuf, usize>,
}

impl SchedulerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many in-flight compilations hold the directory as their previous
    /// last-successful source.
    pub fn reference_count(&self, dir: &Path) -> usize {
        self.using_dirs.get(dir).map(|count| *count).unwrap_or(0)
    }

    pub fn last_successful_for(&self, project: &str) -> Option<Arc<LastSuccessfulResult>> {
        self.last_successful
            .get(project)
            .map(|result| result.value().clone())
    }

    /// Seed a last successful result, e.g. when the server restores state
    /// from a previous run. The directory counter starts at zero.
    pub fn register_last_successful(&self, result: Arc<LastSuccessfulResult>) {
        self.last_successful.insert(result.project.clone(), result);
    }

    pub fn running_compilations(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, fingerprint: &CompileFingerprint) -> bool {
        self.running.contains_key(fingerprint)
    }

    /// Compute-if-absent over the deduplication registry. The factory runs
    /// exactly once, under the map's exclusion for this fingerprint; the
    /// returned flag is `true` when this call created the entry.
    pub(crate) fn running_compilation_for(
        &self,
        fingerprint: &CompileFingerprint,
        factory: impl FnOnce() -> RunningCompilation,
    ) -> (RunningCompilation, bool) {
        let mut fresh = false;
        let mut slot = Some(factory);
        let entry = self
            .running
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                fresh = true;
                (slot.take().expect("factory consumed once"))()
            });
        (entry.value().clone(), fresh)
    }

    /// Look up (or install an empty) last successful result for the project
    /// and take a reference on its directory. Called only from the registry
    /// factory, i.e. once per fingerprint miss, never per subscriber.
    pub(crate) fn acquire_last_successful(
        &self,
        project: &Arc<Project>,
    ) -> Arc<LastSuccessfulResult> {
        let installed = self
            .last_successful
            .entry(project.name.clone())
            .or_insert_with(|| LastSuccessfulResult::empty(project))
            .value()
            .clone();
        let count = self.acquire_dir(&installed.classes_dir);
        debug!(
            project = %project.name,
            dir = %installed.classes_dir.display(),
            count,
            "acquired last successful classes directory"
        );
        installed
    }

    fn acquire_dir(&self, dir: &Path) -> usize {
        let mut entry = self.using_dirs.entry(dir.to_path_buf()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Drop one reference on a directory, flooring at zero. Returns the
    /// remaining count.
    pub(crate) fn release_dir(&self, dir: &Path) -> usize {
        match self.using_dirs.get_mut(dir) {
            Some(mut count) => {
                if *count > 0 {
                    *count -= 1;
                } else {
                    warn!(dir = %dir.display(), "released a directory with no holders");
                }
                *count
            }
            None => 0,
        }
    }

    /// Error-path unregistration: drop the registry entry for the
    /// fingerprint and release the directory reference taken at entry, so
    /// repeated requests can retry cleanly.
    pub(crate) fn unregister_on_error(
        &self,
        fingerprint: &CompileFingerprint,
        counted: &Arc<LastSuccessfulResult>,
    ) {
        self.running.remove(fingerprint);
        let remaining = self.release_dir(&counted.classes_dir);
        debug!(
            fingerprint = %fingerprint,
            dir = %counted.classes_dir.display(),
            remaining,
            "unregistered failed compilation"
        );
    }

    /// Success-path finalization: atomically (under the registry's exclusion
    /// for this fingerprint) drop the registry entry and promote the new
    /// successful result. The displaced record's directory reference is
    /// released; once unreferenced and superseded by a different path it is
    /// scheduled for deletion.
    pub(crate) fn unregister_and_register_successful(
        &self,
        fingerprint: &CompileFingerprint,
        project: &ProjectName,
        new_successful: &Arc<LastSuccessfulResult>,
    ) {
        let removed = self.running.remove_if(fingerprint, |_, _| {
            self.promote_successful(project, new_successful);
            true
        });
        if removed.is_none() {
            // Entry already gone (retried error path raced us); still promote.
            self.promote_successful(project, new_successful);
        }
        info!(
            project = %project,
            fingerprint = %fingerprint,
            dir = %new_successful.classes_dir.display(),
            "registered new successful compilation"
        );
    }

    fn promote_successful(&self, project: &ProjectName, new_successful: &Arc<LastSuccessfulResult>) {
        let displaced = self
            .last_successful
            .insert(project.clone(), new_successful.clone());
        let Some(previous) = displaced else {
            return;
        };

        let remaining = self.release_dir(&previous.classes_dir);
        let superseded = previous.classes_dir != new_successful.classes_dir;
        if remaining == 0 && superseded && !previous.is_empty() {
            self.schedule_orphan_deletion(previous, new_successful.clone());
        } else {
            debug!(
                project = %project,
                dir = %previous.classes_dir.display(),
                remaining,
                superseded,
                "displaced last successful result kept on disk"
            );
        }
    }

    /// Build the populate-then-delete composite for a displaced, unreferenced
    /// directory and start it in the background.
    ///
    /// The composite first runs the displaced record's populating action
    /// (late readers must observe a consistent state), then the new record's,
    /// then deletes the orphan directory on the blocking pool. It replaces
    /// the new record's populating action, and it is memoized: re-evaluation
    /// performs no further deletions.
    fn schedule_orphan_deletion(
        &self,
        previous: Arc<LastSuccessfulResult>,
        new_successful: Arc<LastSuccessfulResult>,
    ) {
        let orphan_dir = previous.classes_dir.clone();
        let populate_previous = previous.populating_products();
        let populate_new = new_successful.populating_products();

        info!(
            project = %previous.project,
            dir = %orphan_dir.display(),
            "scheduling deletion of superseded classes directory"
        );

        let dir = orphan_dir.clone();
        let composite: SharedTask<TaskResult<()>> = shared(async move {
            populate_previous.await?;
            populate_new.await?;
            fsops::delete_directory(&dir)
                .await
                .map_err(TaskError::from)
        });

        new_successful.replace_populating_products(composite.clone());
        tokio::spawn(async move {
            if let Err(err) = composite.await {
                warn!(
                    dir = %orphan_dir.display(),
                    error = %err,
                    "failed to delete superseded classes directory"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Project, ProjectConfig};
    use crate::task::ready;

    fn project(name: &str) -> Arc<Project> {
        Arc::new(Project {
            name: name.to_string(),
            dependencies: vec![],
            config: ProjectConfig {
                sources: vec![],
                classpath: vec![],
                options: vec![],
                classes_root: format!("/out/{name}").into(),
            },
        })
    }

    #[tokio::test]
    async fn directory_counters_floor_at_zero() {
        let state = SchedulerState::new();
        let p = project("a");

        let installed = state.acquire_last_successful(&p);
        assert!(installed.is_empty());
        assert_eq!(state.reference_count(&installed.classes_dir), 1);

        assert_eq!(state.release_dir(&installed.classes_dir), 0);
        assert_eq!(state.release_dir(&installed.classes_dir), 0);
        assert_eq!(state.reference_count(&installed.classes_dir), 0);
    }

    #[tokio::test]
    async fn acquire_installs_an_empty_record_once() {
        let state = SchedulerState::new();
        let p = project("a");

        let first = state.acquire_last_successful(&p);
        let second = state.acquire_last_successful(&p);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.reference_count(&first.classes_dir), 2);
    }

    #[tokio::test]
    async fn promoting_a_result_displaces_and_deletes_the_orphan() {
        let state = SchedulerState::new();
        let p = project("a");
        let fingerprint = crate::fingerprint::CompileFingerprint::of(&p);

        let workspace = tempfile::tempdir().expect("workspace");
        let v1 = workspace.path().join("v1");
        std::fs::create_dir_all(&v1).expect("v1");
        state.register_last_successful(LastSuccessfulResult::new(
            "a",
            v1.clone(),
            None,
            ready(Ok(())),
        ));
        state.acquire_last_successful(&p);

        let v2 = workspace.path().join("v2");
        std::fs::create_dir_all(&v2).expect("v2");
        let promoted = LastSuccessfulResult::new("a", v2.clone(), None, ready(Ok(())));
        state.unregister_and_register_successful(&fingerprint, &"a".to_string(), &promoted);

        promoted
            .populating_products()
            .await
            .expect("composite deletion");
        assert!(!v1.exists());
        assert!(v2.exists());
        assert_eq!(state.reference_count(&v1), 0);
    }

    #[tokio::test]
    async fn a_still_referenced_directory_survives_promotion() {
        let state = SchedulerState::new();
        let p = project("a");
        let fingerprint = crate::fingerprint::CompileFingerprint::of(&p);

        let workspace = tempfile::tempdir().expect("workspace");
        let v1 = workspace.path().join("v1");
        std::fs::create_dir_all(&v1).expect("v1");
        state.register_last_successful(LastSuccessfulResult::new(
            "a",
            v1.clone(),
            None,
            ready(Ok(())),
        ));
        // Two holders: one from this fingerprint, one from a concurrent one.
        state.acquire_last_successful(&p);
        state.acquire_last_successful(&p);

        let v2 = workspace.path().join("v2");
        let promoted = LastSuccessfulResult::new("a", v2, None, ready(Ok(())));
        state.unregister_and_register_successful(&fingerprint, &"a".to_string(), &promoted);

        promoted.populating_products().await.expect("populating");
        assert!(v1.exists(), "directory with a live holder must survive");
        assert_eq!(state.reference_count(&v1), 1);
    }
}
