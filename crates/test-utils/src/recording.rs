#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use builddag::bundle::{BundleInputs, CompileBundle};
use builddag::compiler::{
    BuildLogger, BundleFactory, ClientInfo, Diagnostic, DiagnosticsSummary, Reporter,
};
use builddag::mirror::ReporterAction;
use builddag::project::Project;

/// Reporter that records every action, in call order, for assertions.
#[derive(Default)]
pub struct RecordingReporter {
    actions: Mutex<Vec<ReporterAction>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<ReporterAction> {
        self.actions.lock().clone()
    }

    pub fn has_start_compilation(&self) -> bool {
        self.actions()
            .iter()
            .any(|a| matches!(a, ReporterAction::StartCompilation))
    }

    pub fn has_start_incremental_cycle(&self) -> bool {
        self.actions()
            .iter()
            .any(|a| matches!(a, ReporterAction::StartIncrementalCycle { .. }))
    }

    pub fn end_compilation_codes(&self) -> Vec<i32> {
        self.actions()
            .iter()
            .filter_map(|a| match a {
                ReporterAction::EndCompilation { exit_code } => Some(*exit_code),
                _ => None,
            })
            .collect()
    }

    pub fn problems(&self) -> Vec<Diagnostic> {
        self.actions()
            .iter()
            .filter_map(|a| match a {
                ReporterAction::Problem(problem) => Some(problem.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report_start_compilation(&self) {
        self.actions.lock().push(ReporterAction::StartCompilation);
    }

    fn report_start_incremental_cycle(&self, sources: &[PathBuf], output_dirs: &[PathBuf]) {
        self.actions.lock().push(ReporterAction::StartIncrementalCycle {
            sources: sources.to_vec(),
            output_dirs: output_dirs.to_vec(),
        });
    }

    fn report_problem(&self, problem: &Diagnostic) {
        self.actions
            .lock()
            .push(ReporterAction::Problem(problem.clone()));
    }

    fn publish_diagnostics_summary(&self, summary: DiagnosticsSummary) {
        self.actions
            .lock()
            .push(ReporterAction::PublishDiagnosticsSummary(summary));
    }

    fn report_next_phase(&self, phase: &str) {
        self.actions
            .lock()
            .push(ReporterAction::NextPhase(phase.to_string()));
    }

    fn report_progress(&self, current: u64, total: u64) {
        self.actions
            .lock()
            .push(ReporterAction::Progress { current, total });
    }

    fn report_end_incremental_cycle(&self, duration_ms: u64, succeeded: bool) {
        self.actions.lock().push(ReporterAction::EndIncrementalCycle {
            duration_ms,
            succeeded,
        });
    }

    fn report_cancelled(&self) {
        self.actions.lock().push(ReporterAction::Cancelled);
    }

    fn report_end_compilation(&self, exit_code: i32) {
        self.actions
            .lock()
            .push(ReporterAction::EndCompilation { exit_code });
    }
}

/// Logger that records `(level, message)` pairs in call order.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(String, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().clone()
    }

    fn push(&self, level: &str, msg: &str) {
        self.lines.lock().push((level.to_string(), msg.to_string()));
    }
}

impl BuildLogger for RecordingLogger {
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }

    fn trace(&self, msg: &str) {
        self.push("trace", msg);
    }
}

/// A connected client rooted at a per-test directory.
pub struct TestClient {
    id: String,
    base: PathBuf,
}

impl TestClient {
    pub fn new(id: &str, base: &Path) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            base: base.to_path_buf(),
        })
    }
}

impl ClientInfo for TestClient {
    fn client_id(&self) -> &str {
        &self.id
    }

    fn unique_classes_dir_for(&self, project: &Project) -> PathBuf {
        self.base.join(&self.id).join(&project.name)
    }
}

/// Bundle factory wiring each client to its recording reporter and logger.
///
/// The new classes directory is the client's unique directory for the
/// project, so the unique executing compile materializes its outputs where
/// its originating client expects them; deduplicated subscribers receive a
/// copy into their own directory afterwards.
#[derive(Default)]
pub struct TestBundleFactory {
    sinks: Mutex<HashMap<String, (Arc<dyn Reporter>, Arc<dyn BuildLogger>)>>,
}

impl TestBundleFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_client(
        &self,
        client_id: &str,
        reporter: Arc<dyn Reporter>,
        logger: Arc<dyn BuildLogger>,
    ) {
        self.sinks
            .lock()
            .insert(client_id.to_string(), (reporter, logger));
    }
}

#[async_trait]
impl BundleFactory for TestBundleFactory {
    async fn setup(&self, inputs: BundleInputs) -> anyhow::Result<CompileBundle> {
        let (reporter, logger) = self
            .sinks
            .lock()
            .get(inputs.client.client_id())
            .cloned()
            .unwrap_or_else(|| {
                (
                    RecordingReporter::new() as Arc<dyn Reporter>,
                    RecordingLogger::new() as Arc<dyn BuildLogger>,
                )
            });
        let mut bundle = CompileBundle::new(inputs.project.clone(), reporter, logger);
        bundle.out.new_classes_dir = inputs.client.unique_classes_dir_for(&inputs.project);
        Ok(bundle)
    }
}
