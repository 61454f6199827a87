#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use builddag::bundle::{CompileAnalysis, LastSuccessfulResult};
use builddag::compiler::{
    CompileInputs, CompileProducts, Compiler, Diagnostic, DiagnosticsSummary, ResultBundle,
    Severity,
};
use builddag::project::ProjectName;
use builddag::signal::JavaSignal;
use builddag::signatures::{PickledSignatures, SignatureStore};
use builddag::task::{ready, TaskError};

/// Scripted behavior of the fake compiler for one project.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Compile successfully after the given delay.
    Succeed { delay_ms: u64 },
    /// Fail with one error diagnostic after the given delay.
    Fail { delay_ms: u64 },
    /// Report a cancellation after the given delay.
    Cancel { delay_ms: u64 },
    /// Pipelined compile: publish signatures after `signatures_after_ms`,
    /// then consult the Java trigger and finish the Java phase after another
    /// `java_after_ms`.
    Pipelined {
        signatures_after_ms: u64,
        java_after_ms: u64,
        fail_java: bool,
    },
}

impl Default for FakeBehavior {
    fn default() -> Self {
        FakeBehavior::Succeed { delay_ms: 0 }
    }
}

/// A fake compiler that:
/// - records which projects were compiled (and how often)
/// - emits the reporter actions a real compile would emit
/// - writes a marker class file into the new classes directory on success
/// - keeps an ordered event log for cross-project ordering assertions.
#[derive(Default)]
pub struct FakeCompiler {
    behaviors: Mutex<HashMap<ProjectName, FakeBehavior>>,
    invocations: Mutex<Vec<ProjectName>>,
    events: Mutex<Vec<String>>,
    observed_triggers: Mutex<HashMap<ProjectName, JavaSignal>>,
    observed_signature_origins: Mutex<HashMap<ProjectName, Vec<ProjectName>>>,
}

impl FakeCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn behave(&self, project: &str, behavior: FakeBehavior) {
        self.behaviors.lock().insert(project.to_string(), behavior);
    }

    pub fn invocations(&self) -> Vec<ProjectName> {
        self.invocations.lock().clone()
    }

    pub fn invocation_count(&self, project: &str) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|name| name.as_str() == project)
            .count()
    }

    /// Ordered log of `<project>:<event>` entries across all compilations.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// The Java trigger value the project's compile observed before its Java
    /// phase, if it got that far.
    pub fn observed_trigger(&self, project: &str) -> Option<JavaSignal> {
        self.observed_triggers.lock().get(project).cloned()
    }

    /// Origins of the signature stores the project compiled against, in
    /// store order.
    pub fn observed_signature_origins(&self, project: &str) -> Vec<ProjectName> {
        self.observed_signature_origins
            .lock()
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    fn push_event(&self, event: String) {
        self.events.lock().push(event);
    }

    fn behavior_for(&self, project: &str) -> FakeBehavior {
        self.behaviors
            .lock()
            .get(project)
            .cloned()
            .unwrap_or_default()
    }
}

fn error_diagnostic(message: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        message: message.to_string(),
        file: None,
        line: None,
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, inputs: CompileInputs) -> anyhow::Result<ResultBundle> {
        let project = inputs.bundle.project.clone();
        let name = project.name.clone();
        self.invocations.lock().push(name.clone());
        self.push_event(format!("{name}:start"));
        self.observed_signature_origins.lock().insert(
            name.clone(),
            inputs
                .dependency_signatures
                .entries()
                .iter()
                .map(|entry| entry.origin.clone())
                .collect(),
        );

        let reporter = inputs.reporter.clone();
        reporter.report_start_compilation();
        reporter.report_start_incremental_cycle(
            &project.config.sources,
            &[inputs.bundle.out.new_classes_dir.clone()],
        );

        match self.behavior_for(&name) {
            FakeBehavior::Succeed { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let new_dir = inputs.bundle.out.new_classes_dir.clone();
                fs::create_dir_all(&new_dir)?;
                fs::write(new_dir.join("Marker.class"), name.as_bytes())?;

                reporter.publish_diagnostics_summary(DiagnosticsSummary::default());
                reporter.report_end_incremental_cycle(delay_ms, true);
                reporter.report_end_compilation(0);
                self.push_event(format!("{name}:done"));

                let successful = LastSuccessfulResult::new(
                    name,
                    new_dir.clone(),
                    Some(Arc::new(CompileAnalysis::default())),
                    ready(Ok(())),
                );
                Ok(ResultBundle::ok(
                    CompileProducts {
                        read_only_classes_dir: inputs.bundle.out.read_only_classes_dir.clone(),
                        new_classes_dir: new_dir,
                    },
                    successful,
                ))
            }
            FakeBehavior::Fail { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let problem = error_diagnostic(&format!("type mismatch in {name}"));
                reporter.report_problem(&problem);
                reporter.publish_diagnostics_summary(DiagnosticsSummary {
                    errors: 1,
                    warnings: 0,
                });
                reporter.report_end_incremental_cycle(delay_ms, false);
                reporter.report_end_compilation(1);
                self.push_event(format!("{name}:failed"));
                Ok(ResultBundle::failed(vec![problem]))
            }
            FakeBehavior::Cancel { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                reporter.report_cancelled();
                reporter.report_end_compilation(130);
                self.push_event(format!("{name}:cancelled"));
                Ok(ResultBundle::cancelled())
            }
            FakeBehavior::Pipelined {
                signatures_after_ms,
                java_after_ms,
                fail_java,
            } => {
                tokio::time::sleep(Duration::from_millis(signatures_after_ms)).await;
                self.push_event(format!("{name}:signatures"));
                if let Some(promise) = inputs.signatures {
                    promise.complete(SignatureStore::single(PickledSignatures {
                        origin: name.clone(),
                        classes_dir: inputs.bundle.out.new_classes_dir.clone(),
                        bytes: name.as_bytes().to_vec(),
                    }));
                }

                reporter.report_next_phase("jvm");
                let trigger = inputs.java_trigger.clone().await;
                self.observed_triggers
                    .lock()
                    .insert(name.clone(), trigger.clone());

                if let JavaSignal::FailFast(upstreams) = trigger {
                    // Skip Java codegen entirely when an upstream failed.
                    self.push_event(format!("{name}:java-skipped"));
                    let problem = error_diagnostic(&format!(
                        "skipping Java phase of {name}; upstream failed: {upstreams:?}"
                    ));
                    reporter.report_problem(&problem);
                    reporter.report_end_compilation(1);
                    if let Some(promise) = inputs.java_completed {
                        promise.fail(TaskError::msg("upstream Java phase failed"));
                    }
                    return Ok(ResultBundle::failed(vec![problem]));
                }

                tokio::time::sleep(Duration::from_millis(java_after_ms)).await;
                if fail_java {
                    self.push_event(format!("{name}:java-failed"));
                    let problem = error_diagnostic(&format!("javac failed in {name}"));
                    reporter.report_problem(&problem);
                    reporter.report_end_compilation(1);
                    if let Some(promise) = inputs.java_completed {
                        promise.fail(TaskError::msg(format!("javac failed in {name}")));
                    }
                    Ok(ResultBundle::failed(vec![problem]))
                } else {
                    self.push_event(format!("{name}:java-ok"));
                    let new_dir = inputs.bundle.out.new_classes_dir.clone();
                    fs::create_dir_all(&new_dir)?;
                    fs::write(new_dir.join("Marker.class"), name.as_bytes())?;
                    reporter.report_end_incremental_cycle(
                        signatures_after_ms + java_after_ms,
                        true,
                    );
                    reporter.report_end_compilation(0);
                    if let Some(promise) = inputs.java_completed {
                        promise.complete(());
                    }
                    let successful = LastSuccessfulResult::new(
                        name,
                        new_dir.clone(),
                        Some(Arc::new(CompileAnalysis::default())),
                        ready(Ok(())),
                    );
                    Ok(ResultBundle::ok(
                        CompileProducts {
                            read_only_classes_dir: inputs
                                .bundle
                                .out
                                .read_only_classes_dir
                                .clone(),
                            new_classes_dir: new_dir,
                        },
                        successful,
                    ))
                }
            }
        }
    }
}
