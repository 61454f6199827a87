// src/mirror.rs

//! The event mirror: a hot multicast stream of reporter and logger actions.
//!
//! Every compilation writes its events once; the originating client and any
//! deduplicated late joiners read independently. A subscriber first receives
//! the full history, then live events, under one lock acquisition, so the
//! order every subscriber observes is exactly the producer's emission order.
//! Buffering is unbounded: a slow subscriber must never stall compilation,
//! and a typical compilation emits a small number of events.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::compiler::{BuildLogger, Diagnostic, DiagnosticsSummary, Reporter};

/// Reporter actions recorded for replay, in emission order.
#[derive(Debug, Clone)]
pub enum ReporterAction {
    StartCompilation,
    StartIncrementalCycle {
        sources: Vec<PathBuf>,
        output_dirs: Vec<PathBuf>,
    },
    Problem(Diagnostic),
    PublishDiagnosticsSummary(DiagnosticsSummary),
    NextPhase(String),
    Progress {
        current: u64,
        total: u64,
    },
    EndIncrementalCycle {
        duration_ms: u64,
        succeeded: bool,
    },
    Cancelled,
    EndCompilation {
        exit_code: i32,
    },
}

#[derive(Debug, Clone)]
pub enum LoggerAction {
    Error(String),
    Warn(String),
    Info(String),
    Debug(String),
    Trace(String),
}

#[derive(Debug, Clone)]
pub enum MirrorEvent {
    Reporter(ReporterAction),
    Logger(LoggerAction),
}

struct MirrorInner {
    history: Vec<MirrorEvent>,
    subscribers: Vec<mpsc::UnboundedSender<MirrorEvent>>,
    closed: bool,
}

/// Hot multicast stream with history replay for late subscribers.
#[derive(Clone)]
pub struct EventMirror {
    inner: Arc<Mutex<MirrorInner>>,
}

impl Default for EventMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl EventMirror {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MirrorInner {
                history: Vec::new(),
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Record an event and forward it to every live subscriber. Never blocks
    /// the producer.
    pub fn publish(&self, event: MirrorEvent) {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!("event published after mirror close; dropping");
            return;
        }
        inner.history.push(event.clone());
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Subscribe, receiving the full history first and live events after.
    ///
    /// If the mirror is already closed the receiver yields the history and
    /// then terminates.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MirrorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        for event in &inner.history {
            let _ = tx.send(event.clone());
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// Close the stream. Subscribers terminate after draining what they have
    /// already been sent.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// Apply a mirrored event to a subscriber's own reporter and logger.
///
/// `Trace` events are demoted to `debug` on replay.
pub fn apply_event(event: MirrorEvent, reporter: &dyn Reporter, logger: &dyn BuildLogger) {
    match event {
        MirrorEvent::Reporter(action) => match action {
            ReporterAction::StartCompilation => reporter.report_start_compilation(),
            ReporterAction::StartIncrementalCycle {
                sources,
                output_dirs,
            } => reporter.report_start_incremental_cycle(&sources, &output_dirs),
            ReporterAction::Problem(problem) => reporter.report_problem(&problem),
            ReporterAction::PublishDiagnosticsSummary(summary) => {
                reporter.publish_diagnostics_summary(summary)
            }
            ReporterAction::NextPhase(phase) => reporter.report_next_phase(&phase),
            ReporterAction::Progress { current, total } => {
                reporter.report_progress(current, total)
            }
            ReporterAction::EndIncrementalCycle {
                duration_ms,
                succeeded,
            } => reporter.report_end_incremental_cycle(duration_ms, succeeded),
            ReporterAction::Cancelled => reporter.report_cancelled(),
            ReporterAction::EndCompilation { exit_code } => {
                reporter.report_end_compilation(exit_code)
            }
        },
        MirrorEvent::Logger(action) => match action {
            LoggerAction::Error(msg) => logger.error(&msg),
            LoggerAction::Warn(msg) => logger.warn(&msg),
            LoggerAction::Info(msg) => logger.info(&msg),
            LoggerAction::Debug(msg) => logger.debug(&msg),
            LoggerAction::Trace(msg) => logger.debug(&msg),
        },
    }
}

/// Reporter wrapper that tees every action into the mirror before forwarding
/// it to the client's own reporter.
pub struct MirroringReporter {
    inner: Arc<dyn Reporter>,
    mirror: EventMirror,
}

impl MirroringReporter {
    pub fn new(inner: Arc<dyn Reporter>, mirror: EventMirror) -> Arc<Self> {
        Arc::new(Self { inner, mirror })
    }
}

impl Reporter for MirroringReporter {
    fn report_start_compilation(&self) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::StartCompilation));
        self.inner.report_start_compilation();
    }

    fn report_start_incremental_cycle(&self, sources: &[PathBuf], output_dirs: &[PathBuf]) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::StartIncrementalCycle {
                sources: sources.to_vec(),
                output_dirs: output_dirs.to_vec(),
            }));
        self.inner.report_start_incremental_cycle(sources, output_dirs);
    }

    fn report_problem(&self, problem: &Diagnostic) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::Problem(
                problem.clone(),
            )));
        self.inner.report_problem(problem);
    }

    fn publish_diagnostics_summary(&self, summary: DiagnosticsSummary) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::PublishDiagnosticsSummary(summary)));
        self.inner.publish_diagnostics_summary(summary);
    }

    fn report_next_phase(&self, phase: &str) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::NextPhase(
                phase.to_string(),
            )));
        self.inner.report_next_phase(phase);
    }

    fn report_progress(&self, current: u64, total: u64) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::Progress {
                current,
                total,
            }));
        self.inner.report_progress(current, total);
    }

    fn report_end_incremental_cycle(&self, duration_ms: u64, succeeded: bool) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::EndIncrementalCycle {
                duration_ms,
                succeeded,
            }));
        self.inner.report_end_incremental_cycle(duration_ms, succeeded);
    }

    fn report_cancelled(&self) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::Cancelled));
        self.inner.report_cancelled();
    }

    fn report_end_compilation(&self, exit_code: i32) {
        self.mirror
            .publish(MirrorEvent::Reporter(ReporterAction::EndCompilation {
                exit_code,
            }));
        self.inner.report_end_compilation(exit_code);
    }
}

/// Logger wrapper mirroring every line, same shape as [`MirroringReporter`].
pub struct MirroringLogger {
    inner: Arc<dyn BuildLogger>,
    mirror: EventMirror,
}

impl MirroringLogger {
    pub fn new(inner: Arc<dyn BuildLogger>, mirror: EventMirror) -> Arc<Self> {
        Arc::new(Self { inner, mirror })
    }
}

impl BuildLogger for MirroringLogger {
    fn error(&self, msg: &str) {
        self.mirror
            .publish(MirrorEvent::Logger(LoggerAction::Error(msg.to_string())));
        self.inner.error(msg);
    }

    fn warn(&self, msg: &str) {
        self.mirror
            .publish(MirrorEvent::Logger(LoggerAction::Warn(msg.to_string())));
        self.inner.warn(msg);
    }

    fn info(&self, msg: &str) {
        self.mirror
            .publish(MirrorEvent::Logger(LoggerAction::Info(msg.to_string())));
        self.inner.info(msg);
    }

    fn debug(&self, msg: &str) {
        self.mirror
            .publish(MirrorEvent::Logger(LoggerAction::Debug(msg.to_string())));
        self.inner.debug(msg);
    }

    fn trace(&self, msg: &str) {
        self.mirror
            .publish(MirrorEvent::Logger(LoggerAction::Trace(msg.to_string())));
        self.inner.trace(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> MirrorEvent {
        MirrorEvent::Reporter(ReporterAction::Progress {
            current: n,
            total: 10,
        })
    }

    fn progress_of(event: &MirrorEvent) -> u64 {
        match event {
            MirrorEvent::Reporter(ReporterAction::Progress { current, .. }) => *current,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_history_then_live_events_in_order() {
        let mirror = EventMirror::new();
        mirror.publish(event(1));
        mirror.publish(event(2));

        let mut rx = mirror.subscribe();
        mirror.publish(event(3));
        mirror.close();

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(progress_of(&ev));
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribing_after_close_yields_history_only() {
        let mirror = EventMirror::new();
        mirror.publish(event(1));
        mirror.close();
        mirror.publish(event(2));

        let mut rx = mirror.subscribe();
        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(progress_of(&ev));
        }
        assert_eq!(seen, vec![1]);
    }
}
