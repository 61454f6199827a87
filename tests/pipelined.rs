// tests/pipelined.rs

mod common;

use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;

use builddag::dag::{collect_successes, Dag, PartialCompileResult};
use builddag::graph::CompileGraph;
use builddag::signal::JavaSignal;
use builddag::state::SchedulerState;
use builddag_test_utils::{
    FakeBehavior, FakeCompiler, ProjectBuilder, RecordingLogger, RecordingReporter,
    TestBundleFactory, TestClient,
};

type TestResult = Result<(), Box<dyn Error>>;

fn index_of(events: &[String], needle: &str) -> usize {
    events
        .iter()
        .position(|event| event == needle)
        .unwrap_or_else(|| panic!("event {needle} not found in {events:?}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependent_starts_on_signatures_before_upstream_java_completes() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let a = ProjectBuilder::new("a", workspace.path()).build();
    let b = ProjectBuilder::new("b", workspace.path()).depends_on("a").build();
    let dag = Dag::from_projects(&[a, b])?.remove(0);

    let compiler = FakeCompiler::new();
    compiler.behave(
        "a",
        FakeBehavior::Pipelined {
            signatures_after_ms: 30,
            java_after_ms: 250,
            fail_java: false,
        },
    );
    compiler.behave(
        "b",
        FakeBehavior::Pipelined {
            signatures_after_ms: 10,
            java_after_ms: 10,
            fail_java: false,
        },
    );

    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(Duration::from_secs(5), graph.traverse(dag, client, true)).await?;

    // Both nodes resolved as successes at signature time; drive the forked
    // compilations to completion before inspecting ordering.
    let successes = collect_successes(&result);
    assert_eq!(successes.len(), 2);
    for success in &successes {
        success.result.clone().await.expect("compilation result");
    }

    // The dependent entered the compiler while upstream Java codegen was
    // still running.
    let events = compiler.events();
    assert!(
        index_of(&events, "b:start") < index_of(&events, "a:java-ok"),
        "expected b to start before a finished Java: {events:?}"
    );

    // The dependency store carried the upstream signatures.
    assert_eq!(compiler.observed_signature_origins("b"), vec!["a".to_string()]);

    // The gate opened once upstream Java completed.
    assert_eq!(compiler.observed_trigger("b"), Some(JavaSignal::Continue));

    assert_eq!(graph.state().running_compilations(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upstream_java_failure_fails_fast_downstream() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let a = ProjectBuilder::new("a", workspace.path()).build();
    let b = ProjectBuilder::new("b", workspace.path()).depends_on("a").build();
    let dag = Dag::from_projects(&[a, b])?.remove(0);

    let compiler = FakeCompiler::new();
    compiler.behave(
        "a",
        FakeBehavior::Pipelined {
            signatures_after_ms: 10,
            java_after_ms: 30,
            fail_java: true,
        },
    );
    compiler.behave(
        "b",
        FakeBehavior::Pipelined {
            signatures_after_ms: 10,
            java_after_ms: 10,
            fail_java: false,
        },
    );

    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(Duration::from_secs(5), graph.traverse(dag, client, true)).await?;

    for success in collect_successes(&result) {
        success.result.clone().await.expect("compilation result");
    }

    // The dependent consulted the gate before its Java phase and skipped it.
    assert_eq!(
        compiler.observed_trigger("b"),
        Some(JavaSignal::FailFast(vec!["a".to_string()]))
    );
    let events = compiler.events();
    assert!(events.contains(&"b:java-skipped".to_string()), "{events:?}");

    assert_eq!(graph.state().running_compilations(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn non_pipelining_compiler_still_succeeds_under_pipelined_scheduling() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let a = ProjectBuilder::new("a", workspace.path()).build();
    let b = ProjectBuilder::new("b", workspace.path()).depends_on("a").build();
    let dag = Dag::from_projects(&[a, b])?.remove(0);

    // `Succeed` never touches the signature promise: the scheduler falls
    // back to completion-time resolution for that node.
    let compiler = FakeCompiler::new();
    compiler.behave("a", FakeBehavior::Succeed { delay_ms: 20 });
    compiler.behave(
        "b",
        FakeBehavior::Pipelined {
            signatures_after_ms: 10,
            java_after_ms: 10,
            fail_java: false,
        },
    );

    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(Duration::from_secs(5), graph.traverse(dag, client, true)).await?;

    let successes = collect_successes(&result);
    assert_eq!(successes.len(), 2);
    for success in &successes {
        success.result.clone().await.expect("compilation result");
    }
    assert!(matches!(result.result(), PartialCompileResult::Success(_)));
    assert_eq!(compiler.observed_signature_origins("b"), Vec::<String>::new());
    Ok(())
}
