// tests/dedup_two_clients.rs

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use builddag::compiler::ClientInfo;
use builddag::dag::{Dag, PartialCompileResult};
use builddag::graph::CompileGraph;
use builddag::state::SchedulerState;
use builddag::task::ready;
use builddag::{CompileFingerprint, LastSuccessfulResult};
use builddag_test_utils::{
    FakeBehavior, FakeCompiler, ProjectBuilder, RecordingLogger, RecordingReporter,
    TestBundleFactory, TestClient,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_share_one_compilation() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let project = ProjectBuilder::new("a", workspace.path()).build();
    let dag = Dag::from_projects(&[project.clone()])?.remove(0);

    let compiler = FakeCompiler::new();
    compiler.behave("a", FakeBehavior::Succeed { delay_ms: 250 });

    let factory = TestBundleFactory::new();
    let reporter1 = RecordingReporter::new();
    let reporter2 = RecordingReporter::new();
    factory.register_client("client-1", reporter1.clone(), RecordingLogger::new());
    factory.register_client("client-2", reporter2.clone(), RecordingLogger::new());

    let client1 = TestClient::new("client-1", workspace.path());
    let client2 = TestClient::new("client-2", workspace.path());

    let graph = Arc::new(CompileGraph::new(
        SchedulerState::new(),
        factory.clone(),
        compiler.clone(),
    ));

    let first = {
        let (graph, dag, client) = (graph.clone(), dag.clone(), client1.clone());
        tokio::spawn(async move { graph.traverse(dag, client, false).await })
    };
    sleep(Duration::from_millis(60)).await;
    assert!(graph.state().is_running(&CompileFingerprint::of(&project)));
    let second = {
        let (graph, dag, client) = (graph.clone(), dag.clone(), client2.clone());
        tokio::spawn(async move { graph.traverse(dag, client, false).await })
    };

    let result1 = timeout(Duration::from_secs(5), first).await??;
    let result2 = timeout(Duration::from_secs(5), second).await??;

    // One fingerprint, one compile.
    assert_eq!(compiler.invocation_count("a"), 1);
    assert!(matches!(result1.result(), PartialCompileResult::Success(_)));
    assert!(matches!(result2.result(), PartialCompileResult::Success(_)));

    // Both clients saw the full reporter stream: start, cycle, end(0).
    for reporter in [&reporter1, &reporter2] {
        assert!(reporter.has_start_compilation());
        assert!(reporter.has_start_incremental_cycle());
        assert_eq!(reporter.end_compilation_codes(), vec![0]);
    }

    // The subscriber's per-client copy completes with its result task.
    if let PartialCompileResult::Success(success) = result2.result() {
        success.result.clone().await.expect("subscriber result");
    }

    let dir1 = client1.unique_classes_dir_for(&project);
    let dir2 = client2.unique_classes_dir_for(&project);
    assert!(dir1.join("Marker.class").is_file());
    assert!(dir2.join("Marker.class").is_file());

    assert_eq!(graph.state().running_compilations(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_directory_is_deleted_once_unreferenced() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let project = ProjectBuilder::new("p", workspace.path()).build();
    let dag = Dag::from_projects(&[project.clone()])?.remove(0);

    // A previous successful output exists on disk before any client shows up.
    let v1 = workspace.path().join("out").join("p").join("v1");
    std::fs::create_dir_all(&v1)?;
    std::fs::write(v1.join("Old.class"), b"p")?;

    let state = SchedulerState::new();
    state.register_last_successful(LastSuccessfulResult::new(
        "p",
        v1.clone(),
        None,
        ready(Ok(())),
    ));
    assert_eq!(state.reference_count(&v1), 0);

    let compiler = FakeCompiler::new();
    compiler.behave("p", FakeBehavior::Succeed { delay_ms: 250 });
    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    factory.register_client("client-2", RecordingReporter::new(), RecordingLogger::new());

    let client1 = TestClient::new("client-1", workspace.path());
    let client2 = TestClient::new("client-2", workspace.path());
    let graph = Arc::new(CompileGraph::new(state, factory.clone(), compiler.clone()));

    let first = {
        let (graph, dag, client) = (graph.clone(), dag.clone(), client1.clone());
        tokio::spawn(async move { graph.traverse(dag, client, false).await })
    };
    sleep(Duration::from_millis(60)).await;
    // One holder per fingerprint miss, not per subscriber.
    assert_eq!(graph.state().reference_count(&v1), 1);

    let second = {
        let (graph, dag, client) = (graph.clone(), dag.clone(), client2.clone());
        tokio::spawn(async move { graph.traverse(dag, client, false).await })
    };
    sleep(Duration::from_millis(60)).await;
    assert_eq!(graph.state().reference_count(&v1), 1);

    timeout(Duration::from_secs(5), first).await??;
    timeout(Duration::from_secs(5), second).await??;

    let latest = graph
        .state()
        .last_successful_for("p")
        .expect("a successful result is registered");
    assert_eq!(latest.classes_dir, client1.unique_classes_dir_for(&project));

    // The displaced directory goes away exactly once both populating steps
    // have run; awaiting the composite observes the deletion.
    latest
        .populating_products()
        .await
        .expect("populate-then-delete composite");
    assert!(!v1.exists());
    assert_eq!(graph.state().reference_count(&v1), 0);

    // Re-evaluating the memoized composite performs no further work.
    latest.populating_products().await.expect("idempotent");
    Ok(())
}
