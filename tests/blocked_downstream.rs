// tests/blocked_downstream.rs

mod common;

use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;

use builddag::dag::{blocked_by, Dag, PartialCompileResult};
use builddag::errors::FailureCause;
use builddag::graph::CompileGraph;
use builddag::state::SchedulerState;
use builddag_test_utils::{
    FakeBehavior, FakeCompiler, ProjectBuilder, RecordingLogger, RecordingReporter,
    TestBundleFactory, TestClient,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn upstream_failure_blocks_dependent() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let a = ProjectBuilder::new("a", workspace.path()).build();
    let b = ProjectBuilder::new("b", workspace.path()).depends_on("a").build();
    let dag = Dag::from_projects(&[a, b])?.remove(0);

    let compiler = FakeCompiler::new();
    compiler.behave("a", FakeBehavior::Fail { delay_ms: 10 });
    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(
        Duration::from_secs(5),
        graph.traverse(dag, client, false),
    )
    .await?;

    // The dependent is blocked and never handed to the compiler.
    assert_eq!(compiler.invocations(), vec!["a".to_string()]);

    match result.result() {
        PartialCompileResult::Failure(failure) => {
            assert_eq!(failure.project.name, "b");
            match &failure.cause {
                FailureCause::Blocked(on) => assert_eq!(on, &vec!["a".to_string()]),
                other => panic!("expected Blocked cause, got {other}"),
            }
        }
        _ => panic!("expected the dependent to fail"),
    }
    match result.children()[0].result() {
        PartialCompileResult::Failure(failure) => {
            assert_eq!(failure.project.name, "a");
            assert!(matches!(failure.cause, FailureCause::Compiler));
        }
        _ => panic!("expected the upstream to fail"),
    }

    assert_eq!(blocked_by(&result).expect("root is blocked").name, "b");
    assert_eq!(graph.state().running_compilations(), 0);
    Ok(())
}

#[tokio::test]
async fn shared_dependency_compiles_once_per_traversal() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    // d -> b -> a and d -> c -> a: the sub-DAG of a is shared.
    let projects = vec![
        ProjectBuilder::new("a", workspace.path()).build(),
        ProjectBuilder::new("b", workspace.path()).depends_on("a").build(),
        ProjectBuilder::new("c", workspace.path()).depends_on("a").build(),
        ProjectBuilder::new("d", workspace.path())
            .depends_on("b")
            .depends_on("c")
            .build(),
    ];
    let dag = Dag::from_projects(&projects)?.remove(0);

    let compiler = FakeCompiler::new();
    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(
        Duration::from_secs(5),
        graph.traverse(dag, client, false),
    )
    .await?;

    assert!(matches!(result.result(), PartialCompileResult::Success(_)));
    for name in ["a", "b", "c", "d"] {
        assert_eq!(compiler.invocation_count(name), 1, "project {name}");
    }
    assert!(blocked_by(&result).is_none());
    Ok(())
}

#[tokio::test]
async fn aggregates_wrap_independent_roots() -> TestResult {
    common::init_tracing();

    let workspace = tempfile::tempdir()?;
    let projects = vec![
        ProjectBuilder::new("x", workspace.path()).build(),
        ProjectBuilder::new("y", workspace.path()).build(),
    ];
    let roots = Dag::from_projects(&projects)?;
    let dag = Dag::aggregate(roots);

    let compiler = FakeCompiler::new();
    compiler.behave("y", FakeBehavior::Fail { delay_ms: 0 });
    let factory = TestBundleFactory::new();
    factory.register_client("client-1", RecordingReporter::new(), RecordingLogger::new());
    let client = TestClient::new("client-1", workspace.path());

    let graph = CompileGraph::new(SchedulerState::new(), factory, compiler.clone());
    let result = timeout(
        Duration::from_secs(5),
        graph.traverse(dag, client, false),
    )
    .await?;

    // Aggregate roots become a parent of an empty placeholder.
    assert!(matches!(result.result(), PartialCompileResult::Empty));
    assert_eq!(result.children().len(), 2);

    // The failed root surfaces through the placeholder.
    assert_eq!(blocked_by(&result).expect("y failed").name, "y");
    Ok(())
}
