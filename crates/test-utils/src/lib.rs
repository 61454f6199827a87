pub mod builders;
pub mod compiler;
pub mod recording;

pub use builders::ProjectBuilder;
pub use compiler::{FakeBehavior, FakeCompiler};
pub use recording::{RecordingLogger, RecordingReporter, TestBundleFactory, TestClient};
