// src/dag/mod.rs

pub mod graph;
pub mod results;

pub use graph::Dag;
pub use results::{
    blocked_by, collect_successes, collect_successes_from, contains_cancelled,
    direct_failed_projects, direct_successes, PartialCompileResult, PartialFailure,
    PartialSuccess, ResultDag,
};
