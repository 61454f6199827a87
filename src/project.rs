// src/project.rs

//! Project handles and their static configuration.
//!
//! A [`Project`] is an opaque handle with stable identity: its name plus the
//! configuration that feeds the compile fingerprint. The scheduler never
//! inspects sources or options beyond hashing them; deciding *what* to
//! compile belongs to the embedding server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Public type alias for project names throughout the scheduler.
pub type ProjectName = String;

/// Static per-project configuration relevant to scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectConfig {
    /// Source files (or source roots) of the project.
    pub sources: Vec<PathBuf>,
    /// Raw compilation classpath, in classpath order. Order is significant:
    /// pipelined signature stores are concatenated in this order.
    pub classpath: Vec<PathBuf>,
    /// Compiler options, in the order the compiler receives them.
    pub options: Vec<String>,
    /// Root directory under which this project's classes directories are
    /// allocated.
    pub classes_root: PathBuf,
}

/// An opaque project handle with stable identity (name + configuration).
///
/// Equality and hash govern reuse in the traversal memo table and feed the
/// compile fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    pub name: ProjectName,
    /// Direct dependencies, by name. Used by [`crate::dag::Dag::from_projects`]
    /// to build the project DAG.
    pub dependencies: Vec<ProjectName>,
    pub config: ProjectConfig,
}

impl Project {
    pub fn new(name: impl Into<ProjectName>, config: ProjectConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            dependencies: Vec::new(),
            config,
        })
    }

    /// Well-known path standing in for "no previous output". The directory is
    /// never created, so an existence check on it always fails and a fresh
    /// compile never reuses it.
    pub fn empty_classes_dir(&self) -> PathBuf {
        self.config.classes_root.join("empty-classes")
    }

    /// Directory a new compilation writes into, unique per fingerprint.
    pub fn new_classes_dir(&self, fingerprint_prefix: &str) -> PathBuf {
        self.config
            .classes_root
            .join(format!("classes-{fingerprint_prefix}"))
    }

    pub fn classes_root(&self) -> &Path {
        &self.config.classes_root
    }
}
