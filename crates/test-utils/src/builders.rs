#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use builddag::project::{Project, ProjectConfig, ProjectName};

/// Builder for [`Project`] to simplify test setup. Sources and output roots
/// are derived from a per-test workspace directory.
pub struct ProjectBuilder {
    name: ProjectName,
    dependencies: Vec<ProjectName>,
    sources: Vec<PathBuf>,
    classpath: Vec<PathBuf>,
    options: Vec<String>,
    classes_root: PathBuf,
}

impl ProjectBuilder {
    pub fn new(name: &str, workspace: &Path) -> Self {
        Self {
            name: name.to_string(),
            dependencies: vec![],
            sources: vec![workspace.join("src").join(name)],
            classpath: vec![],
            options: vec![],
            classes_root: workspace.join("out").join(name),
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.dependencies.push(dep.to_string());
        self
    }

    pub fn classpath_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.classpath.push(entry.into());
        self
    }

    pub fn option(mut self, option: &str) -> Self {
        self.options.push(option.to_string());
        self
    }

    pub fn build(self) -> Arc<Project> {
        Arc::new(Project {
            name: self.name,
            dependencies: self.dependencies,
            config: ProjectConfig {
                sources: self.sources,
                classpath: self.classpath,
                options: self.options,
                classes_root: self.classes_root,
            },
        })
    }
}
