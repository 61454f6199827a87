// src/dag/graph.rs

//! The project DAG.
//!
//! Shared dependencies are represented by shared `Arc` nodes: if two parents
//! depend on the same project they hold the same node, and the traversal
//! memoizes on node identity. [`Dag::from_projects`] builds such a DAG from
//! a flat project list and rejects unknown dependencies and cycles.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SchedulerError};
use crate::project::{Project, ProjectName};

/// A project DAG node.
#[derive(Debug)]
pub enum Dag {
    Leaf(Arc<Project>),
    Parent(Arc<Project>, Vec<Arc<Dag>>),
    /// Root-less fan-out used when several independent DAGs are scheduled
    /// together.
    Aggregate(Vec<Arc<Dag>>),
}

impl Dag {
    /// The project at this node, if any. `Aggregate` nodes carry none.
    pub fn project(&self) -> Option<&Arc<Project>> {
        match self {
            Dag::Leaf(project) => Some(project),
            Dag::Parent(project, _) => Some(project),
            Dag::Aggregate(_) => None,
        }
    }

    pub fn aggregate(dags: Vec<Arc<Dag>>) -> Arc<Dag> {
        Arc::new(Dag::Aggregate(dags))
    }

    /// Build DAGs from a flat project list, linking dependencies by name.
    ///
    /// Returns one entry per root (a project no other project depends on).
    /// Shared dependencies become shared nodes. Fails on unknown dependency
    /// names and on cycles.
    pub fn from_projects(projects: &[Arc<Project>]) -> Result<Vec<Arc<Dag>>> {
        let by_name: HashMap<&str, &Arc<Project>> = projects
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect();

        for project in projects {
            for dep in &project.dependencies {
                if !by_name.contains_key(dep.as_str()) {
                    return Err(SchedulerError::UnknownDependency {
                        project: project.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if dep == &project.name {
                    return Err(SchedulerError::Graph(format!(
                        "project '{}' cannot depend on itself",
                        project.name
                    )));
                }
            }
        }

        let order = dependency_order(projects)?;

        // Build nodes in dependency order so every dependency node exists
        // when its dependents are constructed. One node per project.
        let mut nodes: HashMap<ProjectName, Arc<Dag>> = HashMap::new();
        for name in order {
            let project = (*by_name[name.as_str()]).clone();
            let node = if project.dependencies.is_empty() {
                Arc::new(Dag::Leaf(project))
            } else {
                let children = project
                    .dependencies
                    .iter()
                    .map(|dep| nodes[dep].clone())
                    .collect();
                Arc::new(Dag::Parent(project, children))
            };
            nodes.insert(node.project().unwrap().name.clone(), node);
        }

        let depended_upon: HashSet<&ProjectName> = projects
            .iter()
            .flat_map(|p| p.dependencies.iter())
            .collect();
        Ok(projects
            .iter()
            .filter(|p| !depended_upon.contains(&p.name))
            .map(|p| nodes[&p.name].clone())
            .collect())
    }
}

/// Topological order of the projects (dependencies first). Fails on cycles.
fn dependency_order(projects: &[Arc<Project>]) -> Result<Vec<ProjectName>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for project in projects {
        graph.add_node(project.name.as_str());
    }
    for project in projects {
        for dep in &project.dependencies {
            graph.add_edge(dep.as_str(), project.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| n.to_string()).collect()),
        Err(cycle) => Err(SchedulerError::GraphCycle(cycle.node_id().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectConfig;

    fn project(name: &str, deps: &[&str]) -> Arc<Project> {
        Arc::new(Project {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            config: ProjectConfig {
                sources: vec![format!("/src/{name}").into()],
                classpath: vec![],
                options: vec![],
                classes_root: format!("/out/{name}").into(),
            },
        })
    }

    #[test]
    fn shared_dependencies_share_nodes() {
        // d -> b -> a, d -> c -> a
        let projects = vec![
            project("a", &[]),
            project("b", &["a"]),
            project("c", &["a"]),
            project("d", &["b", "c"]),
        ];
        let roots = Dag::from_projects(&projects).unwrap();
        assert_eq!(roots.len(), 1);

        let (b, c) = match &*roots[0] {
            Dag::Parent(_, children) => (children[0].clone(), children[1].clone()),
            other => panic!("expected parent, got {other:?}"),
        };
        let a_via_b = match &*b {
            Dag::Parent(_, children) => children[0].clone(),
            other => panic!("expected parent, got {other:?}"),
        };
        let a_via_c = match &*c {
            Dag::Parent(_, children) => children[0].clone(),
            other => panic!("expected parent, got {other:?}"),
        };
        assert!(Arc::ptr_eq(&a_via_b, &a_via_c));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let projects = vec![project("a", &["ghost"])];
        assert!(matches!(
            Dag::from_projects(&projects),
            Err(SchedulerError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let projects = vec![project("a", &["b"]), project("b", &["a"])];
        assert!(matches!(
            Dag::from_projects(&projects),
            Err(SchedulerError::GraphCycle(_))
        ));
    }

    #[test]
    fn independent_projects_produce_multiple_roots() {
        let projects = vec![project("a", &[]), project("b", &[])];
        let roots = Dag::from_projects(&projects).unwrap();
        assert_eq!(roots.len(), 2);
    }
}
