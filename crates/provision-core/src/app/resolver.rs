//! Task graph resolution: validate declarations and fix an execution order.

use std::collections::HashMap;
use std::fmt;

use crate::app::dependency::DependencyGraph;
use crate::domain::{TaskDecl, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),

    #[error("task {task} depends on unknown task {missing}")]
    MissingDependency { task: TaskId, missing: TaskId },

    #[error("dependency cycle: {}", CyclePath(.path))]
    Cycle { path: Vec<TaskId> },

    #[error("no task is tagged with any of {0:?}")]
    NoTaggedTasks(Vec<String>),
}

struct CyclePath<'a>(&'a [TaskId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.0.iter().map(TaskId::as_str).collect();
        f.write_str(&parts.join(" -> "))
    }
}

/// A validated task set in execution order.
///
/// Every task appears after all of its dependencies; tasks that become
/// ready together keep their declaration order.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    tasks: Vec<TaskDecl>,
    graph: DependencyGraph,
}

impl ResolvedGraph {
    /// Tasks in execution order.
    pub fn tasks(&self) -> &[TaskDecl] {
        &self.tasks
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn dependencies_of(&self, task: &TaskId) -> Vec<TaskId> {
        self.graph.get_dependencies(task)
    }

    /// Restrict to tasks carrying any of `tags`, plus everything they
    /// transitively depend on. An empty tag list selects everything.
    pub fn select_tags(self, tags: &[String]) -> Result<Self, GraphError> {
        if tags.is_empty() {
            return Ok(self);
        }
        let roots: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.has_any_tag(tags))
            .map(|t| t.id.clone())
            .collect();
        if roots.is_empty() {
            return Err(GraphError::NoTaggedTasks(tags.to_vec()));
        }
        let keep = self.graph.closure(&roots);
        let tasks: Vec<TaskDecl> = self
            .tasks
            .into_iter()
            .filter(|t| keep.contains(&t.id))
            .collect();
        let mut graph = DependencyGraph::new();
        for task in &tasks {
            graph.add_task(task.id.clone());
            for dep in &task.depends_on {
                graph.add_dependency(task.id.clone(), dep.clone());
            }
        }
        Ok(Self { tasks, graph })
    }
}

/// Validate `decls` and order them.
///
/// Checks, in order: duplicate ids, dangling dependencies, cycles. Touches
/// nothing outside the declarations.
pub fn resolve(decls: Vec<TaskDecl>) -> Result<ResolvedGraph, GraphError> {
    let mut graph = DependencyGraph::new();
    for decl in &decls {
        if !graph.add_task(decl.id.clone()) {
            return Err(GraphError::DuplicateTask(decl.id.clone()));
        }
    }
    for decl in &decls {
        for dep in &decl.depends_on {
            if !graph.contains(dep) {
                return Err(GraphError::MissingDependency {
                    task: decl.id.clone(),
                    missing: dep.clone(),
                });
            }
            graph.add_dependency(decl.id.clone(), dep.clone());
        }
    }

    let order = graph
        .topological_order()
        .map_err(|path| GraphError::Cycle { path })?;

    let mut by_id: HashMap<TaskId, TaskDecl> =
        decls.into_iter().map(|d| (d.id.clone(), d)).collect();
    let tasks = order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();
    Ok(ResolvedGraph { tasks, graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionTemplate, Condition, Guard};
    use rstest::rstest;

    fn task(id: &str, deps: &[&str]) -> TaskDecl {
        TaskDecl::new(
            id,
            "",
            Guard::satisfied_when(Condition::deployed(id)),
            ActionTemplate::deploy(id, vec![]),
        )
        .after(deps)
    }

    fn ids(graph: &ResolvedGraph) -> Vec<&str> {
        graph.tasks().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let graph = resolve(vec![
            task("resolver", &["controller"]),
            task("controller", &["registrar"]),
            task("registrar", &["registry"]),
            task("registry", &[]),
        ])
        .unwrap();

        assert_eq!(ids(&graph), vec!["registry", "registrar", "controller", "resolver"]);
    }

    #[test]
    fn independent_tasks_keep_declaration_order() {
        let graph = resolve(vec![
            task("b", &[]),
            task("a", &[]),
            task("c", &["a"]),
            task("d", &[]),
        ])
        .unwrap();

        assert_eq!(ids(&graph), vec!["b", "a", "c", "d"]);
    }

    #[rstest]
    #[case::two_node(vec![task("a", &["b"]), task("b", &["a"])], vec!["a", "b", "a"])]
    #[case::self_loop(vec![task("a", &["a"])], vec!["a", "a"])]
    fn cycles_are_rejected_with_their_path(
        #[case] decls: Vec<TaskDecl>,
        #[case] expected: Vec<&str>,
    ) {
        let path = match resolve(decls).unwrap_err() {
            GraphError::Cycle { path } => path,
            other => panic!("expected cycle, got {other:?}"),
        };
        let path: Vec<&str> = path.iter().map(TaskId::as_str).collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn missing_dependency_is_named() {
        let err = resolve(vec![task("a", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                task: TaskId::from("a"),
                missing: TaskId::from("ghost"),
            }
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = resolve(vec![task("a", &[]), task("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask(TaskId::from("a")));
    }

    #[test]
    fn cycle_error_renders_path() {
        let err = GraphError::Cycle {
            path: vec![TaskId::from("a"), TaskId::from("b"), TaskId::from("a")],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn tag_selection_pulls_in_dependencies() {
        let graph = resolve(vec![
            task("registry", &[]),
            task("registrar", &["registry"]).tagged(&["registrar"]),
            task("multicall", &[]).tagged(&["utils"]),
        ])
        .unwrap()
        .select_tags(&["registrar".to_string()])
        .unwrap();

        assert_eq!(ids(&graph), vec!["registry", "registrar"]);
    }

    #[test]
    fn unknown_tags_are_an_error() {
        let err = resolve(vec![task("a", &[])])
            .unwrap()
            .select_tags(&["nope".to_string()])
            .unwrap_err();
        assert!(matches!(err, GraphError::NoTaggedTasks(_)));
    }

    #[test]
    fn empty_input_resolves_to_empty_graph() {
        assert!(resolve(vec![]).unwrap().is_empty());
    }
}
