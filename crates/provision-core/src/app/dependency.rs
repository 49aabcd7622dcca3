//! Dependency graph over task ids.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges are kept in sync
//! - Nodes remember insertion order; every traversal follows it, so results
//!   are deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::TaskId;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in insertion order.
    nodes: Vec<TaskId>,
    index: HashMap<TaskId, usize>,

    /// Forward edges: task -> tasks it depends on.
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// Reverse edges: task -> tasks that depend on it.
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; returns false if it was already present.
    pub fn add_task(&mut self, task: TaskId) -> bool {
        if self.index.contains_key(&task) {
            return false;
        }
        self.index.insert(task.clone(), self.nodes.len());
        self.nodes.push(task);
        true
    }

    /// `task` depends on `depends_on` ("task waits for depends_on").
    /// Unknown endpoints are registered as nodes.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.add_task(task.clone());
        self.add_task(depends_on.clone());
        self.edges
            .entry(task.clone())
            .or_default()
            .insert(depends_on.clone());
        self.reverse_edges.entry(depends_on).or_default().insert(task);
    }

    pub fn contains(&self, task: &TaskId) -> bool {
        self.index.contains_key(task)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_dependencies(&self, task: &TaskId) -> bool {
        self.edges.get(task).is_some_and(|deps| !deps.is_empty())
    }

    /// Dependencies of `task`, in insertion order.
    pub fn get_dependencies(&self, task: &TaskId) -> Vec<TaskId> {
        self.ordered(self.edges.get(task))
    }

    /// Tasks waiting for `task`, in insertion order.
    pub fn get_waiting_tasks(&self, task: &TaskId) -> Vec<TaskId> {
        self.ordered(self.reverse_edges.get(task))
    }

    fn ordered(&self, set: Option<&HashSet<TaskId>>) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
        out.sort_by_key(|t| self.index.get(t).copied().unwrap_or(usize::MAX));
        out
    }

    /// `task` plus everything it transitively depends on.
    pub fn closure(&self, roots: &[TaskId]) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<TaskId> = roots.to_vec();
        while let Some(task) = stack.pop() {
            if !seen.insert(task.clone()) {
                continue;
            }
            if let Some(deps) = self.edges.get(&task) {
                stack.extend(deps.iter().cloned());
            }
        }
        seen
    }

    /// First cycle found by a depth-first walk, as `a -> b -> ... -> a`.
    pub fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut color = vec![Color::White; self.nodes.len()];
        let mut path = Vec::new();
        for start in 0..self.nodes.len() {
            if color[start] == Color::White {
                if let Some(cycle) = self.dfs_cycle(start, &mut color, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: usize,
        color: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<TaskId>> {
        color[node] = Color::Gray;
        path.push(node);
        for dep in self.get_dependencies(&self.nodes[node]) {
            let Some(&next) = self.index.get(&dep) else {
                continue;
            };
            match color[next] {
                Color::Gray => {
                    let from = path.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle: Vec<TaskId> =
                        path[from..].iter().map(|n| self.nodes[*n].clone()).collect();
                    cycle.push(self.nodes[next].clone());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_cycle(next, color, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
        color[node] = Color::Black;
        path.pop();
        None
    }

    /// Kahn's algorithm. Among tasks that are ready at the same time the one
    /// inserted first goes first. Returns the cycle on failure.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, Vec<TaskId>> {
        let mut in_degree: Vec<usize> = self
            .nodes
            .iter()
            .map(|t| self.edges.get(t).map_or(0, HashSet::len))
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            let task = &self.nodes[next];
            order.push(task.clone());
            for waiting in self.get_waiting_tasks(task) {
                let Some(&w) = self.index.get(&waiting) else {
                    continue;
                };
                in_degree[w] -= 1;
                if in_degree[w] == 0 {
                    ready.insert(w);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(self.detect_cycle().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> TaskId {
        TaskId::from(name)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(!graph.has_dependencies(&t("a")));
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("b"), t("a")); // B depends on A

        assert!(graph.has_dependencies(&t("b")));
        assert!(!graph.has_dependencies(&t("a")));
        assert_eq!(graph.get_dependencies(&t("b")), vec![t("a")]);
        assert_eq!(graph.get_waiting_tasks(&t("a")), vec![t("b")]);
    }

    #[test]
    fn add_task_reports_duplicates() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_task(t("a")));
        assert!(!graph.add_task(t("a")));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn detect_simple_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("a"), t("b"));
        graph.add_dependency(t("b"), t("a"));

        assert_eq!(graph.detect_cycle(), Some(vec![t("a"), t("b"), t("a")]));
    }

    #[test]
    fn detect_self_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("a"), t("a"));

        assert_eq!(graph.detect_cycle(), Some(vec![t("a"), t("a")]));
    }

    #[test]
    fn detect_longer_cycle() {
        let mut graph = DependencyGraph::new();
        // B -> C -> D -> B, with A feeding in
        graph.add_dependency(t("b"), t("a"));
        graph.add_dependency(t("c"), t("b"));
        graph.add_dependency(t("d"), t("c"));
        graph.add_dependency(t("b"), t("d"));

        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(!cycle.contains(&t("a")));
    }

    #[test]
    fn dag_with_diamond_should_not_detect_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("b"), t("a"));
        graph.add_dependency(t("c"), t("b"));
        graph.add_dependency(t("c"), t("a"));

        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn complex_dag_with_cross_edges() {
        let mut graph = DependencyGraph::new();
        //     A
        //    / \
        //   B   C
        //   |\ /|
        //   | X |
        //   |/ \|
        //   D   E
        graph.add_dependency(t("b"), t("a"));
        graph.add_dependency(t("c"), t("a"));
        graph.add_dependency(t("d"), t("b"));
        graph.add_dependency(t("e"), t("b"));
        graph.add_dependency(t("d"), t("c"));
        graph.add_dependency(t("e"), t("c"));

        assert!(graph.detect_cycle().is_none());
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![t("a"), t("b"), t("c"), t("d"), t("e")]
        );
    }

    #[test]
    fn topological_order_prefers_insertion_order_among_ready_tasks() {
        let mut graph = DependencyGraph::new();
        graph.add_task(t("z"));
        graph.add_task(t("late"));
        graph.add_task(t("a"));
        graph.add_dependency(t("late"), t("a"));

        assert_eq!(
            graph.topological_order().unwrap(),
            vec![t("z"), t("a"), t("late")]
        );
    }

    #[test]
    fn topological_order_reports_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("a"), t("b"));
        graph.add_dependency(t("b"), t("a"));

        assert_eq!(graph.topological_order().unwrap_err().len(), 3);
    }

    #[test]
    fn closure_follows_transitive_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(t("c"), t("b"));
        graph.add_dependency(t("b"), t("a"));
        graph.add_task(t("x"));

        let closure = graph.closure(&[t("c")]);
        assert_eq!(closure.len(), 3);
        assert!(!closure.contains(&t("x")));
    }
}
