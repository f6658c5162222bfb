use std::collections::{HashMap, HashSet};

use crate::error::PlanError;

use super::task::{Task, TaskId};

/// Common task interface for dependency graph handling.
pub trait TaskLike {
    fn id(&self) -> TaskId;
    fn dependencies(&self) -> Vec<TaskId>;
}

impl TaskLike for Task {
    fn id(&self) -> TaskId {
        self.id
    }

    fn dependencies(&self) -> Vec<TaskId> {
        self.dependencies.iter().copied().collect()
    }
}

/// Task dependency graph (DAG) view over a plan
#[derive(Debug, Clone)]
pub struct PlanGraph {
    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<TaskId, Vec<TaskId>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<TaskId, Vec<TaskId>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<TaskId>,
}

impl PlanGraph {
    /// Construct the graph from a task list
    pub fn from_tasks<T: TaskLike>(tasks: &[T]) -> Result<Self, PlanError> {
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut insertion_order = Vec::with_capacity(tasks.len());

        for task in tasks {
            let task_id = task.id();
            if edges.contains_key(&task_id) {
                return Err(PlanError::DuplicateTaskId(task_id));
            }

            let dependencies = task.dependencies();
            for dep in &dependencies {
                reverse_edges.entry(*dep).or_default().push(task_id);
            }
            edges.insert(task_id, dependencies);
            insertion_order.push(task_id);
        }

        Ok(Self {
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), PlanError> {
        for task_id in &self.insertion_order {
            for dep in &self.edges[task_id] {
                if dep == task_id {
                    return Err(PlanError::SelfDependency(*task_id));
                }
                if !self.edges.contains_key(dep) {
                    return Err(PlanError::DependencyNotFound {
                        task_id: *task_id,
                        missing_dep: *dep,
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(PlanError::CircularDependency(cycle));
        }

        Ok(())
    }

    /// Tasks that (transitively) depend on `task_id`, in breadth-first order.
    pub fn dependents_of(&self, task_id: TaskId) -> Vec<TaskId> {
        let mut seen = HashSet::new();
        let mut queue = std::collections::VecDeque::from([task_id]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.reverse_edges.get(&current) {
                for child in children {
                    if seen.insert(*child) {
                        out.push(*child);
                        queue.push_back(*child);
                    }
                }
            }
        }

        out
    }

    /// Topological layering using Kahn's algorithm
    ///
    /// Tasks in the same layer have no dependency on each other. Layers are
    /// ordered by plan insertion order.
    pub fn topological_layers(&self) -> Result<Vec<Vec<TaskId>>, PlanError> {
        let mut in_degree: HashMap<TaskId, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (*id, deps.len()))
            .collect();

        let position: HashMap<TaskId, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();

        let mut current: Vec<TaskId> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id) == Some(&0))
            .copied()
            .collect();

        let mut layers = Vec::new();
        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();
            let mut next = Vec::new();

            for task_id in &current {
                if let Some(dependents) = self.reverse_edges.get(task_id) {
                    for dependent in dependents {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                            if *degree == 0 {
                                next.push(*dependent);
                            }
                        }
                    }
                }
            }

            next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            layers.push(std::mem::replace(&mut current, next));
        }

        if processed != self.edges.len() {
            return Err(PlanError::CircularDependency(
                "unable to complete topological sort".to_string(),
            ));
        }

        Ok(layers)
    }

    /// Detect circular dependencies using DFS
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(*task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: TaskId,
        visited: &mut HashSet<TaskId>,
        stack: &mut Vec<TaskId>,
    ) -> bool {
        visited.insert(node);
        stack.push(node);

        if let Some(dependencies) = self.edges.get(&node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(*dep);
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(*dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[TaskId]) -> String {
    stack
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
