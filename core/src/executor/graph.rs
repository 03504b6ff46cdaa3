use std::collections::HashMap;

use crate::error::ExecutorError;
use crate::runner::TaskSpec;

/// Task dependency graph. Construction validates ids and dependency
/// references; `layer()` produces the execution plan.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, TaskSpec>,
    /// task id -> ids it depends on
    deps: HashMap<String, Vec<String>>,
    /// task id -> ids depending on it
    dependents: HashMap<String, Vec<String>>,
    /// Input order, for stable layering.
    order: Vec<String>,
}

impl TaskGraph {
    pub fn from_tasks(tasks: Vec<TaskSpec>) -> Result<Self, ExecutorError> {
        let mut nodes = HashMap::new();
        let mut deps = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut order = Vec::with_capacity(tasks.len());

        for task in tasks {
            if nodes.contains_key(&task.id) {
                return Err(ExecutorError::DuplicateTaskId(task.id));
            }
            order.push(task.id.clone());
            deps.insert(task.id.clone(), task.dependencies.clone());
            for dep in &task.dependencies {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
            nodes.insert(task.id.clone(), task);
        }

        // Unknown references fail at graph build, before anything runs.
        for (id, dep_list) in &deps {
            for dep in dep_list {
                if !nodes.contains_key(dep) {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        Ok(Self {
            nodes,
            deps,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.nodes.get(id)
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Task ids in input order; results are reported in this order.
    pub fn input_order(&self) -> &[String] {
        &self.order
    }

    /// Kahn's algorithm with layer snapshots: every task in layer *i* has all
    /// of its dependencies in layers 0..*i*. Layer membership follows input
    /// order for determinism. Unplaced tasks mean a cycle.
    pub fn layer(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.deps[id].len()))
            .collect();

        let mut current: Vec<String> = self
            .order
            .iter()
            .filter(|id| in_degree[id.as_str()] == 0)
            .cloned()
            .collect();

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut placed = 0usize;

        while !current.is_empty() {
            placed += current.len();

            let mut next: Vec<String> = Vec::new();
            for id in &current {
                if let Some(successors) = self.dependents.get(id) {
                    for succ in successors {
                        let degree = in_degree.get_mut(succ.as_str()).unwrap();
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(succ.clone());
                        }
                    }
                }
            }

            next.sort_by_key(|id| self.order.iter().position(|k| k == id).unwrap_or(usize::MAX));

            layers.push(std::mem::replace(&mut current, next));
        }

        if placed != self.nodes.len() {
            let unplaced: Vec<&str> = self
                .order
                .iter()
                .filter(|id| in_degree[id.as_str()] > 0)
                .map(String::as_str)
                .collect();
            return Err(ExecutorError::CircularDependency(unplaced.join(" -> ")));
        }

        Ok(layers)
    }
}
