//! DAG orchestration over the supervisor's task engine (§4.9).
//!
//! Grounded on `agents/orchestrator/graph_engine.py`'s `GraphEngine` for
//! the wave/dependency semantics, and on `workflow/src/lib.rs`'s
//! `WorkflowEngine` for this crate's Rust shape — a plain struct over a
//! node table instead of the source's dict-of-dicts, `std::thread::scope`
//! standing in for the source's `asyncio.gather` per wave since this
//! workspace has no async runtime (§REDESIGN FLAGS).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_supervisor::{SupervisorWorld, TaskResult, run_task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// One node of the DAG: an `(agent, task)` pair with its dependencies.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub id: String,
    pub agent: String,
    pub task: String,
    pub args: Value,
    pub depends_on: Vec<String>,
    pub status: NodeStatus,
    pub result: Option<TaskResult>,
}

impl DagNode {
    fn new(id: String, agent: String, task: String, args: Value, depends_on: Vec<String>) -> Self {
        DagNode {
            id,
            agent,
            task,
            args,
            depends_on,
            status: NodeStatus::Pending,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingDependency { node: String, dependency: String },
    Cycle(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("dag failed validation: {0:?}")]
    Invalid(Vec<ValidationIssue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
}

/// The outcome of one `execute()` run (§4.9's "Execution").
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status: RunStatus,
    /// Node ids in the order their wave completed.
    pub executed: Vec<String>,
    /// Node ids that never became ready (dependencies unmet or the DAG
    /// stalled).
    pub pending: Vec<String>,
    pub nodes: HashMap<String, DagNode>,
}

/// A DAG of `(agent, task)` nodes executed wave by wave against a shared
/// [`SupervisorWorld`].
pub struct Orchestrator {
    nodes: HashMap<String, DagNode>,
    insertion_order: Vec<String>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Orchestrator {
            nodes: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    /// Register a node. `depends_on` names other node ids that must reach
    /// `success` before this node becomes eligible to run.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        agent: impl Into<String>,
        task: impl Into<String>,
        depends_on: Vec<String>,
    ) -> Result<(), OrchestratorError> {
        self.add_node_with_args(id, agent, task, Value::Null, depends_on)
    }

    pub fn add_node_with_args(
        &mut self,
        id: impl Into<String>,
        agent: impl Into<String>,
        task: impl Into<String>,
        args: Value,
        depends_on: Vec<String>,
    ) -> Result<(), OrchestratorError> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(OrchestratorError::DuplicateNode(id));
        }
        self.insertion_order.push(id.clone());
        self.nodes
            .insert(id.clone(), DagNode::new(id, agent.into(), task.into(), args, depends_on));
        Ok(())
    }

    /// Check for missing dependency ids and cycles (§4.9's "Validation").
    /// Cycle detection is depth-first with an in-progress set, per spec.
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();

        for node in self.nodes.values() {
            for dep in &node.depends_on {
                if !self.nodes.contains_key(dep) {
                    issues.push(ValidationIssue::MissingDependency {
                        node: node.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut in_progress: Vec<String> = Vec::new();
        for start in &self.insertion_order {
            if visited.contains(start) {
                continue;
            }
            if let Some(cycle) = self.dfs_find_cycle(start, &mut visited, &mut in_progress) {
                issues.push(ValidationIssue::Cycle(cycle));
            }
        }

        ValidationReport {
            valid: issues.is_empty(),
            issues,
        }
    }

    fn dfs_find_cycle(
        &self,
        id: &str,
        visited: &mut HashSet<String>,
        in_progress: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = in_progress.iter().position(|n| n == id) {
            return Some(in_progress[pos..].to_vec());
        }
        if visited.contains(id) {
            return None;
        }
        let Some(node) = self.nodes.get(id) else {
            return None;
        };

        in_progress.push(id.to_string());
        for dep in &node.depends_on {
            if let Some(cycle) = self.dfs_find_cycle(dep, visited, in_progress) {
                return Some(cycle);
            }
        }
        in_progress.pop();
        visited.insert(id.to_string());
        None
    }

    /// Run the DAG wave by wave against `world` (§4.9's "Execution",
    /// §5's "the DAG orchestrator runs each wave's nodes in parallel").
    ///
    /// Each wave is the set of `Pending` nodes whose dependencies are all
    /// `Success`. Nodes in a wave run concurrently via `std::thread::scope`.
    /// If a wave produces no newly-ready node while nodes remain pending,
    /// the run stops with [`RunStatus::Partial`].
    pub fn execute(mut self, world: &SupervisorWorld) -> Result<ExecutionReport, OrchestratorError> {
        let report = self.validate();
        if !report.valid {
            return Err(OrchestratorError::Invalid(report.issues));
        }

        let mut executed = Vec::new();

        loop {
            let ready: Vec<String> = self
                .nodes
                .values()
                .filter(|n| n.status == NodeStatus::Pending)
                .filter(|n| {
                    n.depends_on
                        .iter()
                        .all(|dep| self.nodes.get(dep).map(|d| d.status == NodeStatus::Success).unwrap_or(false))
                })
                .map(|n| n.id.clone())
                .collect();

            if ready.is_empty() {
                break;
            }

            for id in &ready {
                self.nodes.get_mut(id).unwrap().status = NodeStatus::Running;
            }

            let results: Vec<(String, TaskResult)> = std::thread::scope(|scope| {
                let handles: Vec<_> = ready
                    .iter()
                    .map(|id| {
                        let node = &self.nodes[id];
                        let agent = node.agent.clone();
                        let task = node.task.clone();
                        let args = node.args.clone();
                        let id = id.clone();
                        scope.spawn(move || {
                            tracing::info!(node = %id, agent = %agent, "executing dag node");
                            (id, run_task(world, &agent, &task, args))
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().expect("dag node thread panicked")).collect()
            });

            for (id, result) in results {
                let success = result.is_success();
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.status = if success { NodeStatus::Success } else { NodeStatus::Failed };
                    node.result = Some(result);
                }
                executed.push(id);
            }
        }

        // Nodes that never became ready stay `Pending` rather than being
        // marked skipped: a dependency cannot be satisfied after the fact,
        // but the node itself was never attempted (§4.9's "Execution").
        let pending: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| self.nodes.get(*id).map(|n| n.status == NodeStatus::Pending).unwrap_or(false))
            .cloned()
            .collect();

        let status = if pending.is_empty() { RunStatus::Success } else { RunStatus::Partial };

        Ok(ExecutionReport {
            status,
            executed,
            pending,
            nodes: self.nodes,
        })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_supervisor::WardenConfig;

    fn bootstrap_world(dir: &std::path::Path) -> SupervisorWorld {
        let config = WardenConfig::at_root(dir);
        config.ensure_dirs().unwrap();
        std::fs::write(
            config.models_dir.join("a.yml"),
            "name: a\ncapabilities:\n  - filesystem.read\nskills:\n  - fs\n",
        )
        .unwrap();
        let skill_dir = config.skills_dir.join("fs");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("skill.yml"),
            "name: fs\nprovides:\n  - read_file\nrequires_capabilities:\n  - filesystem.read\n",
        )
        .unwrap();
        std::fs::write(skill_dir.join("skill.rs"), "// marker").unwrap();
        std::fs::create_dir_all(config.sandboxes_dir.join("a").join("work")).unwrap();
        std::fs::write(config.sandboxes_dir.join("a").join("work").join("hello.txt"), "hi").unwrap();
        SupervisorWorld::bootstrap(config).unwrap()
    }

    #[test]
    fn validate_detects_missing_dependency() {
        let mut dag = Orchestrator::new();
        dag.add_node("a", "scout", "fs.read_file", vec!["ghost".to_string()]).unwrap();
        let report = dag.validate();
        assert!(!report.valid);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::MissingDependency { .. })));
    }

    #[test]
    fn validate_detects_cycle() {
        let mut dag = Orchestrator::new();
        dag.add_node("a", "scout", "fs.read_file", vec!["b".to_string()]).unwrap();
        dag.add_node("b", "scout", "fs.read_file", vec!["a".to_string()]).unwrap();
        let report = dag.validate();
        assert!(!report.valid);
        assert!(report.issues.iter().any(|issue| matches!(issue, ValidationIssue::Cycle(_))));
    }

    #[test]
    fn execute_runs_chain_and_reports_partial_failure_at_c() {
        let dir = tempfile::tempdir().unwrap();
        let world = bootstrap_world(dir.path());

        let mut dag = Orchestrator::new();
        dag.add_node_with_args("a", "a", "fs.read_file", serde_json::json!({ "path": "hello.txt" }), vec![])
            .unwrap();
        dag.add_node_with_args(
            "b",
            "a",
            "fs.read_file",
            serde_json::json!({ "path": "hello.txt" }),
            vec!["a".to_string()],
        )
        .unwrap();
        dag.add_node_with_args(
            "c",
            "a",
            "fs.read_file",
            serde_json::json!({ "path": "does_not_exist.txt" }),
            vec!["b".to_string()],
        )
        .unwrap();

        let report = dag.execute(&world).unwrap();
        assert_eq!(report.executed, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(report.pending.is_empty());
        assert_eq!(report.nodes["c"].status, NodeStatus::Failed);
        assert_eq!(report.nodes["a"].status, NodeStatus::Success);
        assert_eq!(report.nodes["b"].status, NodeStatus::Success);
    }

    #[test]
    fn execute_marks_unreachable_nodes_partial_when_dependency_fails() {
        let dir = tempfile::tempdir().unwrap();
        let world = bootstrap_world(dir.path());

        let mut dag = Orchestrator::new();
        dag.add_node_with_args(
            "a",
            "a",
            "fs.read_file",
            serde_json::json!({ "path": "does_not_exist.txt" }),
            vec![],
        )
        .unwrap();
        dag.add_node_with_args(
            "b",
            "a",
            "fs.read_file",
            serde_json::json!({ "path": "hello.txt" }),
            vec!["a".to_string()],
        )
        .unwrap();

        let report = dag.execute(&world).unwrap();
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.executed, vec!["a".to_string()]);
        assert_eq!(report.pending, vec!["b".to_string()]);
        assert_eq!(report.nodes["b"].status, NodeStatus::Pending);
    }
}
