//! Deployment planning: a deterministic topological order of the graph.

use std::collections::{BTreeMap, BTreeSet};

use comfy_table::{Table, presets::UTF8_FULL};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ArgSpec, DependencyGraph, OrchestratorError};

/// A single step of a deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Component to deploy.
    pub name: String,
    /// Constructor arguments, resolved at execution time.
    pub args: Vec<ArgSpec>,
    /// Direct dependencies, all placed earlier in the plan.
    pub dependencies: Vec<String>,
}

/// Ordered list of components such that every dependency precedes its dependents.
///
/// Among components whose dependencies are all placed, the lexicographically
/// smallest name goes first, so the same graph always yields the same plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Deref)]
pub struct DeploymentPlan {
    #[deref]
    steps: Vec<PlanStep>,
    /// Steps picked by name among several ready components.
    #[serde(default)]
    tie_breaks: usize,
}

impl DeploymentPlan {
    /// Topologically sort the graph.
    pub fn from_graph(graph: &DependencyGraph) -> Result<Self, OrchestratorError> {
        let mut remaining: BTreeMap<&str, usize> = graph
            .components()
            .map(|name| (name, graph.dependencies(name).count()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, pending)| **pending == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut steps = Vec::with_capacity(graph.len());
        let mut tie_breaks = 0;

        loop {
            if ready.len() > 1 {
                tie_breaks += 1;
                tracing::debug!(
                    step = steps.len(),
                    ready = ?ready,
                    "Several components ready, picking the smallest name"
                );
            }
            let Some(name) = ready.pop_first() else {
                break;
            };
            remaining.remove(name);

            for dependent in graph.dependents(name) {
                if let Some(pending) = remaining.get_mut(dependent.as_str()) {
                    *pending -= 1;
                    if *pending == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }

            let Some(node) = graph.node(name) else {
                continue;
            };
            steps.push(PlanStep {
                name: name.to_string(),
                args: node.args.clone(),
                dependencies: node.dependencies.iter().cloned().collect(),
            });
        }

        if !remaining.is_empty() {
            let cycle = graph
                .find_cycle()
                .unwrap_or_else(|| remaining.keys().map(|n| n.to_string()).collect());
            return Err(OrchestratorError::CycleDetected(cycle));
        }

        let plan = Self { steps, tie_breaks };
        tracing::debug!(
            order = ?plan.names().collect::<Vec<_>>(),
            tie_breaks,
            "Deployment plan computed"
        );
        Ok(plan)
    }

    /// Component names in deployment order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// Number of steps where more than one component was ready and the
    /// smallest name was picked.
    pub fn tie_breaks(&self) -> usize {
        self.tie_breaks
    }

    /// Whether the graph admits exactly one deployment order.
    pub fn is_unique_order(&self) -> bool {
        self.tie_breaks == 0
    }

    /// Index of `name` in the plan.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Hex-encoded SHA-256 of the serialized plan.
    ///
    /// Two plans share a fingerprint exactly when they deploy the same
    /// components, in the same order, with the same argument schemas.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(&self.steps)
            .expect("plan steps only hold strings and plain values");

        let mut hasher = Sha256::new();
        hasher.update(&json);
        hex::encode(hasher.finalize())
    }

    /// Render the plan as a table for terminal output.
    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["#", "Component", "Constructor arguments"]);

        for (index, step) in self.steps.iter().enumerate() {
            let args: Vec<String> = step.args.iter().map(ToString::to_string).collect();
            table.add_row(vec![
                (index + 1).to_string(),
                step.name.clone(),
                args.join(", "),
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentDescriptor, DescriptorRegistry};

    fn plan_of(entries: &[(&str, &[&str])]) -> DeploymentPlan {
        let registry = DescriptorRegistry::from_descriptors(entries.iter().map(|(name, deps)| {
            ComponentDescriptor::new(*name, deps.iter().map(|d| ArgSpec::component(*d)).collect())
        }))
        .expect("unique names");
        let graph = DependencyGraph::build(&registry).expect("acyclic");
        DeploymentPlan::from_graph(&graph).expect("plannable")
    }

    #[test]
    fn test_dependencies_come_first() {
        let plan = plan_of(&[
            ("Claims", &["Roles", "Policies"]),
            ("Policies", &["Roles"]),
            ("Roles", &[]),
        ]);
        assert_eq!(plan.names().collect::<Vec<_>>(), ["Roles", "Policies", "Claims"]);
        assert!(plan.is_unique_order());
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let plan = plan_of(&[
            ("Zeta", &[]),
            ("Alpha", &[]),
            ("Mid", &["Zeta"]),
            ("Beta", &["Zeta"]),
        ]);
        // Beta becomes ready only after Zeta, but still precedes Mid.
        assert_eq!(
            plan.names().collect::<Vec<_>>(),
            ["Alpha", "Zeta", "Beta", "Mid"]
        );
        // {Alpha, Zeta} and then {Beta, Mid} were both ambiguous.
        assert_eq!(plan.tie_breaks(), 2);
        assert!(!plan.is_unique_order());
    }

    #[test]
    fn test_every_edge_is_respected() {
        let entries: &[(&str, &[&str])] = &[
            ("E", &["D", "B"]),
            ("D", &["C"]),
            ("C", &["A"]),
            ("B", &["A"]),
            ("A", &[]),
            ("F", &["E", "A"]),
        ];
        let plan = plan_of(entries);
        for (name, deps) in entries {
            let dependent = plan.position(name).expect("planned");
            for dep in *deps {
                let dependency = plan.position(dep).expect("planned");
                assert!(dependency < dependent, "{dep} must precede {name}");
            }
        }
    }

    #[test]
    fn test_plan_and_fingerprint_are_deterministic() {
        let entries: &[(&str, &[&str])] = &[("B", &[]), ("A", &["B"]), ("C", &[])];
        let first = plan_of(entries);
        let second = plan_of(entries);
        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);

        let other = plan_of(&[("B", &[]), ("A", &[]), ("C", &[])]);
        assert_ne!(first.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_cyclic_graph_is_rejected() {
        let graph = DependencyGraph::from_edges_unchecked(&[("A", &["B"]), ("B", &["A"]), ("C", &[])]);
        let err = DeploymentPlan::from_graph(&graph).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::CycleDetected(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_empty_graph_yields_empty_plan() {
        let plan = plan_of(&[]);
        assert!(plan.is_empty());
    }
}
