//! Dependency graph between components, built from `ComponentRef` arguments.

use std::collections::{BTreeMap, BTreeSet};

use crate::{ArgSpec, DescriptorRegistry, OrchestratorError};

/// A node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) args: Vec<ArgSpec>,
    pub(crate) dependencies: BTreeSet<String>,
}

/// Acyclic graph of components. An edge `A -> B` means A references B.
///
/// Nodes are kept in name order so that building and traversal are
/// deterministic for a given descriptor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Build the graph, validating references and acyclicity.
    pub fn build(registry: &DescriptorRegistry) -> Result<Self, OrchestratorError> {
        let mut nodes = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = registry
            .iter()
            .map(|c| (c.name.clone(), BTreeSet::new()))
            .collect();

        for descriptor in registry.iter() {
            let mut dependencies = BTreeSet::new();
            for reference in descriptor.references() {
                let Some(targets) = dependents.get_mut(reference) else {
                    return Err(OrchestratorError::UnknownReference {
                        from: descriptor.name.clone(),
                        to: reference.to_string(),
                    });
                };
                targets.insert(descriptor.name.clone());
                dependencies.insert(reference.to_string());
            }

            nodes.insert(
                descriptor.name.clone(),
                Node {
                    args: descriptor.args.clone(),
                    dependencies,
                },
            );
        }

        let graph = Self { nodes, dependents };
        if let Some(cycle) = graph.find_cycle() {
            return Err(OrchestratorError::CycleDetected(cycle));
        }

        tracing::debug!(
            components = graph.len(),
            edges = graph.edge_count(),
            "Dependency graph built"
        );

        Ok(graph)
    }

    /// Find a cycle, if any, by depth-first search from each node in name order.
    ///
    /// The returned path lists each member once in dependency order, rotated
    /// to start at the lexicographically smallest member.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();

        for name in self.nodes.keys() {
            if marks.contains_key(name.as_str()) {
                continue;
            }
            if let Some(cycle) = self.visit(name, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(name, Mark::Visiting);
        stack.push(name);

        for dependency in self.dependencies(name) {
            match marks.get(dependency.as_str()) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == dependency)?;
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|n| n.to_string()).collect();
                    if let Some(smallest) = (0..cycle.len()).min_by_key(|&i| &cycle[i]) {
                        cycle.rotate_left(smallest);
                    }
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(dependency, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        marks.insert(name, Mark::Done);
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Component names in lexicographic order.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Components that `name` references directly.
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &String> {
        self.nodes.get(name).into_iter().flat_map(|n| n.dependencies.iter())
    }

    /// Components that reference `name` directly.
    pub fn dependents(&self, name: &str) -> impl Iterator<Item = &String> {
        self.dependents.get(name).into_iter().flatten()
    }

    /// Every component that depends on `name`, directly or transitively.
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut pending: Vec<&String> = self.dependents(name).collect();

        while let Some(next) = pending.pop() {
            if found.insert(next.clone()) {
                pending.extend(self.dependents(next));
            }
        }
        found
    }

    pub(crate) fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn from_edges_unchecked(edges: &[(&str, &[&str])]) -> Self {
        let mut nodes = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, deps) in edges {
            dependents.entry(name.to_string()).or_default();
            for dep in *deps {
                dependents
                    .entry(dep.to_string())
                    .or_default()
                    .insert(name.to_string());
            }
            nodes.insert(
                name.to_string(),
                Node {
                    args: deps.iter().map(|d| ArgSpec::component(*d)).collect(),
                    dependencies: deps.iter().map(|d| d.to_string()).collect(),
                },
            );
        }
        Self { nodes, dependents }
    }
}
