//! Image dependency graph.
//!
//! Edges point from an image to the images it depends on. The graph yields the
//! transitive closure of a set of images and splits a set into build levels:
//! every image in a level only depends on images from earlier levels.

use anyhow::Result;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::ValuesError;
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph over the images declared in a manifest.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from a manifest, failing on dependency cycles.
    ///
    /// Nodes are added in declaration order, so node indices double as the
    /// declaration rank used to order results deterministically. Dependencies on
    /// undeclared images are ignored here; manifest validation reports them.
    pub fn build(manifest: &Manifest) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        for image in &manifest.images {
            let index = graph.add_node(image.name.clone());
            node_map.insert(image.name.clone(), index);
        }

        for image in &manifest.images {
            let from = node_map[&image.name];
            for dep in &image.dependencies {
                if let Some(&to) = node_map.get(dep)
                    && !graph.contains_edge(from, to)
                {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let graph = Self {
            graph,
            node_map,
        };
        graph.detect_cycles()?;
        Ok(graph)
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut path = Vec::new();

        for node in self.graph.node_indices() {
            if colors.get(&node) == Some(&Color::White)
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Err(ValuesError::ManifestValidationError {
                    reason: format!("dependency cycle detected: {}", cycle.join(" → ")),
                }
                .into());
            }
        }
        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| self.graph[*n].clone()).collect();
                    cycle.push(self.graph[neighbor].clone());
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Direct dependencies of `name`, in declaration order.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let Some(&index) = self.node_map.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<NodeIndex> = self.graph.neighbors(index).collect();
        deps.sort();
        deps.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// `names` plus everything they depend on, dependencies first.
    #[must_use]
    pub fn closure<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeIndex> =
            names.iter().filter_map(|n| self.node_map.get(n.as_ref()).copied()).collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                queue.extend(self.graph.neighbors(current));
            }
        }

        self.dependency_order()
            .into_iter()
            .filter(|n| seen.contains(n))
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Split `names` into build levels.
    ///
    /// Dependencies outside `names` count as already satisfied. Within a level
    /// images keep declaration order.
    #[must_use]
    pub fn levels<S: AsRef<str>>(&self, names: &[S]) -> Vec<Vec<String>> {
        let subset: HashSet<NodeIndex> =
            names.iter().filter_map(|n| self.node_map.get(n.as_ref()).copied()).collect();

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        for node in self.dependency_order() {
            if !subset.contains(&node) {
                continue;
            }
            let level = self
                .graph
                .neighbors(node)
                .filter_map(|dep| depth.get(&dep).map(|d| d + 1))
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
        }

        let count = depth.values().max().map_or(0, |max| max + 1);
        let mut levels: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
        for (node, level) in depth {
            levels[level].push(node);
        }
        levels
            .into_iter()
            .map(|mut level| {
                level.sort();
                level.into_iter().map(|n| self.graph[n].clone()).collect()
            })
            .collect()
    }

    /// All nodes with dependencies before dependents.
    fn dependency_order(&self) -> Vec<NodeIndex> {
        // Cycles are rejected in `build`, so the sort cannot fail.
        toposort(&self.graph, None)
            .map(|order| order.into_iter().rev().collect())
            .unwrap_or_default()
    }
}
