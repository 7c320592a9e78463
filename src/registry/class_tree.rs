//! Class Tree - explicit script-visible inheritance.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: class name and hash
//! - Edges: `Inherits` from parent to child
//!
//! The tree is independent of any Rust type relationships; it is the only
//! source of truth for "is-a" checks and member lookup order.

use objbridge_core::ClassHash;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use rustc_hash::FxHashMap;

/// Edge from a parent class to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inherits;

/// Data stored in each class node.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: String,
    pub hash: ClassHash,
}

/// The class inheritance forest.
#[derive(Debug, Default)]
pub struct ClassTree {
    graph: DiGraph<ClassNode, Inherits>,
    by_hash: FxHashMap<ClassHash, NodeIndex>,
}

impl ClassTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class under an optional, already-present parent.
    ///
    /// Returns `None` if the class is already present or the parent is not.
    pub fn insert(&mut self, name: &str, parent: Option<&str>) -> Option<NodeIndex> {
        let hash = ClassHash::from_name(name);
        if self.by_hash.contains_key(&hash) {
            return None;
        }
        let parent_node = match parent {
            Some(p) => Some(self.node(p)?),
            None => None,
        };

        let node = self.graph.add_node(ClassNode {
            name: name.to_string(),
            hash,
        });
        if let Some(parent_node) = parent_node {
            self.graph.add_edge(parent_node, node, Inherits);
        }
        self.by_hash.insert(hash, node);
        Some(node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn node(&self, name: &str) -> Option<NodeIndex> {
        self.by_hash.get(&ClassHash::from_name(name)).copied()
    }

    fn parent_node(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .next()
            .map(|edge| edge.source())
    }

    /// Parent class name.
    pub fn parent(&self, name: &str) -> Option<&str> {
        let node = self.node(name)?;
        let parent = self.parent_node(node)?;
        Some(self.graph[parent].name.as_str())
    }

    /// The class itself followed by its ancestors, most-derived first.
    pub fn lineage(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.node(name);
        while let Some(node) = current {
            chain.push(self.graph[node].name.as_str());
            current = self.parent_node(node);
        }
        chain
    }

    /// Ancestors of a class, nearest first.
    pub fn ancestors(&self, name: &str) -> Vec<&str> {
        let mut chain = self.lineage(name);
        if !chain.is_empty() {
            chain.remove(0);
        }
        chain
    }

    /// All descendants of a class, breadth-first.
    pub fn descendants(&self, name: &str) -> Vec<&str> {
        let Some(start) = self.node(name) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                out.push(self.graph[node].name.as_str());
            }
        }
        out
    }

    /// Check if `class` is `ancestor` or descends from it.
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let Some(target) = self.node(ancestor) else {
            return false;
        };
        let mut current = self.node(class);
        while let Some(node) = current {
            if node == target {
                return true;
            }
            current = self.parent_node(node);
        }
        false
    }
}
