//! Reference-counted graph of open bundles.
//!
//! Nodes live in a map keyed by name and refer to their dependencies by
//! name, so the graph never holds reference cycles. A node's count is the
//! number of cache entries served from it plus the number of open
//! dependents that need it.

use std::collections::HashMap;
use std::rc::Rc;

use super::bundle::BundleArchive;
use crate::error::LoadError;

#[derive(Debug)]
pub struct BundleNode {
    name: String,
    archive: Option<Rc<BundleArchive>>,
    dependencies: Vec<String>,
    ref_count: u32,
    permanent: bool,
}

impl BundleNode {
    pub fn new(name: impl Into<String>, archive: BundleArchive, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            archive: Some(Rc::new(archive)),
            dependencies,
            ref_count: 0,
            permanent: false,
        }
    }

    /// A node that is never released or unloaded.
    pub fn permanent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archive: None,
            dependencies: Vec::new(),
            ref_count: 0,
            permanent: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archive(&self) -> Option<&Rc<BundleArchive>> {
        self.archive.as_ref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Current count. Permanent nodes report `u32::MAX`.
    pub fn ref_count(&self) -> u32 {
        if self.permanent { u32::MAX } else { self.ref_count }
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, BundleNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an open node. Returns `false` and keeps the existing node if
    /// the name is already open.
    pub fn insert(&mut self, node: BundleNode) -> bool {
        if self.nodes.contains_key(&node.name) {
            return false;
        }
        self.nodes.insert(node.name.clone(), node);
        true
    }

    pub fn insert_permanent(&mut self, name: impl Into<String>) -> bool {
        self.insert(BundleNode::permanent(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&BundleNode> {
        self.nodes.get(name)
    }

    pub fn ref_count(&self, name: &str) -> Option<u32> {
        self.nodes.get(name).map(BundleNode::ref_count)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Increments `name` and, when it goes from 0 to 1, its dependencies.
    ///
    /// An open dependent holds exactly one reference on each direct
    /// dependency, however often the dependent itself is retained. That
    /// reference is returned when the dependent is removed, so retains and
    /// releases of `name` always balance. After two retains of `a` in
    /// `a -> b`, `a` counts 2 and `b` counts 1.
    ///
    /// Fails without touching any count if `name` or any node it needs is
    /// not open.
    pub fn retain(&mut self, name: &str) -> Result<(), LoadError> {
        self.check_closure(name)?;
        self.retain_node(name);
        Ok(())
    }

    /// Decrements `name`; a node reaching zero is removed and its
    /// dependencies are released in turn.
    ///
    /// Returns the removed names, dependents before their dependencies.
    pub fn release(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.release_node(name, &mut removed);
        removed
    }

    /// Removes non-permanent nodes that were opened but never retained.
    pub fn prune_unreferenced(&mut self) -> Vec<String> {
        let mut pruned: Vec<String> = self
            .nodes
            .values()
            .filter(|node| !node.permanent && node.ref_count == 0)
            .map(|node| node.name.clone())
            .collect();
        pruned.sort();
        for name in &pruned {
            self.nodes.remove(name);
        }
        pruned
    }

    /// Drops every non-permanent node regardless of its count.
    pub fn clear(&mut self) {
        self.nodes.retain(|_, node| node.permanent);
    }

    fn check_closure(&self, name: &str) -> Result<(), LoadError> {
        let mut stack = vec![name];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                return Err(LoadError::NotFound(format!("bundle {current:?} is not open")));
            };
            if node.ref_count > 0 {
                continue;
            }
            stack.extend(node.dependencies.iter().map(String::as_str));
        }
        Ok(())
    }

    fn retain_node(&mut self, name: &str) {
        let dependencies = match self.nodes.get_mut(name) {
            Some(node) if node.permanent => return,
            Some(node) => {
                node.ref_count += 1;
                if node.ref_count > 1 {
                    return;
                }
                node.dependencies.clone()
            }
            None => return,
        };
        for dep in &dependencies {
            self.retain_node(dep);
        }
    }

    fn release_node(&mut self, name: &str, removed: &mut Vec<String>) {
        let Some(node) = self.nodes.get_mut(name) else {
            log::warn!("Release of bundle {name:?} which is not open");
            return;
        };
        if node.permanent {
            return;
        }
        if node.ref_count == 0 {
            log::error!("Bundle {name:?} released more times than retained");
            return;
        }
        node.ref_count -= 1;
        if node.ref_count > 0 {
            return;
        }

        if let Some(node) = self.nodes.remove(name) {
            log::debug!("Unloaded bundle {name:?}");
            removed.push(node.name);
            for dep in &node.dependencies {
                self.release_node(dep, removed);
            }
        }
    }
}
