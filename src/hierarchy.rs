//! The hierarchy tree built over a sheet's columns.
//!
//! Nodes live in an arena keyed by [`NodeId`]; `children` lists are the only
//! ownership edges. The child → parent index is derived state, rebuilt after
//! every deserialization and never written out.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{DeleteImpact, HierarchyError};
use crate::replication::{self, ReplicationReport};
use crate::resolver::{RowContext, RowScope, unique_column_values_in};
use crate::sheet::RawSheet;
use crate::template::{self, ClassifyReport};

/// Level of the sentinel root when no course wrapper is present.
pub const ROOT_LEVEL: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        NodeId(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The sheet column a node is bound to.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Binding {
    pub column_index: usize,
    pub column_name: String,
}

/// What a node represents, grouped across the whole tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeType {
    pub column_name: String,
    pub column_index: usize,
}

impl From<&Binding> for NodeType {
    fn from(b: &Binding) -> Self {
        NodeType {
            column_name: b.column_name.clone(),
            column_index: b.column_index,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The "Start Building" stub shown before any column is assigned.
    Placeholder,
    /// Structural container with no column.
    Container,
    /// Bound to a column, sole member of its type.
    Bound(Binding),
    /// Canonical structure for every node of its type.
    Template(Binding),
    /// Read-only peer whose structure follows `template_id`.
    Duplicate {
        binding: Binding,
        template_id: NodeId,
    },
}

impl NodeKind {
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            NodeKind::Bound(b) | NodeKind::Template(b) => Some(b),
            NodeKind::Duplicate { binding, .. } => Some(binding),
            NodeKind::Placeholder | NodeKind::Container => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Horizontal,
    #[default]
    Vertical,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub value: String,
    pub level: i32,
    pub layout: LayoutMode,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

impl HierarchyNode {
    pub fn binding(&self) -> Option<&Binding> {
        self.kind.binding()
    }

    pub fn column_index(&self) -> Option<usize> {
        self.binding().map(|b| b.column_index)
    }

    pub fn column_name(&self) -> Option<&str> {
        self.binding().map(|b| b.column_name.as_str())
    }

    pub fn node_type(&self) -> Option<NodeType> {
        self.binding().map(NodeType::from)
    }

    pub fn is_template(&self) -> bool {
        matches!(self.kind, NodeKind::Template(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, NodeKind::Duplicate { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, NodeKind::Placeholder)
    }

    pub fn template_id(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Duplicate { template_id, .. } => Some(template_id),
            _ => None,
        }
    }
}

/// Where extra values go when a column resolves to several values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// The node takes the first value; the rest become siblings after it.
    #[default]
    Siblings,
    /// The node stays put and receives one child per value.
    Children,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssignOptions {
    pub fan_out: FanOut,
    pub scope: RowScope,
}

/// Result of binding a column to a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AssignOutcome {
    pub node: Option<NodeId>,
    pub values: Vec<String>,
    /// Nodes materialized for the second and later values.
    pub created: Vec<NodeId>,
    pub classification: ClassifyReport,
    pub replication: Vec<ReplicationReport>,
}

/// Nested, serializable view of a subtree for the browser.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: u64,
    pub value: String,
    pub column_name: Option<String>,
    pub column_index: Option<usize>,
    pub level: i32,
    pub layout_mode: LayoutMode,
    pub is_template: bool,
    pub is_duplicate: bool,
    pub template_id: Option<u64>,
    pub is_placeholder: bool,
    pub children: Vec<NodeView>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
struct TreeSnapshot {
    root: NodeId,
    next_id: u64,
    nodes: Vec<HierarchyNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TreeSnapshot", into = "TreeSnapshot")]
pub struct HierarchyTree {
    nodes: BTreeMap<NodeId, HierarchyNode>,
    root: NodeId,
    next_id: u64,
    parents: HashMap<NodeId, NodeId>,
}

impl From<TreeSnapshot> for HierarchyTree {
    fn from(snapshot: TreeSnapshot) -> Self {
        let mut tree = HierarchyTree {
            nodes: snapshot.nodes.into_iter().map(|n| (n.id, n)).collect(),
            root: snapshot.root,
            next_id: snapshot.next_id,
            parents: HashMap::new(),
        };
        tree.rebuild_parents();
        tree
    }
}

impl From<HierarchyTree> for TreeSnapshot {
    fn from(tree: HierarchyTree) -> Self {
        TreeSnapshot {
            root: tree.root,
            next_id: tree.next_id,
            nodes: tree.nodes.into_values().collect(),
        }
    }
}

impl Default for HierarchyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyTree {
    /// A fresh tree: the sentinel root holding a single placeholder.
    pub fn new() -> Self {
        let mut tree = Self::empty();
        tree.push_placeholder();
        tree
    }

    /// Only the sentinel root.
    pub fn empty() -> Self {
        let root = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            HierarchyNode {
                id: root,
                value: String::new(),
                level: ROOT_LEVEL,
                layout: LayoutMode::default(),
                kind: NodeKind::Container,
                children: Vec::new(),
            },
        );
        HierarchyTree {
            nodes,
            root,
            next_id: 1,
            parents: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(&id)
    }

    pub fn get(&self, id: NodeId) -> Result<&HierarchyNode, HierarchyError> {
        self.nodes.get(&id).ok_or(HierarchyError::UnknownNode(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut HierarchyNode, HierarchyError> {
        self.nodes.get_mut(&id).ok_or(HierarchyError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Pre-order walk of the subtree rooted at `id`, `id` included.
    pub fn preorder_from(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(self.root)
    }

    /// Every node of `node_type`, in pre-order.
    pub fn nodes_of_type(&self, node_type: &NodeType) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|id| {
                self.nodes[id]
                    .node_type()
                    .is_some_and(|t| &t == node_type)
            })
            .collect()
    }

    /// First child of `parent` bound to `column_index`.
    pub fn child_bound_to(&self, parent: NodeId, column_index: usize) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes[c].column_index() == Some(column_index))
    }

    /// True when `id` names a node that currently is a template.
    pub fn is_live_template(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(HierarchyNode::is_template)
    }

    /// Duplicates are read-only while their template exists.
    pub fn is_read_only(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .and_then(HierarchyNode::template_id)
            .is_some_and(|t| self.is_live_template(t))
    }

    fn ensure_editable(&self, id: NodeId) -> Result<(), HierarchyError> {
        self.get(id)?;
        if self.is_read_only(id) {
            warn!("refusing to edit duplicate node {}", id);
            return Err(HierarchyError::DuplicateReadOnly(id));
        }
        Ok(())
    }

    /// Ancestor column assignments from the root down to, not including, `id`.
    /// Unbound and still-blank ancestors add no constraint.
    pub fn row_context(&self, id: NodeId) -> RowContext {
        let mut context = RowContext::new();
        for ancestor in self.ancestors(id).into_iter().rev() {
            let node = &self.nodes[&ancestor];
            if let Some(col) = node.column_index() {
                if !node.value.is_empty() {
                    context.push(col, node.value.clone());
                }
            }
        }
        context
    }

    fn push_placeholder(&mut self) {
        let root = self.root;
        // The root always exists.
        let _ = self.create_node(root, None, NodeKind::Placeholder, String::new());
    }

    pub(crate) fn create_node(
        &mut self,
        parent: NodeId,
        position: Option<usize>,
        kind: NodeKind,
        value: String,
    ) -> Result<NodeId, HierarchyError> {
        let id = NodeId(self.next_id);
        let parent_node = self.get_mut(parent)?;
        let level = parent_node.level + 1;
        match position {
            Some(i) if i <= parent_node.children.len() => parent_node.children.insert(i, id),
            _ => parent_node.children.push(id),
        }

        self.nodes.insert(
            id,
            HierarchyNode {
                id,
                value,
                level,
                layout: LayoutMode::default(),
                kind,
                children: Vec::new(),
            },
        );
        self.parents.insert(id, parent);
        self.next_id += 1;
        Ok(id)
    }

    /// Appends an empty container under `parent`.
    pub fn add_child(&mut self, parent: NodeId) -> Result<NodeId, HierarchyError> {
        self.ensure_editable(parent)?;
        let id = self.create_node(parent, None, NodeKind::Container, String::new())?;
        debug!("added child {} under {}", id, parent);
        Ok(id)
    }

    /// Inserts an empty container directly after `node`.
    pub fn add_sibling(&mut self, node: NodeId) -> Result<NodeId, HierarchyError> {
        if node == self.root {
            return Err(HierarchyError::RootNotEditable);
        }
        self.ensure_editable(node)?;
        let parent = self.parent(node).ok_or(HierarchyError::UnknownNode(node))?;
        let position = self.position_in_parent(node).map(|i| i + 1);
        let id = self.create_node(parent, position, NodeKind::Container, String::new())?;
        debug!("added sibling {} after {}", id, node);
        Ok(id)
    }

    fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// What deleting `id` would affect.
    pub fn delete_impact(&self, id: NodeId) -> Result<DeleteImpact, HierarchyError> {
        let node = self.get(id)?;
        let duplicates = self
            .nodes
            .values()
            .filter(|n| n.template_id() == Some(id))
            .count();
        Ok(DeleteImpact {
            node: id,
            is_template: node.is_template(),
            descendants: self.preorder_from(id).len() - 1,
            duplicates,
        })
    }

    /// Removes `id` and its whole subtree.
    ///
    /// Templates and nodes with children need `confirmed`; a template's
    /// duplicates keep their now dangling `template_id` until the next
    /// classification. An emptied root gets its placeholder back.
    pub fn delete_node(&mut self, id: NodeId, confirmed: bool) -> Result<Vec<NodeId>, HierarchyError> {
        if id == self.root {
            return Err(HierarchyError::RootNotEditable);
        }
        self.ensure_editable(id)?;

        let impact = self.delete_impact(id)?;
        if !confirmed && (impact.is_template || impact.descendants > 0) {
            return Err(HierarchyError::ConfirmationRequired(impact));
        }

        let removed = self.remove_subtree(id);
        if impact.duplicates > 0 {
            warn!(
                "deleted template {}; {} duplicate(s) now reference a missing template",
                id, impact.duplicates
            );
        }

        if self.children(self.root).is_empty() {
            self.push_placeholder();
        }
        Ok(removed)
    }

    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        if let Some(parent) = self.parents.remove(&id) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|&c| c != id);
            }
        }
        let removed = self.preorder_from(id);
        for r in &removed {
            self.nodes.remove(r);
            self.parents.remove(r);
        }
        removed
    }

    fn clear_children(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.remove_subtree(child);
        }
    }

    /// Binds `id` to a column and resolves its value(s) from the sheet, without
    /// classifying or replicating. Returns the nodes created for extra values.
    pub(crate) fn bind_column(
        &mut self,
        sheet: &RawSheet,
        id: NodeId,
        column_index: usize,
        options: AssignOptions,
    ) -> Result<(Vec<String>, Vec<NodeId>), HierarchyError> {
        if id == self.root {
            return Err(HierarchyError::RootNotEditable);
        }
        self.ensure_editable(id)?;

        let binding = Binding {
            column_index,
            column_name: sheet.header(column_index).unwrap_or_default().to_string(),
        };
        let context = self.row_context(id);
        let values = unique_column_values_in(sheet, &context, column_index, options.scope);
        debug!(
            "node {} -> column {} ({}): {} value(s)",
            id,
            column_index,
            binding.column_name,
            values.len()
        );

        let created = match options.fan_out {
            FanOut::Siblings => self.bind_with_siblings(id, binding, &values)?,
            FanOut::Children => self.bind_with_children(id, binding, &values)?,
        };
        Ok((values, created))
    }

    fn bind_with_siblings(
        &mut self,
        id: NodeId,
        binding: Binding,
        values: &[String],
    ) -> Result<Vec<NodeId>, HierarchyError> {
        // Siblings generated by an earlier assignment of this node are stale.
        if let Some(parent) = self.parent(id) {
            let stale: Vec<NodeId> = self
                .children(parent)
                .iter()
                .copied()
                .filter(|&c| self.nodes[&c].template_id() == Some(id))
                .collect();
            for s in stale {
                self.remove_subtree(s);
            }
        }

        let Some((first, rest)) = values.split_first() else {
            let node = self.get_mut(id)?;
            node.value.clear();
            node.kind = NodeKind::Bound(binding);
            return Ok(Vec::new());
        };

        self.clear_children(id);
        {
            let node = self.get_mut(id)?;
            node.value = first.clone();
            node.kind = if rest.is_empty() {
                NodeKind::Bound(binding.clone())
            } else {
                NodeKind::Template(binding.clone())
            };
        }

        let Some(parent) = self.parent(id) else {
            return Ok(Vec::new());
        };
        let layout = self.get(id)?.layout;
        let mut position = self.position_in_parent(id).unwrap_or(0);
        let mut created = Vec::with_capacity(rest.len());
        for value in rest {
            position += 1;
            let kind = NodeKind::Duplicate {
                binding: binding.clone(),
                template_id: id,
            };
            let sibling = self.create_node(parent, Some(position), kind, value.clone())?;
            self.get_mut(sibling)?.layout = layout;
            created.push(sibling);
        }
        Ok(created)
    }

    fn bind_with_children(
        &mut self,
        id: NodeId,
        binding: Binding,
        values: &[String],
    ) -> Result<Vec<NodeId>, HierarchyError> {
        let stale: Vec<NodeId> = self
            .children(id)
            .iter()
            .copied()
            .filter(|c| self.nodes[c].column_index() == Some(binding.column_index))
            .collect();
        for s in stale {
            self.remove_subtree(s);
        }

        {
            let node = self.get_mut(id)?;
            if node.is_placeholder() {
                node.kind = NodeKind::Container;
            }
        }

        if values.is_empty() {
            let child = self.create_node(id, None, NodeKind::Bound(binding), String::new())?;
            return Ok(vec![child]);
        }

        let mut created = Vec::with_capacity(values.len());
        let mut template_id = None;
        for value in values {
            let kind = match template_id {
                None if values.len() == 1 => NodeKind::Bound(binding.clone()),
                None => NodeKind::Template(binding.clone()),
                Some(t) => NodeKind::Duplicate {
                    binding: binding.clone(),
                    template_id: t,
                },
            };
            let child = self.create_node(id, None, kind, value.clone())?;
            template_id.get_or_insert(child);
            created.push(child);
        }
        Ok(created)
    }

    /// Binds a column to `id`, then reclassifies the tree and propagates the
    /// structural change to every duplicate of the affected templates.
    pub fn assign_column(
        &mut self,
        sheet: &RawSheet,
        id: NodeId,
        column_index: usize,
        options: AssignOptions,
    ) -> Result<AssignOutcome, HierarchyError> {
        let (values, created) = self.bind_column(sheet, id, column_index, options)?;
        let classification = template::classify(self);

        // The node's own subtree changed (children fan-out) and so did its
        // parent's list of children.
        let mut replication = Vec::new();
        for candidate in [Some(id), self.parent(id)].into_iter().flatten() {
            if self.is_live_template(candidate) {
                replication.push(replication::replicate(self, sheet, candidate));
            }
        }

        Ok(AssignOutcome {
            node: Some(id),
            values,
            created,
            classification,
            replication,
        })
    }

    /// Sets the layout of `id` and of every node sharing its type.
    pub fn set_layout(&mut self, id: NodeId, layout: LayoutMode) -> Result<usize, HierarchyError> {
        self.ensure_editable(id)?;
        let targets = match self.get(id)?.node_type() {
            Some(t) => self.nodes_of_type(&t),
            None => vec![id],
        };
        for t in &targets {
            self.get_mut(*t)?.layout = layout;
        }
        Ok(targets.len())
    }

    /// Moves every top-level node under a new course container. The root drops
    /// one level so courses sit at level -1 and their content stays at 0.
    pub fn wrap_in_course(&mut self, title: &str) -> Result<NodeId, HierarchyError> {
        let root = self.root;
        let children = {
            let root_node = self.get_mut(root)?;
            root_node.level -= 1;
            std::mem::take(&mut root_node.children)
        };
        let course = self.create_node(root, None, NodeKind::Container, title.to_string())?;
        for child in &children {
            self.parents.insert(*child, course);
        }
        self.get_mut(course)?.children = children;
        self.repair_levels();
        Ok(course)
    }

    /// Nodes whose level is not their parent's level plus one.
    pub fn level_violations(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|id| match self.parent(*id) {
                Some(p) => self.nodes[id].level != self.nodes[&p].level + 1,
                None => false,
            })
            .collect()
    }

    /// Restores `level == parent.level + 1` top-down. Returns the number of
    /// nodes that were fixed.
    pub fn repair_levels(&mut self) -> usize {
        let mut fixed = 0;
        let mut queue = vec![self.root];
        while let Some(id) = queue.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let level = node.level;
            for child in node.children.clone() {
                if let Some(c) = self.nodes.get_mut(&child) {
                    if c.level != level + 1 {
                        c.level = level + 1;
                        fixed += 1;
                    }
                    queue.push(child);
                }
            }
        }
        if fixed > 0 {
            debug!("repaired {} node level(s)", fixed);
        }
        fixed
    }

    fn rebuild_parents(&mut self) {
        self.parents.clear();
        for node in self.nodes.values() {
            for child in &node.children {
                self.parents.insert(*child, node.id);
            }
        }
    }

    pub fn view(&self, id: NodeId) -> Option<NodeView> {
        let node = self.nodes.get(&id)?;
        Some(NodeView {
            id: node.id.0,
            value: node.value.clone(),
            column_name: node.column_name().map(str::to_string),
            column_index: node.column_index(),
            level: node.level,
            layout_mode: node.layout,
            is_template: node.is_template(),
            is_duplicate: node.is_duplicate(),
            template_id: node.template_id().map(|t| t.0),
            is_placeholder: node.is_placeholder(),
            children: node
                .children
                .iter()
                .filter_map(|c| self.view(*c))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tree_has_placeholder_at_level_zero() {
        let tree = HierarchyTree::new();
        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.level, ROOT_LEVEL);
        assert_eq!(root.children.len(), 1);
        let stub = tree.get(root.children[0]).unwrap();
        assert!(stub.is_placeholder());
        assert_eq!(stub.level, 0);
    }

    #[test]
    fn snapshot_roundtrip_rebuilds_parents() {
        let mut tree = HierarchyTree::new();
        let first = tree.children(tree.root())[0];
        let child = tree.add_child(first).unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        assert!(!json.contains("parents"));
        let back: HierarchyTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.parent(child), Some(first));
        assert_eq!(back, tree);
    }

    #[test]
    fn repair_levels_skips_missing_children() {
        let mut tree = HierarchyTree::new();
        let first = tree.children(tree.root())[0];
        let child = tree.add_child(first).unwrap();

        let mut json = serde_json::to_value(&tree).unwrap();
        for node in json["nodes"].as_array_mut().unwrap() {
            if node["id"] == serde_json::json!(first.0) {
                node["children"].as_array_mut().unwrap().push(serde_json::json!(999));
            }
            if node["id"] == serde_json::json!(child.0) {
                node["level"] = serde_json::json!(7);
            }
        }
        let mut damaged: HierarchyTree = serde_json::from_value(json).unwrap();

        assert_eq!(damaged.repair_levels(), 1);
        assert_eq!(damaged.get(child).unwrap().level, 1);
    }
}
