use log::debug;
use serde::Serialize;
use std::collections::HashMap;

use crate::hierarchy::{HierarchyTree, NodeId, NodeKind, NodeType};

/// Counts from one classification pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyReport {
    pub templates: usize,
    pub duplicates: usize,
    /// Nodes whose kind changed in this pass.
    pub changed: usize,
    pub levels_repaired: usize,
}

/// Bound nodes grouped by type, groups and members in pre-order.
pub fn group_by_type(tree: &HierarchyTree) -> Vec<(NodeType, Vec<NodeId>)> {
    let mut groups: Vec<(NodeType, Vec<NodeId>)> = Vec::new();
    let mut index: HashMap<NodeType, usize> = HashMap::new();

    for id in tree.preorder() {
        let Some(node_type) = tree.node(id).and_then(|n| n.node_type()) else {
            continue;
        };
        match index.get(&node_type) {
            Some(&slot) => groups[slot].1.push(id),
            None => {
                index.insert(node_type.clone(), groups.len());
                groups.push((node_type, vec![id]));
            }
        }
    }
    groups
}

/// Marks the first node of every multi-member type as its template and the
/// others as duplicates of it; single members lose both flags.
///
/// Idempotent. Duplicates also take their template's layout, and node levels
/// are repaired in the same pass.
pub fn classify(tree: &mut HierarchyTree) -> ClassifyReport {
    let mut report = ClassifyReport {
        levels_repaired: tree.repair_levels(),
        ..ClassifyReport::default()
    };

    for (_, members) in group_by_type(tree) {
        let Some((&first, rest)) = members.split_first() else {
            continue;
        };
        let layout = tree.node(first).map(|n| n.layout).unwrap_or_default();

        if rest.is_empty() {
            report.changed += usize::from(retag(tree, first, Role::Single));
            continue;
        }

        report.templates += 1;
        report.changed += usize::from(retag(tree, first, Role::Template));
        for &dup in rest {
            report.duplicates += 1;
            report.changed += usize::from(retag(tree, dup, Role::Duplicate(first)));
            if let Ok(node) = tree.get_mut(dup) {
                node.layout = layout;
            }
        }
    }

    debug!(
        "classified: {} template(s), {} duplicate(s), {} change(s)",
        report.templates, report.duplicates, report.changed
    );
    report
}

enum Role {
    Single,
    Template,
    Duplicate(NodeId),
}

/// Applies `role` to a bound node; returns whether its kind changed.
fn retag(tree: &mut HierarchyTree, id: NodeId, role: Role) -> bool {
    let Ok(node) = tree.get_mut(id) else {
        return false;
    };
    let Some(binding) = node.binding().cloned() else {
        return false;
    };
    let kind = match role {
        Role::Single => NodeKind::Bound(binding),
        Role::Template => NodeKind::Template(binding),
        Role::Duplicate(template_id) => NodeKind::Duplicate {
            binding,
            template_id,
        },
    };
    if node.kind == kind {
        return false;
    }
    node.kind = kind;
    true
}

/// Duplicates whose `template_id` no longer names a live template.
pub fn dangling_duplicates(tree: &HierarchyTree) -> Vec<NodeId> {
    tree.preorder()
        .into_iter()
        .filter(|&id| {
            tree.node(id)
                .and_then(|n| n.template_id())
                .is_some_and(|t| !tree.is_live_template(t))
        })
        .collect()
}
