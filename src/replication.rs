//! Propagation of a template's structure to every node of its type.
//!
//! Only "column X is assigned here" decisions travel. Each duplicate resolves
//! the values for a propagated column from its own ancestor context, so two
//! duplicates under different parents end up with different children.

use log::{debug, info, warn};
use serde::Serialize;

use crate::hierarchy::{AssignOptions, FanOut, HierarchyTree, NodeId, NodeKind};
use crate::resolver::RowScope;
use crate::sheet::RawSheet;
use crate::template;

/// Deepest template subtree copied onto a duplicate. Anything below is cut
/// off and reported as truncated.
pub const MAX_PROJECTION_DEPTH: usize = 32;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub template: Option<NodeId>,
    pub duplicates_visited: usize,
    /// Duplicates skipped because their template reference dangles.
    pub duplicates_skipped: usize,
    pub nodes_created: usize,
    pub truncated: usize,
    /// Set once, after all duplicates were processed.
    pub needs_render: bool,
}

/// Copies the column structure under `template_id` onto every other node of
/// the same type. A no-op unless `template_id` is a live template.
pub fn replicate(tree: &mut HierarchyTree, sheet: &RawSheet, template_id: NodeId) -> ReplicationReport {
    replicate_with_depth(tree, sheet, template_id, MAX_PROJECTION_DEPTH)
}

pub fn replicate_with_depth(
    tree: &mut HierarchyTree,
    sheet: &RawSheet,
    template_id: NodeId,
    max_depth: usize,
) -> ReplicationReport {
    let mut report = ReplicationReport::default();

    let Some(node_type) = tree
        .node(template_id)
        .filter(|n| n.is_template())
        .and_then(|n| n.node_type())
    else {
        debug!("replicate: {} is not a template, nothing to do", template_id);
        return report;
    };
    report.template = Some(template_id);

    let targets: Vec<NodeId> = tree
        .nodes_of_type(&node_type)
        .into_iter()
        .filter(|&id| id != template_id && !tree.is_ancestor(template_id, id))
        .collect();

    for target in targets {
        let dangling = tree
            .node(target)
            .and_then(|n| n.template_id())
            .is_some_and(|t| !tree.is_live_template(t));
        if dangling {
            warn!("replicate: skipping {} whose template no longer exists", target);
            report.duplicates_skipped += 1;
            continue;
        }

        report.duplicates_visited += 1;
        project_structure(tree, sheet, template_id, target, max_depth, &mut report);
    }

    if report.nodes_created > 0 {
        template::classify(tree);
        report.needs_render = true;
    }
    info!(
        "replicated {} onto {} duplicate(s): {} node(s) created, {} skipped",
        template_id, report.duplicates_visited, report.nodes_created, report.duplicates_skipped
    );
    report
}

/// Recreates, under `target`, every column assignment found among the
/// children of `source`, descending through already expanded source children.
fn project_structure(
    tree: &mut HierarchyTree,
    sheet: &RawSheet,
    source: NodeId,
    target: NodeId,
    max_depth: usize,
    report: &mut ReplicationReport,
) {
    let options = AssignOptions {
        fan_out: FanOut::Siblings,
        scope: RowScope::ContiguousBlock,
    };

    let mut work = vec![(source, target, max_depth)];
    while let Some((source, target, depth)) = work.pop() {
        if depth == 0 {
            warn!(
                "replicate: structure below {} exceeds depth {}, truncated at {}",
                source, max_depth, target
            );
            report.truncated += 1;
            continue;
        }

        for (source_child, column_index) in bound_children(tree, source) {
            if tree.child_bound_to(target, column_index).is_some() {
                continue;
            }

            let layout = tree.node(source_child).map(|n| n.layout).unwrap_or_default();
            let Ok(slot) = tree.create_node(target, None, NodeKind::Container, String::new()) else {
                continue;
            };
            let created = match tree.bind_column(sheet, slot, column_index, options) {
                Ok((_, created)) => created,
                Err(e) => {
                    warn!("replicate: could not bind column {} under {}: {}", column_index, target, e);
                    tree.remove_subtree(slot);
                    continue;
                }
            };

            let new_nodes: Vec<NodeId> = std::iter::once(slot).chain(created).collect();
            report.nodes_created += new_nodes.len();
            for &n in &new_nodes {
                if let Ok(node) = tree.get_mut(n) {
                    node.layout = layout;
                }
            }

            if tree.children(source_child).is_empty() {
                continue;
            }
            for n in new_nodes {
                if tree.children(n).is_empty() {
                    work.push((source_child, n, depth - 1));
                }
            }
        }
    }
}

/// First child of `parent` per bound column, in child order.
fn bound_children(tree: &HierarchyTree, parent: NodeId) -> Vec<(NodeId, usize)> {
    let mut out: Vec<(NodeId, usize)> = Vec::new();
    for &child in tree.children(parent) {
        let Some(col) = tree.node(child).and_then(|n| n.column_index()) else {
            continue;
        };
        if !out.iter().any(|&(_, c)| c == col) {
            out.push((child, col));
        }
    }
    out
}
