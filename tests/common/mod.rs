#![allow(dead_code)]

use materialenlijst::hierarchy::{AssignOptions, HierarchyTree, NodeId};
use materialenlijst::sheet::{RawSheet, grid};

/// Two blocks with merged Blok / Week cells, six lessons.
pub fn planning_sheet() -> RawSheet {
    RawSheet::from_grid(grid(&[
        ["Blok", "Week", "Les", "Werkblad"],
        ["Blok 1", "Week 1", "Les 1", "WB 1"],
        ["", "", "Les 2", "WB 2"],
        ["", "Week 2", "Les 3", "WB 3"],
        ["Blok 2", "Week 3", "Les 4", "WB 4"],
        ["", "", "Les 5", "WB 5"],
        ["", "Week 4", "Les 6", "WB 6"],
    ]))
}

pub fn top_level(tree: &HierarchyTree) -> Vec<NodeId> {
    tree.children(tree.root()).to_vec()
}

pub fn values(tree: &HierarchyTree, ids: &[NodeId]) -> Vec<String> {
    ids.iter()
        .map(|&id| tree.node(id).unwrap().value.clone())
        .collect()
}

/// Blok on the placeholder, then Week and Les below the first Blok.
pub fn build_planning(tree: &mut HierarchyTree, sheet: &RawSheet) -> (NodeId, NodeId, NodeId) {
    let blok = top_level(tree)[0];
    tree.assign_column(sheet, blok, 0, AssignOptions::default())
        .unwrap();
    let week = tree.add_child(blok).unwrap();
    tree.assign_column(sheet, week, 1, AssignOptions::default())
        .unwrap();
    let les = tree.add_child(week).unwrap();
    tree.assign_column(sheet, les, 2, AssignOptions::default())
        .unwrap();
    (blok, week, les)
}
