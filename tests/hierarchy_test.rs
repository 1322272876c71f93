mod common;

use common::{build_planning, planning_sheet, top_level, values};
use materialenlijst::error::HierarchyError;
use materialenlijst::hierarchy::{AssignOptions, FanOut, HierarchyTree, LayoutMode, ROOT_LEVEL};
use materialenlijst::sheet::{RawSheet, grid};

#[test]
fn first_assignment_fans_out_as_siblings() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let stub = top_level(&tree)[0];

    let outcome = tree
        .assign_column(&sheet, stub, 0, AssignOptions::default())
        .unwrap();
    assert_eq!(outcome.values, vec!["Blok 1", "Blok 2"]);
    assert_eq!(outcome.created.len(), 1);

    let top = top_level(&tree);
    assert_eq!(values(&tree, &top), vec!["Blok 1", "Blok 2"]);
    let first = tree.node(top[0]).unwrap();
    let second = tree.node(top[1]).unwrap();
    assert!(first.is_template());
    assert!(!first.is_placeholder(), "placeholder flag should be gone");
    assert!(second.is_duplicate());
    assert_eq!(second.template_id(), Some(top[0]));
    assert_eq!(second.level, 0);
    println!("✓ Level-0 ambiguity becomes template plus duplicate siblings");
}

#[test]
fn week_under_first_blok_creates_two_siblings() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let blok = top_level(&tree)[0];
    tree.assign_column(&sheet, blok, 0, AssignOptions::default())
        .unwrap();

    let week = tree.add_child(blok).unwrap();
    let outcome = tree
        .assign_column(&sheet, week, 1, AssignOptions::default())
        .unwrap();
    assert_eq!(outcome.values, vec!["Week 1", "Week 2"]);

    let weeks = tree.children(blok).to_vec();
    assert_eq!(values(&tree, &weeks), vec!["Week 1", "Week 2"]);
    assert!(tree.node(weeks[0]).unwrap().is_template());
    assert_eq!(tree.node(weeks[1]).unwrap().template_id(), Some(weeks[0]));
    assert!(weeks.iter().all(|&w| tree.node(w).unwrap().level == 1));
    println!("✓ Assigning Week at level 1 gives Week 1 (template) and Week 2");
}

#[test]
fn single_and_missing_values() {
    let sheet = RawSheet::from_grid(grid(&[["Vak", "Leeg"], ["Biologie", ""], ["", ""]]));
    let mut tree = HierarchyTree::new();
    let node = top_level(&tree)[0];

    tree.assign_column(&sheet, node, 0, AssignOptions::default())
        .unwrap();
    let n = tree.node(node).unwrap();
    assert_eq!(n.value, "Biologie");
    assert!(!n.is_template() && !n.is_duplicate());

    tree.assign_column(&sheet, node, 1, AssignOptions::default())
        .unwrap();
    let n = tree.node(node).unwrap();
    assert_eq!(n.value, "", "no values must leave the node blank, not the header");
    assert_eq!(n.column_name(), Some("Leeg"));
    println!("✓ One value is assigned directly, none leaves the node blank");
}

#[test]
fn children_fan_out_keeps_the_node() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let stub = top_level(&tree)[0];
    let options = AssignOptions {
        fan_out: FanOut::Children,
        ..AssignOptions::default()
    };

    let outcome = tree.assign_column(&sheet, stub, 0, options).unwrap();
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(top_level(&tree), vec![stub]);
    assert_eq!(values(&tree, tree.children(stub)), vec!["Blok 1", "Blok 2"]);
    println!("✓ Children fan-out adds one child per value");
}

#[test]
fn levels_follow_parents() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    build_planning(&mut tree, &sheet);

    assert!(tree.level_violations().is_empty());
    for id in tree.preorder() {
        let node = tree.node(id).unwrap();
        match tree.parent(id) {
            Some(p) => assert_eq!(node.level, tree.node(p).unwrap().level + 1),
            None => assert_eq!(node.level, ROOT_LEVEL),
        }
    }
    println!("✓ Every node sits one level below its parent");
}

#[test]
fn duplicates_are_read_only() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    build_planning(&mut tree, &sheet);
    let duplicate = top_level(&tree)[1];
    let before = tree.clone();

    assert_eq!(
        tree.add_child(duplicate),
        Err(HierarchyError::DuplicateReadOnly(duplicate))
    );
    assert_eq!(
        tree.add_sibling(duplicate),
        Err(HierarchyError::DuplicateReadOnly(duplicate))
    );
    assert!(tree
        .assign_column(&sheet, duplicate, 3, AssignOptions::default())
        .is_err());
    assert!(tree.set_layout(duplicate, LayoutMode::Horizontal).is_err());
    assert_eq!(tree, before, "a refused edit must not change the tree");
    println!("✓ Structural edits on duplicates are refused");
}

#[test]
fn sibling_lands_right_after_node() {
    let mut tree = HierarchyTree::new();
    let first = top_level(&tree)[0];
    let second = tree.add_sibling(first).unwrap();
    let between = tree.add_sibling(first).unwrap();
    assert_eq!(top_level(&tree), vec![first, between, second]);
    assert_eq!(tree.add_sibling(tree.root()), Err(HierarchyError::RootNotEditable));
    println!("✓ add_sibling inserts directly after the node");
}

#[test]
fn deleting_needs_confirmation() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let (blok, _, _) = build_planning(&mut tree, &sheet);

    match tree.delete_node(blok, false) {
        Err(HierarchyError::ConfirmationRequired(impact)) => {
            assert!(impact.is_template);
            assert_eq!(impact.duplicates, 1);
            assert!(impact.descendants > 0);
        }
        other => panic!("expected a confirmation request, got {:?}", other),
    }
    assert!(tree.contains(blok), "unconfirmed delete must keep the node");

    let removed = tree.delete_node(blok, true).unwrap();
    assert_eq!(removed[0], blok);
    assert!(removed.iter().all(|&id| !tree.contains(id)));
    println!("✓ Template deletion asks first and cascades after confirmation");
}

#[test]
fn plain_leaf_deletes_without_confirmation() {
    let mut tree = HierarchyTree::new();
    let first = top_level(&tree)[0];
    let extra = tree.add_sibling(first).unwrap();
    assert_eq!(tree.delete_node(extra, false), Ok(vec![extra]));

    // The last top-level node brings the placeholder back.
    tree.delete_node(first, false).unwrap();
    let top = top_level(&tree);
    assert_eq!(top.len(), 1);
    assert!(tree.node(top[0]).unwrap().is_placeholder());
    assert_eq!(tree.delete_node(tree.root(), true), Err(HierarchyError::RootNotEditable));
    println!("✓ Leaves delete directly; an empty tree gets its placeholder back");
}

#[test]
fn layout_applies_to_the_whole_type() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let (_, week, _) = build_planning(&mut tree, &sheet);

    let changed = tree.set_layout(week, LayoutMode::Horizontal).unwrap();
    assert_eq!(changed, 4, "all four Week nodes share the type");
    let week_type = tree.node(week).unwrap().node_type().unwrap();
    assert!(tree
        .nodes_of_type(&week_type)
        .iter()
        .all(|&w| tree.node(w).unwrap().layout == LayoutMode::Horizontal));
    println!("✓ Layout changes propagate to every node of the type");
}

#[test]
fn course_wrapper_shifts_root() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    let (blok, _, _) = build_planning(&mut tree, &sheet);

    let course = tree.wrap_in_course("Biologie").unwrap();
    assert_eq!(tree.node(tree.root()).unwrap().level, -2);
    assert_eq!(tree.node(course).unwrap().level, -1);
    assert_eq!(tree.node(blok).unwrap().level, 0);
    assert_eq!(tree.parent(blok), Some(course));
    assert!(tree.level_violations().is_empty());
    println!("✓ Course containers sit at level -1");
}

#[test]
fn view_serializes_without_parent_links() {
    let sheet = planning_sheet();
    let mut tree = HierarchyTree::new();
    build_planning(&mut tree, &sheet);

    let view = tree.view(tree.root()).unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert!(json.get("parent").is_none());
    assert_eq!(json["children"][0]["columnName"], "Blok");
    assert_eq!(json["children"][0]["isTemplate"], true);
    assert_eq!(json["children"][1]["layoutMode"], "vertical");
    println!("✓ Tree view is nested JSON without back references");
}
