//! One editing session: a selected sheet and the hierarchy built over it.
//!
//! Every mutating action works on a copy of the tree and only replaces the
//! live tree when the whole action (assignment, classification, replication)
//! succeeded, so observers never see a half-propagated structure.

use log::{info, warn};
use std::path::Path;

use crate::config::{ColumnMapping, ParentRef};
use crate::downloader;
use crate::error::{ExportError, HierarchyError, PersistError};
use crate::hierarchy::{AssignOptions, AssignOutcome, HierarchyTree, LayoutMode, NodeId};
use crate::pagination::{PageLayout, PaginationEngine};
use crate::report::{self, ListReport};
use crate::saving::{self, SavedHierarchy};
use crate::sheet::RawSheet;
use crate::template::{self, ClassifyReport};

#[derive(Clone, Debug)]
pub struct Session {
    pub file_id: String,
    pub sheet_id: String,
    sheet: RawSheet,
    tree: HierarchyTree,
}

impl Session {
    pub fn new(file_id: &str, sheet_id: &str, sheet: RawSheet) -> Self {
        Session {
            file_id: file_id.to_string(),
            sheet_id: sheet_id.to_string(),
            sheet,
            tree: HierarchyTree::new(),
        }
    }

    pub fn sheet(&self) -> &RawSheet {
        &self.sheet
    }

    pub fn tree(&self) -> &HierarchyTree {
        &self.tree
    }

    /// Runs `action` on a draft of the tree; commits only on success.
    fn transact<T>(
        &mut self,
        action: impl FnOnce(&mut HierarchyTree, &RawSheet) -> Result<T, HierarchyError>,
    ) -> Result<T, HierarchyError> {
        let mut draft = self.tree.clone();
        let result = action(&mut draft, &self.sheet)?;
        self.tree = draft;
        Ok(result)
    }

    pub fn assign_column(
        &mut self,
        node: NodeId,
        column_index: usize,
        options: AssignOptions,
    ) -> Result<AssignOutcome, HierarchyError> {
        self.transact(|tree, sheet| tree.assign_column(sheet, node, column_index, options))
    }

    pub fn add_child(&mut self, parent: NodeId) -> Result<NodeId, HierarchyError> {
        self.transact(|tree, _| tree.add_child(parent))
    }

    pub fn add_sibling(&mut self, node: NodeId) -> Result<NodeId, HierarchyError> {
        self.transact(|tree, _| tree.add_sibling(node))
    }

    /// Deletes `node` and reclassifies, so duplicates of a deleted template are
    /// promoted or released right away.
    pub fn delete_node(
        &mut self,
        node: NodeId,
        confirmed: bool,
    ) -> Result<(Vec<NodeId>, ClassifyReport), HierarchyError> {
        self.transact(|tree, _| {
            let removed = tree.delete_node(node, confirmed)?;
            let report = template::classify(tree);
            Ok((removed, report))
        })
    }

    pub fn set_layout(&mut self, node: NodeId, layout: LayoutMode) -> Result<usize, HierarchyError> {
        self.transact(|tree, _| tree.set_layout(node, layout))
    }

    pub fn wrap_in_course(&mut self, title: &str) -> Result<NodeId, HierarchyError> {
        self.transact(|tree, _| tree.wrap_in_course(title))
    }

    pub fn mapping(&self) -> ColumnMapping {
        ColumnMapping::from_tree(&self.tree, self.sheet.width())
    }

    /// Replaces the tree with one rebuilt from `mapping`, column by column
    /// with parents first. Every column is assigned once on each editable
    /// node of its parent column; replication carries it to the duplicates.
    pub fn apply_mapping(&mut self, mapping: &ColumnMapping) -> Result<ClassifyReport, HierarchyError> {
        let chain = mapping.column_chain();
        self.transact(|tree, sheet| {
            let mut fresh = HierarchyTree::new();
            for (column, parent) in chain {
                if column >= sheet.width() {
                    warn!("mapping names column {} beyond the sheet width {}", column, sheet.width());
                    continue;
                }
                for slot in mapping_slots(&mut fresh, parent, column)? {
                    fresh.assign_column(sheet, slot, column, AssignOptions::default())?;
                }
            }
            let report = template::classify(&mut fresh);
            *tree = fresh;
            Ok(report)
        })
    }

    pub fn report(&self, node: Option<NodeId>, show_empty_cells: bool) -> Result<ListReport, HierarchyError> {
        ListReport::from_subtree(&self.tree, node.unwrap_or(self.tree.root()), show_empty_cells)
    }

    /// Paginated print HTML of the list report for `node` (default: root).
    pub fn render_preview(
        &self,
        node: Option<NodeId>,
        show_empty_cells: bool,
        title: &str,
        layout: &PageLayout,
        max_page_height_px: f64,
    ) -> Result<String, ExportError> {
        let mut list = self.report(node, show_empty_cells)?;
        list.title = title.to_string();
        let mut engine = PaginationEngine::with_text_metrics(layout.clone());
        report::render_html(&list, &mut engine, max_page_height_px)
    }

    pub fn export_csv(&self) -> Result<String, HierarchyError> {
        downloader::to_csv(&self.tree, self.tree.root())
    }

    pub fn export_xlsx(&self) -> Result<Vec<u8>, ExportError> {
        downloader::to_xlsx(&self.tree, self.tree.root())
    }

    pub fn snapshot(&self) -> SavedHierarchy {
        SavedHierarchy {
            file_id: self.file_id.clone(),
            sheet_id: self.sheet_id.clone(),
            tree: self.tree.clone(),
        }
    }

    /// Saves the tree under `dir`, returning the snapshot path.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<std::path::PathBuf, PersistError> {
        let path = saving::snapshot_path(dir, &self.file_id, &self.sheet_id);
        saving::save_hierarchy(&self.snapshot(), &path)?;
        Ok(path)
    }

    /// Loads the snapshot saved for this file and sheet, if there is one.
    pub fn restore(&mut self, dir: impl AsRef<Path>) -> Result<bool, PersistError> {
        let path = saving::snapshot_path(dir, &self.file_id, &self.sheet_id);
        if !path.exists() {
            return Ok(false);
        }
        let saved = saving::load_hierarchy(&path)?;
        self.tree = saved.tree;
        let report = template::classify(&mut self.tree);
        info!(
            "restored {} node(s) from {} ({} template(s))",
            self.tree.len(),
            path.display(),
            report.templates
        );
        Ok(true)
    }

    /// Brings a freshly opened sheet back to where the user left it: the saved
    /// snapshot when there is one, otherwise the stored column mapping.
    /// Returns a message for the user when either could not be used.
    pub fn resume(&mut self, dir: impl AsRef<Path>, mapping: Option<&ColumnMapping>) -> Option<String> {
        match self.restore(dir) {
            Ok(true) => None,
            Ok(false) => {
                let mapping = mapping?;
                match self.apply_mapping(mapping) {
                    Ok(_) => None,
                    Err(e) => {
                        let message = format!("stored column mapping could not be applied: {}", e);
                        warn!("{}-{}: {}", self.file_id, self.sheet_id, message);
                        Some(message)
                    }
                }
            }
            Err(e) => {
                let message = format!("saved hierarchy could not be read: {}", e);
                warn!("{}-{}: {}", self.file_id, self.sheet_id, message);
                Some(message)
            }
        }
    }
}

/// Empty slots a mapped column is assigned to: the first unbound top-level
/// node (or a new one) for root columns, a new child of every editable node
/// of the parent column otherwise.
fn mapping_slots(
    tree: &mut HierarchyTree,
    parent: ParentRef,
    column: usize,
) -> Result<Vec<NodeId>, HierarchyError> {
    match parent {
        ParentRef::Ignore => Ok(Vec::new()),
        ParentRef::Root => {
            let root = tree.root();
            let free = tree
                .children(root)
                .iter()
                .copied()
                .find(|&c| tree.node(c).is_some_and(|n| n.column_index().is_none()));
            let slot = match free {
                Some(slot) => slot,
                None => tree.add_child(root)?,
            };
            Ok(vec![slot])
        }
        ParentRef::Column(parent_column) => {
            let hosts: Vec<NodeId> = tree
                .preorder()
                .into_iter()
                .filter(|&id| {
                    tree.node(id).and_then(|n| n.column_index()) == Some(parent_column)
                        && !tree.is_read_only(id)
                        && tree.child_bound_to(id, column).is_none()
                })
                .collect();
            hosts.into_iter().map(|host| tree.add_child(host)).collect()
        }
    }
}
