use std::path::PathBuf;
use thiserror::Error;

use crate::hierarchy::NodeId;

/// Failures of the spreadsheet reader collaborator.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Workbook could not be read: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("CSV could not be read: {0}")]
    Csv(#[from] csv::Error),
    #[error("Worksheet '{0}' not found")]
    SheetNotFound(String),
    #[error("Workbook contains no worksheets")]
    NoSheets,
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("File has no extension: {0}")]
    MissingExtension(PathBuf),
}

/// What a destructive delete would affect; shown to the user before confirming.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeleteImpact {
    pub node: NodeId,
    pub is_template: bool,
    pub descendants: usize,
    pub duplicates: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("Node {0} is a duplicate; edit its template instead")]
    DuplicateReadOnly(NodeId),
    #[error("The root container cannot be edited directly")]
    RootNotEditable,
    #[error(
        "Deleting node {} requires confirmation ({} descendants, {} duplicates affected)",
        .0.node, .0.descendants, .0.duplicates
    )]
    ConfirmationRequired(DeleteImpact),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaginationError {
    #[error("Measurement surface could not be attached: {0}")]
    AttachFailed(String),
    #[error("Page height budget must be positive, got {0}px")]
    InvalidBudget(f64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid mapping store: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),
    #[error("Template registration failed: {0}")]
    TemplateSyntax(#[from] Box<handlebars::TemplateError>),
    #[error("XLSX export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}
