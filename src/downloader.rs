use crate::error::{ExportError, HierarchyError};
use crate::hierarchy::{HierarchyTree, NodeId};

/// A hierarchy subtree flattened into one row per root-to-leaf path.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Flatten the subtree at `node` into a table
///
/// Each leaf yields one row holding the values along its path, starting at
/// the first level-0 node. Column headers are the column names found at each
/// depth, or a spreadsheet-style letter for unbound levels.
pub fn flatten(tree: &HierarchyTree, node: NodeId) -> Result<FlatTable, HierarchyError> {
    let start = tree.get(node)?;
    let first_level = start.level.max(0);

    let mut rows = Vec::new();
    let mut headers: Vec<Option<String>> = Vec::new();
    for id in tree.preorder_from(node) {
        let Some(current) = tree.node(id) else {
            continue;
        };
        if current.level >= 0 {
            let depth = (current.level - first_level) as usize;
            if headers.len() <= depth {
                headers.resize(depth + 1, None);
            }
            if headers[depth].is_none() {
                headers[depth] = current.column_name().map(str::to_string);
            }
        }
        if !current.children.is_empty() || current.is_placeholder() || current.level < 0 {
            continue;
        }

        let path: Vec<String> = tree
            .ancestors(id)
            .into_iter()
            .rev()
            .chain(std::iter::once(id))
            .filter_map(|a| tree.node(a))
            .filter(|n| n.level >= first_level)
            .map(|n| n.value.clone())
            .collect();
        rows.push(path);
    }

    let headers: Vec<String> = headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| h.unwrap_or_else(|| column_to_letter(i as u16 + 1)))
        .collect();
    let width = headers.len();
    for row in &mut rows {
        row.resize(width, String::new());
    }

    Ok(FlatTable { headers, rows })
}

/// Convert a hierarchy subtree to CSV format
///
/// Values containing commas, quotes or newlines are quoted, with embedded
/// quotes doubled.
///
/// # Examples
/// ```
/// use materialenlijst::hierarchy::HierarchyTree;
/// use materialenlijst::downloader::to_csv;
///
/// let tree = HierarchyTree::new();
/// let csv = to_csv(&tree, tree.root()).unwrap();
/// assert!(csv.is_empty() || csv.ends_with('\n'));
/// ```
pub fn to_csv(tree: &HierarchyTree, node: NodeId) -> Result<String, HierarchyError> {
    let table = flatten(tree, node)?;
    let mut csv_content = String::new();

    for line in std::iter::once(&table.headers).chain(table.rows.iter()) {
        if line.is_empty() {
            continue;
        }
        let escaped: Vec<String> = line.iter().map(|v| escape_csv(v)).collect();
        csv_content.push_str(&escaped.join(","));
        csv_content.push('\n');
    }

    Ok(csv_content)
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert a hierarchy subtree to XLSX format
///
/// Writes the flattened table with a bold header row using rust_xlsxwriter.
pub fn to_xlsx(tree: &HierarchyTree, node: NodeId) -> Result<Vec<u8>, ExportError> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let table = flatten(tree, node)?;
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Materialenlijst")?;

    let bold = Format::new().set_bold();
    for (c, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, header, &bold)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, value)?;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

/// Convert column number to letter (A=1, B=2, etc.)
///
/// # Examples
/// ```
/// use materialenlijst::downloader::column_to_letter;
///
/// assert_eq!(column_to_letter(1), "A");
/// assert_eq!(column_to_letter(27), "AA");
/// ```
pub fn column_to_letter(col: u16) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}
