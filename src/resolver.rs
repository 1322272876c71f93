//! Row-hierarchy resolution over a raw sheet.
//!
//! Excel writes a merged value only once and leaves the cells below it blank.
//! Every lookup here therefore scans rows top to bottom keeping a running
//! value per constrained column: a non-blank cell overwrites it, a blank cell
//! inherits it. A row belongs to a context when all running values match.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

use crate::sheet::RawSheet;

lazy_static! {
    static ref BLOK_LABEL: Regex = Regex::new(r"(?i)^blok\s*\d+$").unwrap();
    static ref WEEK_LABEL: Regex = Regex::new(r"(?i)^week\s*\d+$").unwrap();
}

/// One ancestor constraint: the column a node is bound to and its value.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ContextEntry {
    pub column_index: usize,
    pub value: String,
}

/// Ordered ancestor constraints, root first.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct RowContext(Vec<ContextEntry>);

impl RowContext {
    pub fn new() -> Self {
        RowContext(Vec::new())
    }

    pub fn push(&mut self, column_index: usize, value: impl Into<String>) {
        self.0.push(ContextEntry {
            column_index,
            value: value.into(),
        });
    }

    pub fn with(mut self, column_index: usize, value: impl Into<String>) -> Self {
        self.push(column_index, value);
        self
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Distinct constrained columns in first-seen order.
    fn tracked_columns(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        for entry in &self.0 {
            if !seen.contains(&entry.column_index) {
                seen.push(entry.column_index);
            }
        }
        seen
    }
}

/// How the rows for a context are selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowScope {
    /// Every row whose running values match, anywhere in the sheet.
    #[default]
    AllMatching,
    /// Only the first contiguous block matching the context.
    ContiguousBlock,
}

/// Running values for the tracked columns of a context.
struct ForwardFill<'a> {
    sheet: &'a RawSheet,
    columns: Vec<usize>,
    running: Vec<&'a str>,
}

impl<'a> ForwardFill<'a> {
    fn new(sheet: &'a RawSheet, context: &RowContext) -> Self {
        let columns = context.tracked_columns();
        let running = vec![""; columns.len()];
        ForwardFill {
            sheet,
            columns,
            running,
        }
    }

    /// Folds row `row` into the running values.
    fn advance(&mut self, row: usize) {
        for (slot, &col) in self.columns.iter().enumerate() {
            let cell = self.sheet.cell(row, col);
            if !cell.is_empty() {
                self.running[slot] = cell;
            }
        }
    }

    fn running_value(&self, column_index: usize) -> &'a str {
        self.columns
            .iter()
            .position(|&c| c == column_index)
            .map(|slot| self.running[slot])
            .unwrap_or("")
    }

    fn satisfies(&self, context: &RowContext) -> bool {
        context
            .entries()
            .iter()
            .all(|e| self.running_value(e.column_index) == e.value)
    }

    /// True when row `row` writes a value other than the required one into a
    /// tracked column.
    fn leaves_context(&self, row: usize, context: &RowContext) -> bool {
        context.entries().iter().any(|e| {
            let cell = self.sheet.cell(row, e.column_index);
            !cell.is_empty() && cell != e.value
        })
    }
}

/// Indices of the data rows belonging to `context`.
///
/// An empty context selects every data row. The scan is strictly sequential;
/// interleaved ranges in malformed data are resolved by running value only.
pub fn resolve_row_indices(sheet: &RawSheet, context: &RowContext) -> Vec<usize> {
    if context.is_empty() {
        return (0..sheet.rows.len()).collect();
    }

    let mut fill = ForwardFill::new(sheet, context);
    let mut matched = Vec::new();
    for row in 0..sheet.rows.len() {
        fill.advance(row);
        if fill.satisfies(context) {
            matched.push(row);
        }
    }
    matched
}

pub fn resolve_rows<'a>(sheet: &'a RawSheet, context: &RowContext) -> Vec<&'a [String]> {
    resolve_row_indices(sheet, context)
        .into_iter()
        .map(|i| sheet.rows[i].as_slice())
        .collect()
}

/// The first contiguous block of rows matching `context`.
///
/// Starts at the first row whose running values satisfy the context and
/// stops before the first row that writes a different non-blank value into
/// any constrained column. Returns an empty range when nothing matches.
pub fn resolve_contiguous_block(sheet: &RawSheet, context: &RowContext) -> Range<usize> {
    if context.is_empty() {
        return 0..sheet.rows.len();
    }

    let mut fill = ForwardFill::new(sheet, context);
    let mut start = None;
    for row in 0..sheet.rows.len() {
        fill.advance(row);
        if fill.satisfies(context) {
            start = Some(row);
            break;
        }
    }

    let Some(start) = start else {
        return 0..0;
    };

    let mut end = start + 1;
    while end < sheet.rows.len() && !fill.leaves_context(end, context) {
        end += 1;
    }
    start..end
}

/// Row indices selected by `scope`.
pub fn rows_in_scope(sheet: &RawSheet, context: &RowContext, scope: RowScope) -> Vec<usize> {
    match scope {
        RowScope::AllMatching => resolve_row_indices(sheet, context),
        RowScope::ContiguousBlock => resolve_contiguous_block(sheet, context).collect(),
    }
}

/// Distinct non-blank values of `target_column` within the rows of `context`,
/// sorted ordinally.
pub fn unique_column_values(
    sheet: &RawSheet,
    context: &RowContext,
    target_column: usize,
) -> Vec<String> {
    unique_column_values_in(sheet, context, target_column, RowScope::AllMatching)
}

pub fn unique_column_values_in(
    sheet: &RawSheet,
    context: &RowContext,
    target_column: usize,
    scope: RowScope,
) -> Vec<String> {
    if target_column >= sheet.width() {
        return Vec::new();
    }

    let values: BTreeSet<&str> = rows_in_scope(sheet, context, scope)
        .into_iter()
        .map(|row| sheet.cell(row, target_column))
        .filter(|cell| !cell.is_empty())
        .collect();
    let values: Vec<String> = values.into_iter().map(str::to_string).collect();

    match sheet.header(target_column).and_then(hierarchy_label_pattern) {
        Some(pattern) => narrow_to_labels(values, pattern),
        None => values,
    }
}

/// Label shape for the strict hierarchical columns ("Blok", "Week").
fn hierarchy_label_pattern(header: &str) -> Option<&'static Regex> {
    let header = header.trim();
    if header.eq_ignore_ascii_case("blok") {
        Some(&*BLOK_LABEL)
    } else if header.eq_ignore_ascii_case("week") {
        Some(&*WEEK_LABEL)
    } else {
        None
    }
}

/// Keeps only label-shaped values, unless none of them are.
fn narrow_to_labels(values: Vec<String>, pattern: &Regex) -> Vec<String> {
    if !values.iter().any(|v| pattern.is_match(v)) {
        return values;
    }
    values.into_iter().filter(|v| pattern.is_match(v)).collect()
}
