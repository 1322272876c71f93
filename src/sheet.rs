use serde::{Deserialize, Serialize};

/// The active sheet as handed over by the spreadsheet reader.
///
/// `rows` holds data rows only; the header row lives in `headers`. Every row
/// is padded or truncated to `width()` and every cell is a trimmed string, so
/// a blank cell is always `""`.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    /// Builds a normalized sheet. The column count is the widest of the
    /// header row and all data rows.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = rows
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(headers.len()))
            .max()
            .unwrap_or(0);

        let headers = normalize_row(headers, width);
        let rows = rows.into_iter().map(|r| normalize_row(r, width)).collect();

        RawSheet { headers, rows }
    }

    /// Splits a raw grid into header row and data rows.
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return RawSheet::default();
        }
        let headers = grid.remove(0);
        RawSheet::new(headers, grid)
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header label of a column, `None` when the index is out of range.
    pub fn header(&self, column_index: usize) -> Option<&str> {
        self.headers.get(column_index).map(String::as_str)
    }

    /// Cell text, `""` for anything out of range.
    pub fn cell(&self, row: usize, column_index: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column_index))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn normalize_row(row: Vec<String>, width: usize) -> Vec<String> {
    let mut row: Vec<String> = row
        .into_iter()
        .take(width)
        .map(|c| c.trim().to_string())
        .collect();
    row.resize(width, String::new());
    row
}

/// Convenience for building sheets from string literals.
pub fn grid<const N: usize>(rows: &[[&str; N]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_trims_rows() {
        let sheet = RawSheet::new(
            vec!["Blok".into(), "Week".into()],
            vec![vec![" Blok 1 ".into()], vec!["a".into(), "b".into(), "c".into()]],
        );
        assert_eq!(sheet.width(), 3);
        assert_eq!(sheet.headers, vec!["Blok", "Week", ""]);
        assert_eq!(sheet.rows[0], vec!["Blok 1", "", ""]);
        assert_eq!(sheet.rows[1], vec!["a", "b", "c"]);
    }

    #[test]
    fn out_of_range_cells_are_blank() {
        let sheet = RawSheet::from_grid(grid(&[["H"], ["x"]]));
        assert_eq!(sheet.cell(0, 0), "x");
        assert_eq!(sheet.cell(5, 0), "");
        assert_eq!(sheet.cell(0, 9), "");
        assert_eq!(sheet.header(3), None);
    }

    #[test]
    fn empty_grid_gives_empty_sheet() {
        let sheet = RawSheet::from_grid(Vec::new());
        assert!(sheet.is_empty());
        assert_eq!(sheet.width(), 0);
    }
}
