use crate::error::LoadError;
use crate::sheet::RawSheet;
use calamine::{Data, Reader, open_workbook_auto, open_workbook_auto_from_rs};
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::Path;

/// An uploaded workbook, cached in memory for the lifetime of the process.
///
/// Every sheet is normalized at ingestion, so consumers never see ragged rows.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    pub file_id: String,
    pub sheets: Vec<(String, RawSheet)>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Result<&RawSheet, LoadError> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| LoadError::SheetNotFound(name.to_string()))
    }

    /// Looks a sheet up by name, or by zero-based position when `id` is numeric.
    pub fn sheet_by_id(&self, id: &str) -> Result<&RawSheet, LoadError> {
        if let Ok(sheet) = self.sheet(id) {
            return Ok(sheet);
        }
        id.parse::<usize>()
            .ok()
            .and_then(|i| self.sheets.get(i))
            .map(|(_, s)| s)
            .ok_or_else(|| LoadError::SheetNotFound(id.to_string()))
    }
}

/// Load a workbook from a CSV file
///
/// The file becomes a single sheet named after the file stem. Quoted fields,
/// embedded commas and doubled quotes are handled.
///
/// # Examples
/// ```no_run
/// use materialenlijst::loader::from_csv;
///
/// match from_csv("planning.csv", "upload-1") {
///     Ok(book) => println!("Loaded {} sheet(s)", book.sheets.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>, file_id: &str) -> Result<Workbook, LoadError> {
    let path = filepath.as_ref();
    let file = File::open(path)?;
    let sheet = parse_csv(BufReader::new(file))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();

    Ok(Workbook {
        file_id: file_id.to_string(),
        sheets: vec![(name, sheet)],
    })
}

/// Parses CSV text into a normalized sheet; the first record is the header row.
///
/// Quoted fields may span lines, so sheets written by
/// [`crate::downloader::to_csv`] read back unchanged.
pub fn parse_csv(reader: impl BufRead) -> Result<RawSheet, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        // Ragged rows are padded by `RawSheet::from_grid`.
        .flexible(true)
        .from_reader(reader);

    let mut grid = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawSheet::from_grid(grid))
}

/// Load a workbook from an Excel or OpenDocument file on disk
///
/// # Examples
/// ```no_run
/// use materialenlijst::loader::from_excel;
///
/// match from_excel("planning.xlsx", "upload-1") {
///     Ok(book) => println!("Sheets: {:?}", book.sheet_names()),
///     Err(e) => eprintln!("Error loading Excel: {}", e),
/// }
/// ```
pub fn from_excel(filepath: impl AsRef<Path>, file_id: &str) -> Result<Workbook, LoadError> {
    let mut workbook = open_workbook_auto(filepath)?;
    read_sheets(&mut workbook, file_id)
}

/// Load a workbook from uploaded bytes (xlsx, xlsm, xlsb, xls or ods).
pub fn from_bytes(bytes: Vec<u8>, file_id: &str) -> Result<Workbook, LoadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_sheets(&mut workbook, file_id)
}

fn read_sheets<RS: Read + Seek>(
    workbook: &mut calamine::Sheets<RS>,
    file_id: &str,
) -> Result<Workbook, LoadError> {
    let sheet_names = workbook.sheet_names().to_owned();
    if sheet_names.is_empty() {
        return Err(LoadError::NoSheets);
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook.worksheet_range(&name)?;
        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let sheet = RawSheet::from_grid(grid);
        debug!(
            "sheet '{}': {} columns, {} data rows",
            name,
            sheet.width(),
            sheet.rows.len()
        );
        sheets.push((name, sheet));
    }

    info!("workbook {} loaded with {} sheet(s)", file_id, sheets.len());
    Ok(Workbook {
        file_id: file_id.to_string(),
        sheets,
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}

/// Detect file type and load the appropriate format
///
/// # Examples
/// ```no_run
/// use materialenlijst::loader::load_workbook;
///
/// match load_workbook("planning.xlsx", "upload-1") {
///     Ok(book) => println!("Loaded {}", book.file_id),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_workbook(filepath: impl AsRef<Path>, file_id: &str) -> Result<Workbook, LoadError> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path, file_id),
        Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => {
            from_excel(path, file_id)
        }
        Some(ext) => Err(LoadError::UnsupportedExtension(ext.to_string())),
        None => Err(LoadError::MissingExtension(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_keep_quoted_commas() {
        let text = "A,B,C\nBlok 1,\"Werkblad 3, 4\",\"zeg \"\"hallo\"\"\"\n,,\n";
        let sheet = parse_csv(text.as_bytes()).unwrap();
        assert_eq!(sheet.rows[0], vec!["Blok 1", "Werkblad 3, 4", r#"zeg "hallo""#]);
        assert_eq!(sheet.rows[1], vec!["", "", ""]);
    }

    #[test]
    fn quoted_newline_stays_in_one_cell() {
        let text = "Blok,Werkblad\nBlok 1,\"WB 1\nWB 2\"\n";
        let sheet = parse_csv(text.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0], vec!["Blok 1", "WB 1\nWB 2"]);
    }

    #[test]
    fn csv_text_becomes_normalized_sheet() {
        let text = "Blok,Week,Les\nBlok 1,Week 1,Les 1\n,,Les 2\n\n";
        let sheet = parse_csv(text.as_bytes()).unwrap();
        assert_eq!(sheet.headers, vec!["Blok", "Week", "Les"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1], vec!["", "", "Les 2"]);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_workbook("notes.txt", "x").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension(ext) if ext == "txt"));
    }
}
