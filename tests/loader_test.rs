use materialenlijst::error::LoadError;
use materialenlijst::loader::{from_bytes, load_workbook, parse_csv};
use materialenlijst::resolver::{RowContext, unique_column_values};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::io::Write;

fn planning_xlsx() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let mut sheet = Worksheet::new();
    sheet.set_name("Planning").unwrap();
    let rows = [
        ["Blok", "Week", "Les"],
        ["Blok 1", "Week 1", "  Les 1 "],
        ["", "", "Les 2"],
    ];
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
    }
    sheet.write_number(3, 2, 4.0).unwrap();
    workbook.push_worksheet(sheet);
    workbook.push_worksheet(Worksheet::new());
    workbook.save_to_buffer().unwrap()
}

#[test]
fn uploaded_xlsx_is_normalized() {
    let book = from_bytes(planning_xlsx(), "upload-1").unwrap();
    assert_eq!(book.file_id, "upload-1");
    assert_eq!(book.sheet_names()[0], "Planning");

    let sheet = book.sheet("Planning").unwrap();
    assert_eq!(sheet.headers, vec!["Blok", "Week", "Les"]);
    assert_eq!(sheet.rows.len(), 3);
    assert_eq!(sheet.rows[0][2], "Les 1", "cells are trimmed");
    assert_eq!(sheet.rows[1], vec!["", "", "Les 2"]);
    assert_eq!(sheet.rows[2][2], "4");
    assert!(sheet.rows.iter().all(|r| r.len() == 3));

    assert_eq!(book.sheet_by_id("0").unwrap(), sheet);
    assert!(matches!(book.sheet("Rooster"), Err(LoadError::SheetNotFound(_))));
    println!("✓ XLSX uploads become padded, trimmed sheets");
}

#[test]
fn csv_files_load_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planning.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Blok,Week").unwrap();
    writeln!(file, "Blok 1,\"Week 1, deel 2\"").unwrap();
    drop(file);

    let book = load_workbook(&path, "csv-1").unwrap();
    assert_eq!(book.sheet_names(), vec!["planning"]);
    assert_eq!(book.sheets[0].1.rows[0][1], "Week 1, deel 2");
    println!("✓ CSV files load as a single sheet");
}

#[test]
fn multiline_csv_cells_keep_blocks_intact() {
    let text = "Blok,Werkblad\nBlok 1,\"WB 1\nWB 2\"\n,WB 3\nBlok 2,WB 4\n";
    let sheet = parse_csv(text.as_bytes()).unwrap();

    assert_eq!(sheet.rows.len(), 3);
    assert_eq!(sheet.rows[0][1], "WB 1\nWB 2");
    assert_eq!(
        unique_column_values(&sheet, &RowContext::new(), 0),
        vec!["Blok 1", "Blok 2"]
    );
    let blok1 = RowContext::new().with(0, "Blok 1");
    assert_eq!(unique_column_values(&sheet, &blok1, 1), vec!["WB 1\nWB 2", "WB 3"]);
    println!("✓ Quoted line breaks stay inside their cell");
}

#[test]
fn garbage_bytes_are_rejected() {
    assert!(from_bytes(b"not a workbook".to_vec(), "x").is_err());
    println!("✓ Unreadable uploads return an error");
}
