use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistError;
use crate::hierarchy::HierarchyTree;

/// A hierarchy together with the sheet it was built from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedHierarchy {
    pub file_id: String,
    pub sheet_id: String,
    pub tree: HierarchyTree,
}

/// `<dir>/<fileId>-<sheetId>.bin.gz`
pub fn snapshot_path(dir: impl AsRef<Path>, file_id: &str, sheet_id: &str) -> PathBuf {
    dir.as_ref().join(format!("{}-{}.bin.gz", file_id, sheet_id))
}

/// Writes `saved` as gzip-compressed bincode.
///
/// # Arguments
/// * `saved` - The hierarchy to persist
/// * `filename` - Target path; missing parent directories are created
pub fn save_hierarchy(saved: &SavedHierarchy, filename: impl AsRef<Path>) -> Result<(), PersistError> {
    let filename = filename.as_ref();
    if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let file = File::create(filename)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, saved)?;
    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?.flush()?;

    info!(
        "saved hierarchy for {}-{} ({} nodes) to {}",
        saved.file_id,
        saved.sheet_id,
        saved.tree.len(),
        filename.display()
    );
    Ok(())
}

pub fn load_hierarchy(filename: impl AsRef<Path>) -> Result<SavedHierarchy, PersistError> {
    let file = File::open(filename.as_ref())?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);

    let saved: SavedHierarchy = deserialize_from(&mut reader)?;

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = HierarchyTree::new();
        let stub = tree.children(tree.root())[0];
        let child = tree.add_child(stub).unwrap();

        let saved = SavedHierarchy {
            file_id: "f1".to_string(),
            sheet_id: "0".to_string(),
            tree,
        };
        let path = snapshot_path(dir.path().join("nested"), "f1", "0");
        save_hierarchy(&saved, &path).unwrap();

        let back = load_hierarchy(&path).unwrap();
        assert_eq!(back, saved);
        assert_eq!(back.tree.parent(child), Some(stub));
    }

    #[test]
    fn missing_snapshot_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_hierarchy(dir.path().join("nope.bin.gz")).unwrap_err();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
