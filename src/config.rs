//! Application settings and the persisted column-mapping store.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::hierarchy::HierarchyTree;
use crate::pagination::PageLayout;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATA_DIR: &str = "database";
const MAPPINGS_FILE: &str = "mappings.json";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub addr: String,
    pub data_dir: PathBuf,
    pub title: String,
    pub layout: PageLayout,
    /// Page budget for pagination; defaults to the printable A4 height.
    pub page_height_px: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let layout = PageLayout::default();
        AppConfig {
            addr: DEFAULT_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            title: crate::report::REPORT_TITLE.to_string(),
            page_height_px: layout.content_height_px(),
            layout,
        }
    }
}

impl AppConfig {
    /// Reads `MATERIALEN_ADDR`, `MATERIALEN_DATA_DIR`, `MATERIALEN_TITLE` and
    /// `MATERIALEN_PAGE_HEIGHT_PX`; anything unset or invalid keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = AppConfig::default();
        if let Some(addr) = lookup("MATERIALEN_ADDR") {
            config.addr = addr;
        }
        if let Some(dir) = lookup("MATERIALEN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(title) = lookup("MATERIALEN_TITLE") {
            config.title = title;
        }
        if let Some(raw) = lookup("MATERIALEN_PAGE_HEIGHT_PX") {
            match raw.trim().parse::<f64>() {
                Ok(px) if px > 0.0 => config.page_height_px = px,
                _ => warn!(
                    "ignoring MATERIALEN_PAGE_HEIGHT_PX={:?}, using {:.0}px",
                    raw, config.page_height_px
                ),
            }
        }
        config
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.data_dir.join(MAPPINGS_FILE)
    }
}

/// Where a column hangs in the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ParentRef {
    /// Top-level column (`null`).
    Root,
    /// Child of another column.
    Column(usize),
    /// Not part of the hierarchy (`"ignore"`).
    Ignore,
}

impl TryFrom<Value> for ParentRef {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(ParentRef::Root),
            Value::String(s) if s == "ignore" => Ok(ParentRef::Ignore),
            Value::Number(n) => n
                .as_u64()
                .map(|n| ParentRef::Column(n as usize))
                .ok_or_else(|| ConfigError::InvalidParent(value.to_string())),
            // Browsers send object keys and sometimes values as strings.
            Value::String(s) => s
                .parse::<usize>()
                .map(ParentRef::Column)
                .map_err(|_| ConfigError::InvalidParent(value.to_string())),
            _ => Err(ConfigError::InvalidParent(value.to_string())),
        }
    }
}

impl From<ParentRef> for Value {
    fn from(parent: ParentRef) -> Self {
        match parent {
            ParentRef::Root => Value::Null,
            ParentRef::Column(c) => Value::from(c),
            ParentRef::Ignore => Value::from("ignore"),
        }
    }
}

/// Column index → parent reference for one sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping(pub BTreeMap<usize, ParentRef>);

impl ColumnMapping {
    /// Derives the mapping encoded by a tree: every bound column points at the
    /// column of its nearest bound ancestor; columns of the sheet that the tree
    /// does not use are ignored.
    pub fn from_tree(tree: &HierarchyTree, width: usize) -> Self {
        let mut map = BTreeMap::new();
        for id in tree.preorder() {
            let Some(col) = tree.node(id).and_then(|n| n.column_index()) else {
                continue;
            };
            let parent = tree
                .ancestors(id)
                .into_iter()
                .find_map(|a| tree.node(a).and_then(|n| n.column_index()))
                .map_or(ParentRef::Root, ParentRef::Column);
            map.entry(col).or_insert(parent);
        }
        for col in 0..width {
            map.entry(col).or_insert(ParentRef::Ignore);
        }
        ColumnMapping(map)
    }

    /// Hierarchy columns with their parents, parents always first.
    /// Columns whose parent chain is broken or cyclic are left out.
    pub fn column_chain(&self) -> Vec<(usize, ParentRef)> {
        let mut ordered: Vec<(usize, ParentRef)> = Vec::new();
        let mut frontier: Vec<ParentRef> = vec![ParentRef::Root];
        while let Some(parent) = frontier.first().copied() {
            frontier.remove(0);
            for (&col, &p) in &self.0 {
                if p == parent && !ordered.iter().any(|&(c, _)| c == col) {
                    ordered.push((col, p));
                    frontier.push(ParentRef::Column(col));
                }
            }
        }
        ordered
    }
}

/// Persisted mappings keyed by `"<fileId>-<sheetId>"`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappingStore {
    entries: BTreeMap<String, ColumnMapping>,
    path: Option<PathBuf>,
}

pub fn mapping_key(file_id: &str, sheet_id: &str) -> String {
    format!("{}-{}", file_id, sheet_id)
}

impl MappingStore {
    /// Opens the store at `path`; a missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let entries = if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            serde_json::from_reader(reader)?
        } else {
            BTreeMap::new()
        };
        Ok(MappingStore {
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Self {
        MappingStore::default()
    }

    pub fn get(&self, key: &str) -> Option<&ColumnMapping> {
        self.entries.get(key)
    }

    /// Stores `mapping` and writes the store through. A failed write is logged
    /// and returned; the in-memory entry is kept.
    pub fn put(&mut self, key: &str, mapping: ColumnMapping) -> Result<(), ConfigError> {
        self.entries.insert(key.to_string(), mapping);
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<ColumnMapping>, ConfigError> {
        let removed = self.entries.remove(key);
        self.save()?;
        Ok(removed)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let result = write_json(path, &self.entries);
        match &result {
            Ok(()) => info!("saved {} mapping(s) to {}", self.entries.len(), path.display()),
            Err(e) => warn!("could not save mappings to {}: {}", path.display(), e),
        }
        result
    }
}

fn write_json(path: &Path, entries: &BTreeMap<String, ColumnMapping>) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, entries)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_refs_use_json_shapes() {
        let mapping: ColumnMapping =
            serde_json::from_str(r#"{"0": null, "1": 0, "2": "1", "3": "ignore"}"#).unwrap();
        assert_eq!(mapping.0[&0], ParentRef::Root);
        assert_eq!(mapping.0[&1], ParentRef::Column(0));
        assert_eq!(mapping.0[&2], ParentRef::Column(1));
        assert_eq!(mapping.0[&3], ParentRef::Ignore);

        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(json, r#"{"0":null,"1":0,"2":1,"3":"ignore"}"#);
    }

    #[test]
    fn chain_orders_parents_first() {
        let mut map = BTreeMap::new();
        map.insert(2, ParentRef::Column(1));
        map.insert(1, ParentRef::Column(0));
        map.insert(0, ParentRef::Root);
        map.insert(3, ParentRef::Ignore);
        map.insert(4, ParentRef::Column(9));
        let chain = ColumnMapping(map).column_chain();
        let cols: Vec<usize> = chain.iter().map(|&(c, _)| c).collect();
        assert_eq!(cols, vec![0, 1, 2]);
    }

    #[test]
    fn env_lookup_falls_back_on_bad_numbers() {
        let config = AppConfig::from_lookup(|key| match key {
            "MATERIALEN_ADDR" => Some("0.0.0.0:8080".to_string()),
            "MATERIALEN_PAGE_HEIGHT_PX" => Some("abc".to_string()),
            _ => None,
        });
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.page_height_px, AppConfig::default().page_height_px);
    }
}
