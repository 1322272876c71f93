/*!
# Materialenlijst

Builds a materials list from a planning workbook: the columns of a sheet are
arranged into a hierarchy (Blok → Week → Les → Werkblad), repeated structure
is kept in sync through templates, and the result is printed as paginated A4
pages.

## Architecture

### Hierarchy engine
- **Row resolver** - Forward-fills merged cells and answers "which distinct
  values does column X have under this ancestor chain?"
- **Hierarchy tree** - Arena of nodes bound to sheet columns; edits are
  refused on read-only duplicates and destructive deletes need confirmation
- **Template classifier** - The first node of each column type becomes its
  template, every later one a duplicate
- **Replication** - Projects a template's column assignments onto every
  duplicate, resolving values from each duplicate's own context

### Print output
- **Pagination** - Measures real row heights on an offscreen surface and
  cuts pages greedily; a binary search gives a uniform rows-per-page estimate
- **List report** - Blok / Week / Materials rows rendered to HTML with
  handlebars
- **Exports** - Flattened CSV and XLSX downloads

### Persistence
- Column mappings in a JSON store keyed by file and sheet
- Tree snapshots with gzip compression and bincode serialization

## Modules

- **sheet**: Normalized raw sheet (headers and padded, trimmed rows)
- **loader**: Workbook import (xlsx, xls, ods, csv)
- **resolver**: Row context resolution and unique column values
- **hierarchy**: Hierarchy tree and its mutation operations
- **template**: Template / duplicate classification
- **replication**: Global replication engine
- **pagination**: Measurement-based page break engine
- **report**: List-template report and print HTML
- **downloader**: CSV and XLSX export
- **config**: Settings and the column mapping store
- **saving**: Snapshot persistence
- **session**: One sheet plus its hierarchy, with all-or-nothing edits
- **app**: HTTP routes (feature `web`)

## REST API Endpoints

- `/api/upload` - Caches an uploaded workbook
- `/api/sheet/{sheet}` - Selects a sheet and starts a session
- `/api/hierarchy/...` - Assign, add child/sibling, delete, layout
- `/api/mapping` - Reads or applies the column mapping
- `/preview` - Paginated print preview
- `/export/csv`, `/export/xlsx` - Downloads
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod hierarchy;
pub mod loader;
pub mod pagination;
pub mod replication;
pub mod report;
pub mod resolver;
pub mod saving;
pub mod session;
pub mod sheet;
pub mod template;

#[cfg(feature = "web")]
pub mod app;

pub use error::*;
pub use hierarchy::{HierarchyNode, HierarchyTree, LayoutMode, NodeId};
pub use sheet::RawSheet;
