use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docframe_frame::RawTable;
use docframe_shared::{DocFrameError, Result};

use crate::{PartitionDesc, PartitionIo};

/// In-memory adapter keyed by path. Tables are stored with their index;
/// `index_column` and `columns` are applied on load.
#[derive(Debug, Default)]
pub struct MemoryIo {
    tables: RefCell<BTreeMap<PathBuf, RawTable>>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, table: RawTable) {
        self.tables.borrow_mut().insert(path.into(), table);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<RawTable> {
        self.tables.borrow().get(path.as_ref()).cloned()
    }
}

impl PartitionIo for MemoryIo {
    fn load(&self, desc: &PartitionDesc) -> Result<(RawTable, PartitionDesc)> {
        let table = self.get(&desc.path).ok_or_else(|| {
            DocFrameError::invalid_reference(format!("no table stored at {}", desc.path.display()))
        })?;
        let table = match desc.index_column.as_deref() {
            Some(name) if table.has_column(name) => table.set_index_column(name)?,
            _ => table,
        };
        let table = if desc.columns.is_empty() {
            table
        } else {
            table.select(&desc.columns)?
        };
        let used = PartitionDesc {
            path: desc.path.clone(),
            index_column: desc.index_column.clone(),
            columns: table.column_names().map(str::to_string).collect(),
        };
        Ok((table, used))
    }

    fn save(&self, table: &RawTable, desc: &PartitionDesc) -> Result<()> {
        self.insert(desc.path.clone(), table.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
