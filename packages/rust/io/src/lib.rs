//! I/O adapters for DocFrame partitions.
//!
//! The engine owns no file format. An adapter implements [`PartitionIo`]:
//! given a [`PartitionDesc`] it loads a raw table (and reports the
//! description it actually used), and it persists a partition table back.
//!
//! Built-in adapters:
//! - [`JsonRecordsIo`]: a JSON array of row objects per file
//! - [`MemoryIo`]: tables kept in memory, keyed by path

mod json;
mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use docframe_frame::{DocFrame, PartitionKind, RawTable};
use docframe_shared::Result;

pub use json::JsonRecordsIo;
pub use memory::MemoryIo;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Where a partition lives and how it is shaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDesc {
    /// File (or key) holding the partition.
    pub path: PathBuf,
    /// Column carrying the index labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_column: Option<String>,
    /// Columns to keep on load; empty means all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl PartitionDesc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_index_column(mut self, name: impl Into<String>) -> Self {
        self.index_column = Some(name.into());
        self
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }
}

/// Loads and persists partition tables.
pub trait PartitionIo {
    /// Load a raw table. The returned description has the index column and
    /// the column list that were actually used.
    fn load(&self, desc: &PartitionDesc) -> Result<(RawTable, PartitionDesc)>;

    /// Persist `table`. The table's index is written under
    /// `desc.index_column` when one is named.
    fn save(&self, table: &RawTable, desc: &PartitionDesc) -> Result<()>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Frame persistence
// ---------------------------------------------------------------------------

/// Save every persisted partition (output and series output) of `frame`.
///
/// Each table is written with the index prepended as a column named after
/// the description's index column, or the frame's index setting. Kinds with
/// no description are skipped with a warning. Returns the written paths.
#[instrument(skip_all, fields(adapter = io.name()))]
pub fn save_frame(
    frame: &DocFrame,
    io: &dyn PartitionIo,
    descs: &BTreeMap<PartitionKind, PartitionDesc>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (kind, mut table) in frame.persisted_partitions()? {
        let Some(desc) = descs.get(&kind) else {
            warn!(%kind, "no destination for persisted partition, skipping");
            continue;
        };
        let synthetic = &frame.settings().index_name;
        if let Some(name) = desc.index_column.as_deref().filter(|n| n != synthetic) {
            table.rename_column(synthetic, name);
        }
        io.save(&table, desc)?;
        info!(%kind, path = %desc.path.display(), rows = table.n_rows(), "partition saved");
        written.push(desc.path.clone());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use docframe_frame::Colspec;
    use docframe_shared::{FrameSettings, Value};

    use super::*;

    #[test]
    fn save_frame_writes_output_kinds_only() {
        let table = RawTable::new(vec![Value::Int(0), Value::Int(1)])
            .with_column("A", [1, 2])
            .expect("A")
            .with_column("out", ["x", "y"])
            .expect("out")
            .with_column("tmp", [true, false])
            .expect("tmp");
        let spec = Colspec::new()
            .with(PartitionKind::Input, &["A"])
            .with(PartitionKind::Output, &["out"]);
        let frame = DocFrame::new(&table, &spec, &FrameSettings::default()).expect("frame");

        let io = MemoryIo::new();
        let descs = BTreeMap::from([
            (PartitionKind::Output, PartitionDesc::new("out.json").with_index_column("id")),
            (PartitionKind::SeriesOutput, PartitionDesc::new("series.json")),
        ]);
        let written = save_frame(&frame, &io, &descs).expect("save");
        assert_eq!(written, vec![PathBuf::from("out.json")]);

        let saved = io.get("out.json").expect("saved table");
        assert_eq!(saved.column_names().collect::<Vec<_>>(), vec!["id", "out"]);
        assert_eq!(saved.column("id").expect("id"), &[Value::Int(0), Value::Int(1)]);
        assert!(io.get("series.json").is_none());
    }
}
