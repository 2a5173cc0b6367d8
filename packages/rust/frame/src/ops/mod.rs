//! Structural operators.
//!
//! In-place operators (row/column add and drop, sorting) live here; the
//! operators that return a new frame are split by family:
//! - `join`: merge on columns and join on the index
//! - `concat`: vertical stacking
//! - `apply`: row-wise/element-wise transforms and row filtering

mod apply;
mod concat;
mod join;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, instrument};

use docframe_shared::{DocFrameError, Result, Value};

use crate::accessor::Assign;
use crate::colspec::PartitionKind;
use crate::frame::DocFrame;
use crate::partition::uniform_value;
use crate::table::RawTable;

pub use join::{JoinHow, Suffixes};

impl DocFrame {
    /// Append a row to the `kind` partition.
    ///
    /// Input and parameters partitions never take rows. A unique-index kind
    /// refuses a label it already holds; series kinds always append. Columns
    /// of `kind` missing from `values` are `Null`.
    #[instrument(skip_all, fields(%kind))]
    pub fn add_row(
        &mut self,
        kind: PartitionKind,
        index: impl Into<Value>,
        values: BTreeMap<String, Value>,
    ) -> Result<()> {
        let index = index.into();
        match kind {
            PartitionKind::Input => {
                return Err(DocFrameError::immutable(format!("<row {index}>"), kind));
            }
            PartitionKind::Parameters => {
                return Err(DocFrameError::ambiguous(
                    "parameters hold a single table-wide row; set the values instead",
                ));
            }
            _ => {}
        }
        if let Some(stray) = values
            .keys()
            .find(|c| self.colspec.kind_of(c) != Some(kind))
        {
            return Err(DocFrameError::invalid_reference(format!(
                "column '{stray}' is not a {kind} column"
            )));
        }

        if self.store.partition(kind).is_none() {
            self.store.put_partition(kind, RawTable::default());
        }
        let table = self
            .store
            .partition_mut(kind)
            .ok_or_else(|| DocFrameError::invalid_reference(format!("no {kind} partition")))?;
        if !kind.is_series() && table.contains_label(&index) {
            return Err(DocFrameError::consistency(format!(
                "index '{index}' already exists in the {kind} partition"
            )));
        }
        table.push_row(index.clone(), &values)?;
        debug!(%index, rows = table.n_rows(), "row added");
        Ok(())
    }

    /// Add a column to the `kind` partition.
    ///
    /// The name must be new to the whole frame. A parameters column takes a
    /// scalar (or a non-empty list of identical values); other kinds take one
    /// value per partition row, or a scalar broadcast. A partition that does
    /// not exist yet is created over the logical index.
    #[instrument(skip_all, fields(%kind, column = name))]
    pub fn add_column(
        &mut self,
        kind: PartitionKind,
        name: &str,
        values: impl Into<Assign>,
    ) -> Result<()> {
        if let Some(existing) = self.colspec.kind_of(name) {
            return Err(DocFrameError::consistency(format!(
                "column '{name}' already exists as {existing}"
            )));
        }
        let values = values.into();

        if kind == PartitionKind::Parameters {
            let supplied = match values {
                Assign::Scalar(v) => vec![v],
                Assign::Values(vs) if vs.is_empty() => {
                    return Err(DocFrameError::ambiguous(format!(
                        "no value supplied for parameters column '{name}'"
                    )));
                }
                Assign::Values(vs) => vs,
            };
            let scalar = uniform_value(name, &supplied)?;
            self.store.set_parameter(name, scalar);
        } else {
            if self.store.partition(kind).is_none() {
                self.store.put_partition(kind, RawTable::new(self.index()));
            }
            let table = self
                .store
                .partition_mut(kind)
                .ok_or_else(|| DocFrameError::invalid_reference(format!("no {kind} partition")))?;
            let cells = match values {
                Assign::Scalar(v) => vec![v; table.n_rows()],
                Assign::Values(vs) => vs,
            };
            table.push_column(name, cells)?;
        }

        self.colspec.insert(kind, name)
    }

    /// Remove a column, returning the kind that held it. A partition left
    /// without columns is removed too.
    #[instrument(skip_all, fields(column = name))]
    pub fn drop_column(&mut self, name: &str) -> Result<PartitionKind> {
        let kind = self.kind_of(name)?;
        if kind == PartitionKind::Parameters {
            self.store.remove_parameter(name);
        } else if let Some(table) = self.store.partition_mut(kind) {
            table.drop_column(name);
            if table.n_columns() == 0 {
                self.store.remove_partition(kind);
            }
        }
        self.colspec.remove(name);

        if self.focus.column.as_deref() == Some(name) {
            self.focus.column = None;
        }
        if self.focus.selector.as_deref() == Some(name) {
            self.focus.selector = None;
            self.focus.subindex = None;
        }
        debug!(%kind, "column dropped");
        Ok(kind)
    }

    /// Sort every partition by index label, in place. Series rows sharing a
    /// label keep their relative order.
    #[instrument(skip_all)]
    pub fn sort_index(&mut self) -> Result<()> {
        for table in self.store.partitions_mut() {
            table.sort_by_index()?;
        }
        Ok(())
    }

    /// New frame restricted to `labels`. Parameters are kept.
    pub fn select_index(&self, labels: &[Value]) -> Result<DocFrame> {
        for label in labels {
            self.require_label(label)?;
        }
        let wanted: HashSet<&Value> = labels.iter().collect();

        let mut out = self.clone();
        out.focus = Default::default();
        for table in out.store.partitions_mut() {
            let keep: Vec<bool> = table.index().iter().map(|l| wanted.contains(l)).collect();
            *table = table.filter_rows(&keep)?;
        }
        Ok(out)
    }
}
