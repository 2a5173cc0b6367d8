//! Partition store: distributes a flat table into per-kind partitions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use tracing::{debug, instrument, warn};

use docframe_shared::{DocFrameError, Result, Value};

use crate::colspec::{Colspec, PartitionKind};
use crate::table::RawTable;

/// Physical storage of a frame: one table per non-parameter kind plus the
/// table-wide parameter scalars.
#[derive(Debug, Clone, Default)]
pub struct PartitionStore {
    partitions: BTreeMap<PartitionKind, RawTable>,
    parameters: BTreeMap<String, Value>,
    /// Cached [`PartitionStore::logical_index`], reset whenever a partition
    /// is handed out mutably or replaced.
    logical: OnceLock<Vec<Value>>,
}

impl PartialEq for PartitionStore {
    fn eq(&self, other: &Self) -> bool {
        self.partitions == other.partitions && self.parameters == other.parameters
    }
}

impl Eq for PartitionStore {}

impl PartitionStore {
    /// Split `table` into partitions according to `colspec`.
    ///
    /// Returns the store together with the completed colspec: columns the
    /// colspec does not mention are classified as [`PartitionKind::Cache`].
    /// Columns the colspec names but the table lacks are created empty.
    pub fn distribute(table: &RawTable, colspec: &Colspec) -> Result<(Self, Colspec)> {
        Self::distribute_masked(table, colspec, &BTreeMap::new())
    }

    /// [`PartitionStore::distribute`], where a partition kind with a mask
    /// only receives the flat rows its mask marks.
    #[instrument(skip_all, fields(rows = table.n_rows(), columns = table.n_columns(), masked = masks.len()))]
    pub(crate) fn distribute_masked(
        table: &RawTable,
        colspec: &Colspec,
        masks: &BTreeMap<PartitionKind, Vec<bool>>,
    ) -> Result<(Self, Colspec)> {
        colspec.validate()?;

        let mut colspec = colspec.clone();
        for name in table.column_names() {
            if !colspec.contains(name) {
                debug!(column = name, "unclassified column defaults to cache");
                colspec.insert(PartitionKind::Cache, name)?;
            }
        }

        let mut store = Self::default();
        for (kind, columns) in colspec.iter() {
            let mut projected = project(table, kind, columns);
            if let Some(mask) = masks.get(&kind) {
                projected = projected.filter_rows(mask)?;
            }
            match kind {
                PartitionKind::Parameters => {
                    for name in columns {
                        let values = projected.column(name).unwrap_or_default();
                        let scalar = uniform_value(name, values)?;
                        store.parameters.insert(name.clone(), scalar);
                    }
                }
                PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
                    store.partitions.insert(kind, projected);
                }
                PartitionKind::Input | PartitionKind::Output | PartitionKind::Cache => {
                    store.partitions.insert(kind, dedup_first(projected, kind)?);
                }
            }
        }

        Ok((store, colspec))
    }

    /// Assemble a store from already-distributed parts.
    pub(crate) fn from_parts(
        partitions: BTreeMap<PartitionKind, RawTable>,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            partitions,
            parameters,
            logical: OnceLock::new(),
        }
    }

    pub fn partition(&self, kind: PartitionKind) -> Option<&RawTable> {
        self.partitions.get(&kind)
    }

    pub(crate) fn partition_mut(&mut self, kind: PartitionKind) -> Option<&mut RawTable> {
        self.logical.take();
        self.partitions.get_mut(&kind)
    }

    /// Insert or replace a whole partition.
    pub(crate) fn put_partition(&mut self, kind: PartitionKind, table: RawTable) {
        self.logical.take();
        self.partitions.insert(kind, table);
    }

    pub(crate) fn remove_partition(&mut self, kind: PartitionKind) -> Option<RawTable> {
        self.logical.take();
        self.partitions.remove(&kind)
    }

    /// Partitions in iteration order.
    pub fn partitions(&self) -> impl Iterator<Item = (PartitionKind, &RawTable)> {
        self.partitions.iter().map(|(k, t)| (*k, t))
    }

    pub(crate) fn partitions_mut(&mut self) -> impl Iterator<Item = &mut RawTable> {
        self.logical.take();
        self.partitions.values_mut()
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub(crate) fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.logical.take();
        self.parameters.insert(name.into(), value);
    }

    pub(crate) fn remove_parameter(&mut self, name: &str) -> Option<Value> {
        self.logical.take();
        self.parameters.remove(name)
    }

    /// Whether the store holds parameters and nothing else, in which case
    /// its logical index is the single label `0`.
    pub(crate) fn is_parameters_only(&self) -> bool {
        self.partitions.is_empty() && !self.parameters.is_empty()
    }

    /// The logical index: the union of the distinct labels of every
    /// partition, ordered by kind priority (input, output, cache, series
    /// output, series cache) and then by first appearance.
    ///
    /// A label held by any partition is a logical row, even when the input
    /// partition lacks it: rows added to output or cache extend the frame,
    /// and cells of the other kinds read as missing there. A
    /// parameters-only store has the single label `0`.
    pub fn logical_index(&self) -> &[Value] {
        self.logical.get_or_init(|| {
            let mut seen = HashSet::new();
            let mut index = Vec::new();
            for kind in PartitionKind::INDEX_PRIORITY {
                if let Some(table) = self.partitions.get(&kind) {
                    for label in table.index() {
                        if seen.insert(label) {
                            index.push(label.clone());
                        }
                    }
                }
            }
            if index.is_empty() && self.is_parameters_only() {
                index.push(Value::Int(0));
            }
            index
        })
    }
}

/// Project `columns` out of `table`; columns the table lacks come back `Null`.
fn project(table: &RawTable, kind: PartitionKind, columns: &[String]) -> RawTable {
    let mut out = RawTable::new(table.index().to_vec());
    for name in columns {
        let values = match table.column(name) {
            Some(values) => values.to_vec(),
            None => {
                warn!(column = %name, %kind, "expected column missing from source table, filling with nulls");
                vec![Value::Null; table.n_rows()]
            }
        };
        // Names are unique: the colspec was validated.
        if let Err(e) = out.push_column(name.clone(), values) {
            warn!(error = %e, "skipping column during projection");
        }
    }
    out
}

/// The single value of a parameters column, or a consistency error.
pub(crate) fn uniform_value(name: &str, values: &[Value]) -> Result<Value> {
    let Some(first) = values.first() else {
        return Ok(Value::Null);
    };
    if let Some(other) = values.iter().find(|v| *v != first) {
        return Err(DocFrameError::consistency(format!(
            "parameters column '{name}' is not uniform: found both '{first}' ({}) and '{other}' ({})",
            first.type_name(),
            other.type_name()
        )));
    }
    Ok(first.clone())
}

/// Keep the first row of every index label, warning when a dropped duplicate
/// carries different values.
pub(crate) fn dedup_first(table: RawTable, kind: PartitionKind) -> Result<RawTable> {
    if !table.has_duplicate_index() {
        return Ok(table);
    }

    let mut first: HashMap<&Value, usize> = HashMap::new();
    let mut keep = Vec::new();
    let mut dropped = 0usize;
    for (pos, label) in table.index().iter().enumerate() {
        match first.get(label) {
            None => {
                first.insert(label, pos);
                keep.push(pos);
            }
            Some(&kept) => {
                dropped += 1;
                if table.row(kept).map(|r| r.cells) != table.row(pos).map(|r| r.cells) {
                    warn!(
                        %kind,
                        index = %label,
                        "duplicated index carries differing values, keeping first occurrence"
                    );
                }
            }
        }
    }
    debug!(%kind, dropped, "removed duplicated index rows");
    table.take_rows(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> RawTable {
        RawTable::new(vec![Value::Int(0), Value::Int(1), Value::Int(1)])
            .with_column("A", [1, 2, 2])
            .expect("A")
            .with_column("S", ["x", "y", "z"])
            .expect("S")
            .with_column("E", [7, 7, 7])
            .expect("E")
            .with_column("free", [true, false, false])
            .expect("free")
    }

    fn spec() -> Colspec {
        Colspec::new()
            .with(PartitionKind::Input, &["A"])
            .with(PartitionKind::SeriesCache, &["S"])
            .with(PartitionKind::Parameters, &["E"])
    }

    #[test]
    fn distribute_classifies_every_column() {
        let (store, colspec) = PartitionStore::distribute(&flat(), &spec()).expect("distribute");
        assert_eq!(colspec.kind_of("free"), Some(PartitionKind::Cache));
        assert_eq!(store.parameter("E"), Some(&Value::Int(7)));
        assert_eq!(store.partition(PartitionKind::Input).expect("input").n_rows(), 2);
        assert_eq!(store.partition(PartitionKind::SeriesCache).expect("series").n_rows(), 3);
    }

    #[test]
    fn non_uniform_parameters_are_fatal() {
        let table = RawTable::with_range_index(2).with_column("E", [1, 2]).expect("E");
        let spec = Colspec::new().with(PartitionKind::Parameters, &["E"]);
        let err = PartitionStore::distribute(&table, &spec).unwrap_err();
        assert!(matches!(err, DocFrameError::Consistency { .. }));
    }

    #[test]
    fn uniform_missing_parameters_are_accepted() {
        let table = RawTable::with_range_index(3)
            .with_column("E", [Value::Null, Value::Null, Value::Null])
            .expect("E");
        let spec = Colspec::new().with(PartitionKind::Parameters, &["E"]);
        let (store, _) = PartitionStore::distribute(&table, &spec).expect("distribute");
        assert_eq!(store.parameter("E"), Some(&Value::Null));
    }

    #[test]
    fn duplicate_with_differing_values_keeps_first() {
        let table = RawTable::new(vec![Value::Int(0), Value::Int(0)])
            .with_column("A", [1, 2])
            .expect("A");
        let spec = Colspec::new().with(PartitionKind::Output, &["A"]);
        let (store, _) = PartitionStore::distribute(&table, &spec).expect("non-fatal");
        let output = store.partition(PartitionKind::Output).expect("output");
        assert_eq!(output.column("A").expect("A"), &[Value::Int(1)]);
    }

    #[test]
    fn missing_expected_column_is_created_empty() {
        let table = RawTable::with_range_index(2);
        let spec = Colspec::new().with(PartitionKind::Output, &["result"]);
        let (store, colspec) = PartitionStore::distribute(&table, &spec).expect("distribute");
        assert_eq!(colspec.kind_of("result"), Some(PartitionKind::Output));
        let output = store.partition(PartitionKind::Output).expect("output");
        assert_eq!(output.column("result").expect("result"), &[Value::Null, Value::Null]);
    }

    #[test]
    fn logical_index_follows_priority() {
        let (store, _) = PartitionStore::distribute(&flat(), &spec()).expect("distribute");
        assert_eq!(store.logical_index(), &[Value::Int(0), Value::Int(1)]);
    }

    #[test]
    fn parameters_only_has_synthetic_index() {
        let table = RawTable::with_range_index(4).with_column("E", [3, 3, 3, 3]).expect("E");
        let spec = Colspec::new().with(PartitionKind::Parameters, &["E"]);
        let (store, _) = PartitionStore::distribute(&table, &spec).expect("distribute");
        assert_eq!(store.logical_index(), &[Value::Int(0)]);
        assert!(store.is_parameters_only());
    }

    #[test]
    fn logical_index_is_the_union_of_partitions() {
        let (mut store, _) = PartitionStore::distribute(&flat(), &spec()).expect("distribute");
        assert_eq!(store.logical_index().len(), 2);

        let extra = RawTable::new(vec![Value::Int(5)]).with_column("out", [1]).expect("out");
        store.put_partition(PartitionKind::Output, extra);
        assert_eq!(
            store.logical_index(),
            &[Value::Int(0), Value::Int(1), Value::Int(5)]
        );
    }

    #[test]
    fn masks_keep_only_marked_rows() {
        let masks = BTreeMap::from([(PartitionKind::SeriesCache, vec![true, false, true])]);
        let (store, _) =
            PartitionStore::distribute_masked(&flat(), &spec(), &masks).expect("distribute");
        let series = store.partition(PartitionKind::SeriesCache).expect("series");
        assert_eq!(series.column("S").expect("S"), &[Value::from("x"), Value::from("z")]);
        assert_eq!(store.partition(PartitionKind::Input).expect("input").n_rows(), 2);
    }
}
