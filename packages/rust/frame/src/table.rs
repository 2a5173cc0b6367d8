//! Flat, column-major table with a row index.
//!
//! [`RawTable`] is what collaborators hand to the engine and what the engine
//! hands back when a composite frame is flattened. Partitions are stored as
//! `RawTable`s too. Cells stay addressable in place for single-cell writes;
//! row selection, sorting and stacking go through polars (see
//! [`crate::columnar`]).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use polars::prelude::{BooleanChunked, IntoLazy, NewChunkedArray, SortMultipleOptions};

use docframe_shared::{DocFrameError, Result, Value};

use crate::columnar::{self, INDEX, Layout};

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// One row of a table, keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    /// Index label of the row.
    pub index: Value,
    /// Cells by column name.
    pub cells: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(index: impl Into<Value>) -> Self {
        Self {
            index: index.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Builder-style cell insertion.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }
}

/// A flat table: an index plus equally long columns.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    index: Vec<Value>,
    columns: Vec<Column>,
    /// Label to physical positions, built on the first lookup and kept in
    /// step by [`RawTable::push_row`].
    lookup: OnceLock<HashMap<Value, Vec<usize>>>,
}

impl PartialEq for RawTable {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.columns == other.columns
    }
}

impl Eq for RawTable {}

impl RawTable {
    /// Create a table with the given index and no columns.
    pub fn new(index: Vec<Value>) -> Self {
        Self {
            index,
            columns: Vec::new(),
            lookup: OnceLock::new(),
        }
    }

    /// Create a table indexed `0..n_rows`.
    pub fn with_range_index(n_rows: usize) -> Self {
        Self::new((0..n_rows).map(Value::from).collect())
    }

    /// Builder-style [`RawTable::push_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<Self> {
        self.push_column(name, values.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    /// Build a table from row-major cells.
    pub fn from_rows(index: Vec<Value>, columns: &[&str], rows: Vec<Vec<Value>>) -> Result<Self> {
        if index.len() != rows.len() {
            return Err(DocFrameError::consistency(format!(
                "{} index labels for {} rows",
                index.len(),
                rows.len()
            )));
        }
        let mut data: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); columns.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DocFrameError::consistency(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (slot, value) in data.iter_mut().zip(row) {
                slot.push(value);
            }
        }
        let mut table = Self::new(index);
        for (name, values) in columns.iter().zip(data) {
            table.push_column(*name, values)?;
        }
        Ok(table)
    }

    /// Build a table from [`Row`]s. Column order is first appearance; cells a
    /// row does not mention are `Null`.
    pub fn from_row_structs(rows: &[Row]) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            for name in row.cells.keys() {
                if seen.insert(name.clone()) {
                    order.push(name.clone());
                }
            }
        }
        let mut table = Self::new(rows.iter().map(|r| r.index.clone()).collect());
        table.columns = order
            .into_iter()
            .map(|name| Column {
                values: rows
                    .iter()
                    .map(|r| r.cells.get(&name).cloned().unwrap_or_default())
                    .collect(),
                name,
            })
            .collect();
        table
    }

    /// Append a column. Fails on a name clash or a length mismatch.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(DocFrameError::consistency(format!(
                "column '{name}' already exists"
            )));
        }
        if values.len() != self.index.len() {
            return Err(DocFrameError::consistency(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.index.len()
            )));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    /// Remove a column, returning it if it existed.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let pos = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(pos))
    }

    /// Rename a column in place. No-op when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) {
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == from) {
            col.name = to.into();
        }
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[Value] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.values)
    }

    /// Cell at physical row `row`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column)?.get(row)
    }

    /// Overwrite the cell at physical row `row`.
    pub(crate) fn set(&mut self, row: usize, column: &str, value: Value) -> Result<()> {
        let cell = self
            .column_mut(column)
            .and_then(|values| values.get_mut(row))
            .ok_or_else(|| {
                DocFrameError::invalid_reference(format!("no cell at row {row}, column '{column}'"))
            })?;
        *cell = value;
        Ok(())
    }

    /// Materialize physical row `row`.
    pub fn row(&self, row: usize) -> Option<Row> {
        let index = self.index.get(row)?.clone();
        let cells = self
            .columns
            .iter()
            .filter_map(|c| c.values.get(row).map(|v| (c.name.clone(), v.clone())))
            .collect();
        Some(Row { index, cells })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.n_rows()).filter_map(|i| self.row(i))
    }

    /// Append a row; missing cells are `Null`, unknown cells are an error.
    pub fn push_row(&mut self, index: Value, cells: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(unknown) = cells.keys().find(|name| !self.has_column(name)) {
            return Err(DocFrameError::invalid_reference(format!(
                "column '{unknown}' does not exist"
            )));
        }
        if let Some(lookup) = self.lookup.get_mut() {
            lookup.entry(index.clone()).or_default().push(self.index.len());
        }
        self.index.push(index);
        for col in &mut self.columns {
            col.values
                .push(cells.get(&col.name).cloned().unwrap_or_default());
        }
        Ok(())
    }

    fn lookup(&self) -> &HashMap<Value, Vec<usize>> {
        self.lookup.get_or_init(|| {
            let mut lookup: HashMap<Value, Vec<usize>> = HashMap::new();
            for (pos, label) in self.index.iter().enumerate() {
                lookup.entry(label.clone()).or_default().push(pos);
            }
            lookup
        })
    }

    /// Physical positions of every row labelled `label`, in order.
    pub fn positions_of(&self, label: &Value) -> &[usize] {
        self.lookup()
            .get(label)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First physical position of `label`.
    pub fn first_position(&self, label: &Value) -> Option<usize> {
        self.positions_of(label).first().copied()
    }

    pub fn contains_label(&self, label: &Value) -> bool {
        self.lookup().contains_key(label)
    }

    pub fn has_duplicate_index(&self) -> bool {
        self.lookup().len() != self.index.len()
    }

    /// Distinct labels in first-appearance order.
    pub fn unique_index(&self) -> Vec<Value> {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index
            .iter()
            .filter(|l| seen.insert(*l))
            .cloned()
            .collect()
    }

    /// New table with the given physical rows, in the given order. Fails on
    /// an out-of-bounds position.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Self> {
        let rows = columnar::gather_index(rows)?;
        columnar::transform(self, |df| df.take(&rows))
    }

    /// New table with the rows whose `mask` entry is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows() {
            return Err(DocFrameError::consistency(format!(
                "row mask has {} entries for {} rows",
                mask.len(),
                self.n_rows()
            )));
        }
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        columnar::transform(self, |df| df.filter(&mask))
    }

    /// New table holding only `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut out = Self::new(self.index.clone());
        for name in names {
            let name = name.as_ref();
            let values = self.column(name).ok_or_else(|| {
                DocFrameError::invalid_reference(format!("column '{name}' does not exist"))
            })?;
            out.push_column(name, values.to_vec())?;
        }
        Ok(out)
    }

    /// Stable sort of rows by index label.
    pub fn sort_by_index(&mut self) -> Result<()> {
        let layout = Layout::of(&[&*self]);
        let mut df = layout.frame_of(self)?;
        let keys = columnar::sort_keys(&mut df, INDEX, &self.index)?;
        let sorted = df
            .lazy()
            .sort_by_exprs(keys, SortMultipleOptions::default().with_maintain_order(true))
            .collect()?;
        let names: Vec<&str> = self.column_names().collect();
        *self = layout.from_frame(&sorted, Some(INDEX), &names)?;
        Ok(())
    }

    /// Stack tables vertically. Columns are the ordered union; gaps are `Null`.
    pub fn vstack(tables: &[&RawTable]) -> Result<Self> {
        let mut names: Vec<&str> = vec![INDEX];
        for table in tables {
            for name in table.column_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        let layout = Layout::of(tables);
        let mut frames = tables.iter().map(|t| layout.to_frame(t, &names));
        let Some(first) = frames.next() else {
            return Ok(Self::default());
        };
        let mut stacked = first?;
        for frame in frames {
            stacked.vstack_mut(&frame?)?;
        }
        layout.from_frame(&stacked, Some(INDEX), &names[1..])
    }

    /// Copy of this table with the index prepended as a regular column.
    pub fn with_index_column(&self, name: &str) -> Result<Self> {
        if self.has_column(name) {
            return Err(DocFrameError::ambiguous(format!(
                "index column '{name}' collides with a data column"
            )));
        }
        let mut out = Self::new(self.index.clone());
        out.columns.push(Column {
            name: name.to_string(),
            values: self.index.clone(),
        });
        out.columns.extend(self.columns.iter().cloned());
        Ok(out)
    }

    /// Promote column `name` to the index, removing it from the columns.
    pub fn set_index_column(mut self, name: &str) -> Result<Self> {
        let column = self.drop_column(name).ok_or_else(|| {
            DocFrameError::ambiguous(format!("index column '{name}' not found in table"))
        })?;
        self.index = column.values;
        self.lookup = OnceLock::new();
        Ok(self)
    }

    /// Replace the index with `0..n_rows`.
    pub fn reset_index(mut self) -> Self {
        self.index = (0..self.n_rows()).map(Value::from).collect();
        self.lookup = OnceLock::new();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawTable {
        RawTable::new(vec![Value::Int(2), Value::Int(0), Value::Int(2)])
            .with_column("a", [1, 2, 3])
            .expect("a")
            .with_column("b", ["x", "y", "z"])
            .expect("b")
    }

    #[test]
    fn push_column_rejects_length_mismatch() {
        let mut table = sample();
        let err = table.push_column("c", vec![Value::Null]).unwrap_err();
        assert!(err.to_string().contains("1 values for 3 rows"));
    }

    #[test]
    fn duplicate_index_detection() {
        let table = sample();
        assert!(table.has_duplicate_index());
        assert_eq!(table.unique_index(), vec![Value::Int(2), Value::Int(0)]);
        assert_eq!(table.positions_of(&Value::Int(2)), &[0, 2]);
        assert_eq!(table.first_position(&Value::Int(0)), Some(1));
        assert!(!table.contains_label(&Value::Int(1)));
    }

    #[test]
    fn sort_by_index_is_stable() {
        let mut table = sample();
        table.sort_by_index().expect("sort");
        assert_eq!(table.index(), &[Value::Int(0), Value::Int(2), Value::Int(2)]);
        assert_eq!(
            table.column("a").expect("a"),
            &[Value::Int(2), Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn vstack_fills_gaps_with_null() {
        let left = RawTable::with_range_index(1).with_column("a", [1]).expect("a");
        let right = RawTable::with_range_index(1).with_column("b", [2]).expect("b");
        let stacked = RawTable::vstack(&[&left, &right]).expect("vstack");
        assert_eq!(stacked.n_rows(), 2);
        assert_eq!(stacked.column("a").expect("a"), &[Value::Int(1), Value::Null]);
        assert_eq!(stacked.column("b").expect("b"), &[Value::Null, Value::Int(2)]);
    }

    #[test]
    fn sort_by_index_orders_mixed_labels_by_variant() {
        let mut table = RawTable::new(vec![
            Value::from("b"),
            Value::Float(0.5),
            Value::Int(10),
            Value::Null,
            Value::Int(2),
            Value::from("a"),
        ])
        .with_column("pos", [0, 1, 2, 3, 4, 5])
        .expect("pos");
        let mut expected = table.index().to_vec();
        expected.sort();

        table.sort_by_index().expect("sort");
        assert_eq!(table.index(), expected.as_slice());
        assert_eq!(
            table.column("pos").expect("pos"),
            &[3, 4, 2, 1, 5, 0].map(Value::from)
        );
    }

    #[test]
    fn take_and_filter_select_rows() {
        let table = sample();
        let taken = table.take_rows(&[2, 0]).expect("take");
        assert_eq!(taken.column("b").expect("b"), &[Value::from("z"), Value::from("x")]);
        assert!(table.take_rows(&[7]).is_err());

        let kept = table.filter_rows(&[false, true, true]).expect("filter");
        assert_eq!(kept.index(), &[Value::Int(0), Value::Int(2)]);
        assert!(table.filter_rows(&[true]).is_err());
    }

    #[test]
    fn push_row_keeps_label_lookup_current() {
        let mut table = sample();
        assert_eq!(table.positions_of(&Value::Int(0)), &[1]);
        table.push_row(Value::Int(0), &BTreeMap::new()).expect("push");
        assert_eq!(table.positions_of(&Value::Int(0)), &[1, 3]);
        assert!(table.has_duplicate_index());
    }

    #[test]
    fn index_column_roundtrip() {
        let table = sample();
        let flat = table.with_index_column("id").expect("prepend index");
        assert_eq!(flat.column_names().next(), Some("id"));
        let back = flat.set_index_column("id").expect("promote index");
        assert_eq!(back, table);
    }

    #[test]
    fn from_row_structs_unions_columns() {
        let rows = vec![
            Row::new(0).with("a", 1),
            Row::new(1).with("b", "x"),
        ];
        let table = RawTable::from_row_structs(&rows);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.get(1, "a"), Some(&Value::Null));
    }

    #[test]
    fn push_row_rejects_unknown_columns() {
        let mut table = sample();
        let cells = BTreeMap::from([("zzz".to_string(), Value::Int(1))]);
        assert!(table.push_row(Value::Int(9), &cells).is_err());
        assert_eq!(table.n_rows(), 3);
    }
}
