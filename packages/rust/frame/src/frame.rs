//! The composite frame: one logical table over several typed partitions.

use std::collections::BTreeMap;

use polars::prelude::JoinType;
use tracing::{debug, info, instrument, warn};

use docframe_shared::{DocFrameError, FrameSettings, Result, SeriesWritePolicy, Value};

use crate::colspec::{Colspec, PartitionKind};
use crate::columnar::{self, INDEX, Layout};
use crate::cursor::FocusCursor;
use crate::partition::{PartitionStore, dedup_first, uniform_value};
use crate::table::{Column, RawTable};

/// A composite table backed by per-kind partitions.
///
/// A frame owns its partitions and its focus cursor. Structural operators
/// return new frames; row/column addition, sorting and cursor setters mutate
/// in place. A frame is not synchronized: callers sharing one across threads
/// wrap it in a `Mutex` at frame granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFrame {
    pub(crate) store: PartitionStore,
    pub(crate) colspec: Colspec,
    pub(crate) focus: FocusCursor,
    pub(crate) settings: FrameSettings,
}

/// Hidden flat column marking which flat rows hold a real row of `kind`.
///
/// Flattening pads every label to its deepest series group; rebuilding a
/// frame from a flat table carrying these markers keeps, per kind, only the
/// marked rows, so padding never turns into partition rows.
pub(crate) fn presence_column(kind: PartitionKind) -> String {
    format!("{PRESENCE_PREFIX}{kind}")
}

const PRESENCE_PREFIX: &str = "__present_";

pub(crate) fn is_presence_column(name: &str) -> bool {
    name.starts_with(PRESENCE_PREFIX)
}

/// Where a column's cells come from when flattening.
#[derive(Debug, Clone, Copy)]
enum Source {
    Parameter,
    Unique(usize),
    Series(usize),
}

impl DocFrame {
    /// Build a frame by distributing `table` according to `colspec`.
    ///
    /// Columns the colspec does not name land in the cache partition. Fails
    /// when a column is claimed by two kinds or a parameters column holds more
    /// than one distinct value.
    #[instrument(skip_all, fields(rows = table.n_rows(), columns = table.n_columns()))]
    pub fn new(table: &RawTable, colspec: &Colspec, settings: &FrameSettings) -> Result<Self> {
        let (store, colspec) = PartitionStore::distribute(table, colspec)?;
        let frame = Self {
            store,
            colspec,
            focus: FocusCursor::default(),
            settings: settings.clone(),
        };
        debug!(
            logical_rows = frame.len(),
            kinds = frame.colspec.iter().count(),
            "frame constructed"
        );
        Ok(frame)
    }

    /// Build a frame from a flat table where `parameters` are supplied as
    /// scalars rather than columns. Parameter columns present in `table` are
    /// ignored in favour of the scalars; parameter order follows `colspec`.
    /// Presence markers in `table` (see [`DocFrame::flatten_marked`]) decide
    /// which flat rows each partition receives.
    pub(crate) fn from_flat(
        table: &RawTable,
        colspec: &Colspec,
        mut parameters: BTreeMap<String, Value>,
        settings: &FrameSettings,
    ) -> Result<Self> {
        let mut data = table.clone();
        let mut data_spec = colspec.clone();
        for name in parameters.keys() {
            data.drop_column(name);
            data_spec.remove(name);
        }
        let mut masks = BTreeMap::new();
        for kind in PartitionKind::INDEX_PRIORITY {
            if let Some(marker) = data.drop_column(&presence_column(kind)) {
                let mask = marker.values.iter().map(|v| *v == Value::Bool(true)).collect();
                masks.insert(kind, mask);
            }
        }

        let (mut store, mut spec) = PartitionStore::distribute_masked(&data, &data_spec, &masks)?;

        let ordered: Vec<String> = colspec
            .columns(PartitionKind::Parameters)
            .iter()
            .filter(|c| parameters.contains_key(*c))
            .cloned()
            .collect();
        for name in ordered {
            if let Some(value) = parameters.remove(&name) {
                spec.insert(PartitionKind::Parameters, name.clone())?;
                store.set_parameter(name, value);
            }
        }
        for (name, value) in parameters {
            spec.insert(PartitionKind::Parameters, name.clone())?;
            store.set_parameter(name, value);
        }

        Ok(Self {
            store,
            colspec: spec,
            focus: FocusCursor::default(),
            settings: settings.clone(),
        })
    }

    /// Compose this frame with a further partition of `kind`.
    ///
    /// Column names in `table` must be new to the frame. A unique-index
    /// partition is aligned with an existing one of the same kind on the
    /// index; an already populated series partition cannot be augmented.
    #[instrument(skip_all, fields(%kind, columns = table.n_columns()))]
    pub fn augment(mut self, kind: PartitionKind, table: &RawTable) -> Result<Self> {
        if let Some(clash) = table.column_names().find(|c| self.colspec.contains(c)) {
            return Err(DocFrameError::consistency(format!(
                "column '{clash}' already exists in the frame"
            )));
        }

        match kind {
            PartitionKind::Parameters => {
                for column in table.columns() {
                    let scalar = uniform_value(&column.name, &column.values)?;
                    self.store.set_parameter(column.name.clone(), scalar);
                }
            }
            PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
                if self.store.partition(kind).is_some() {
                    return Err(DocFrameError::ambiguous(format!(
                        "cannot augment the already populated {kind} partition"
                    )));
                }
                self.store.put_partition(kind, table.clone());
            }
            PartitionKind::Input | PartitionKind::Output | PartitionKind::Cache => {
                let incoming = dedup_first(table.clone(), kind)?;
                let merged = match self.store.remove_partition(kind) {
                    Some(existing) => align_on_index(&existing, &incoming)?,
                    None => incoming,
                };
                self.store.put_partition(kind, merged);
            }
        }

        for name in table.column_names() {
            self.colspec.insert(kind, name)?;
        }
        info!(%kind, columns = table.n_columns(), "frame augmented");
        Ok(self)
    }

    // -----------------------------------------------------------------------
    // Shape and metadata
    // -----------------------------------------------------------------------

    pub fn colspec(&self) -> &Colspec {
        &self.colspec
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        self.store.parameters()
    }

    /// Logical index labels, see [`PartitionStore::logical_index`].
    pub fn index(&self) -> Vec<Value> {
        self.store.logical_index().to_vec()
    }

    /// Number of logical rows (distinct index labels).
    pub fn len(&self) -> usize {
        self.store.logical_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in partition iteration order.
    pub fn columns(&self) -> Vec<&str> {
        self.colspec.all_columns()
    }

    /// Kind of `column`, or an invalid-reference error.
    pub fn kind_of(&self, column: &str) -> Result<PartitionKind> {
        self.colspec
            .kind_of(column)
            .ok_or_else(|| DocFrameError::invalid_reference(format!("unknown column '{column}'")))
    }

    pub(crate) fn contains_label(&self, label: &Value) -> bool {
        self.store
            .partitions()
            .any(|(_, table)| table.contains_label(label))
            || (label == &Value::Int(0) && self.store.is_parameters_only())
    }

    pub(crate) fn require_label(&self, label: &Value) -> Result<()> {
        if self.contains_label(label) {
            Ok(())
        } else {
            Err(DocFrameError::invalid_reference(format!(
                "index '{label}' does not exist"
            )))
        }
    }

    // -----------------------------------------------------------------------
    // Flattening
    // -----------------------------------------------------------------------

    /// Flatten every partition into one table.
    ///
    /// Each logical label yields as many rows as its longest series group
    /// (at least one); row `k` takes the `k`-th series row of every series
    /// partition, padding with `Null`. Parameters are broadcast.
    pub fn to_table(&self) -> RawTable {
        let columns = self.columns();
        self.flatten(&self.index(), &columns)
    }

    /// Flatten `columns` for the given logical `labels`.
    pub(crate) fn flatten(&self, labels: &[Value], columns: &[&str]) -> RawTable {
        self.flatten_with(labels, columns, false).0
    }

    /// [`DocFrame::flatten`] plus one presence marker per partition kind the
    /// columns draw on, named by [`presence_column`].
    pub(crate) fn flatten_marked(
        &self,
        labels: &[Value],
        columns: &[&str],
    ) -> (RawTable, Vec<Column>) {
        self.flatten_with(labels, columns, true)
    }

    fn flatten_with(
        &self,
        labels: &[Value],
        columns: &[&str],
        marked: bool,
    ) -> (RawTable, Vec<Column>) {
        let mut series_kinds: Vec<PartitionKind> = Vec::new();
        let mut unique_kinds: Vec<PartitionKind> = Vec::new();
        let sources: Vec<Source> = columns
            .iter()
            .map(|c| match self.colspec.kind_of(c) {
                Some(PartitionKind::Parameters) | None => Source::Parameter,
                Some(kind) if kind.is_series() => {
                    let slot = series_kinds.iter().position(|k| *k == kind).unwrap_or_else(|| {
                        series_kinds.push(kind);
                        series_kinds.len() - 1
                    });
                    Source::Series(slot)
                }
                Some(kind) => {
                    let slot = unique_kinds.iter().position(|k| *k == kind).unwrap_or_else(|| {
                        unique_kinds.push(kind);
                        unique_kinds.len() - 1
                    });
                    Source::Unique(slot)
                }
            })
            .collect();
        let unique_tables: Vec<Option<&RawTable>> = unique_kinds
            .iter()
            .map(|kind| self.store.partition(*kind))
            .collect();
        let series_tables: Vec<Option<&RawTable>> = series_kinds
            .iter()
            .map(|kind| self.store.partition(*kind))
            .collect();

        let mut index = Vec::with_capacity(labels.len());
        let mut data: Vec<Vec<Value>> = vec![Vec::with_capacity(labels.len()); columns.len()];
        let mut unique_marks: Vec<Vec<Value>> = vec![Vec::new(); unique_kinds.len()];
        let mut series_marks: Vec<Vec<Value>> = vec![Vec::new(); series_kinds.len()];
        for label in labels {
            let groups: Vec<&[usize]> = series_tables
                .iter()
                .map(|table| table.map(|t| t.positions_of(label)).unwrap_or_default())
                .collect();
            let depth = groups.iter().map(|g| g.len()).max().unwrap_or(0).max(1);
            let firsts: Vec<Option<usize>> = unique_tables
                .iter()
                .map(|table| table.and_then(|t| t.first_position(label)))
                .collect();
            for k in 0..depth {
                index.push(label.clone());
                for ((column, source), out) in columns.iter().zip(&sources).zip(&mut data) {
                    let value = match *source {
                        Source::Parameter => self.store.parameter(column).cloned(),
                        Source::Unique(slot) => firsts[slot]
                            .and_then(|pos| unique_tables[slot]?.get(pos, column))
                            .cloned(),
                        Source::Series(slot) => groups[slot]
                            .get(k)
                            .and_then(|&pos| series_tables[slot]?.get(pos, column))
                            .cloned(),
                    };
                    out.push(value.unwrap_or_default());
                }
                if marked {
                    for (marks, first) in unique_marks.iter_mut().zip(&firsts) {
                        marks.push(Value::Bool(first.is_some()));
                    }
                    for (marks, group) in series_marks.iter_mut().zip(&groups) {
                        marks.push(Value::Bool(k < group.len()));
                    }
                }
            }
        }

        let mut table = RawTable::new(index);
        for (name, values) in columns.iter().zip(data) {
            if let Err(e) = table.push_column(*name, values) {
                warn!(error = %e, "dropping column while flattening");
            }
        }
        let markers = if marked {
            unique_kinds
                .into_iter()
                .zip(unique_marks)
                .chain(series_kinds.into_iter().zip(series_marks))
                .map(|(kind, values)| Column {
                    name: presence_column(kind),
                    values,
                })
                .collect()
        } else {
            Vec::new()
        };
        (table, markers)
    }

    /// Persisted partitions (output and series output) with the index
    /// prepended as a regular column named after the frame's index setting.
    pub fn persisted_partitions(&self) -> Result<Vec<(PartitionKind, RawTable)>> {
        self.store
            .partitions()
            .filter(|(kind, _)| kind.is_persisted())
            .map(|(kind, table)| Ok((kind, table.with_index_column(&self.settings.index_name)?)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Cell access shared by the cursor and the accessors
    // -----------------------------------------------------------------------

    /// Physical rows of the `kind` series partition at `label`, optionally
    /// narrowed to rows whose `selector` column equals `subindex`.
    pub(crate) fn series_positions(
        &self,
        kind: PartitionKind,
        label: &Value,
        filter: Option<(&str, &Value)>,
    ) -> Result<Vec<usize>> {
        let Some(table) = self.store.partition(kind) else {
            return Ok(Vec::new());
        };
        let positions = table.positions_of(label);
        let Some((selector, subindex)) = filter else {
            return Ok(positions.to_vec());
        };
        let values = table.column(selector).ok_or_else(|| {
            DocFrameError::invalid_reference(format!(
                "selector '{selector}' is not a column of the {kind} partition"
            ))
        })?;
        Ok(positions
            .iter()
            .copied()
            .filter(|&pos| values.get(pos) == Some(subindex))
            .collect())
    }

    /// Read one cell. `Ok(None)` means no row exists for `label`.
    pub(crate) fn read_cell(
        &self,
        label: &Value,
        column: &str,
        filter: Option<(&str, &Value)>,
    ) -> Result<Option<Value>> {
        let kind = self.kind_of(column)?;
        match kind {
            PartitionKind::Parameters => Ok(self.store.parameter(column).cloned()),
            PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
                let matches = self.series_positions(kind, label, filter)?;
                if matches.len() > 1 {
                    debug!(
                        column,
                        index = %label,
                        matches = matches.len(),
                        "several series rows match, reading the last"
                    );
                }
                Ok(matches
                    .last()
                    .and_then(|&pos| self.store.partition(kind)?.get(pos, column))
                    .cloned())
            }
            PartitionKind::Input | PartitionKind::Output | PartitionKind::Cache => Ok(self
                .store
                .partition(kind)
                .and_then(|table| table.get(table.first_position(label)?, column))
                .cloned()),
        }
    }

    /// Write one cell, following the kind's mutability rules.
    pub(crate) fn write_cell(
        &mut self,
        label: &Value,
        column: &str,
        value: Value,
        filter: Option<(&str, &Value)>,
    ) -> Result<()> {
        let kind = self.kind_of(column)?;
        match kind {
            PartitionKind::Input => Err(DocFrameError::immutable(column, kind)),
            PartitionKind::Parameters => {
                self.store.set_parameter(column, value);
                Ok(())
            }
            PartitionKind::Output | PartitionKind::Cache => {
                let table = self.store.partition_mut(kind).ok_or_else(|| {
                    DocFrameError::invalid_reference(format!("no {kind} partition"))
                })?;
                let pos = table.first_position(label).ok_or_else(|| {
                    DocFrameError::invalid_reference(format!(
                        "no {kind} row at index '{label}'; add it with add_row first"
                    ))
                })?;
                table.set(pos, column, value)
            }
            PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
                self.write_series_cell(kind, label, column, value, filter)
            }
        }
    }

    fn write_series_cell(
        &mut self,
        kind: PartitionKind,
        label: &Value,
        column: &str,
        value: Value,
        filter: Option<(&str, &Value)>,
    ) -> Result<()> {
        let matches = self.series_positions(kind, label, filter)?;
        let policy = self.settings.series_write_policy;
        let table = self
            .store
            .partition_mut(kind)
            .ok_or_else(|| DocFrameError::invalid_reference(format!("no {kind} partition")))?;

        match matches.as_slice() {
            [] => {
                let mut cells = BTreeMap::new();
                if let Some((selector, subindex)) = filter {
                    cells.insert(selector.to_string(), subindex.clone());
                }
                cells.insert(column.to_string(), value);
                debug!(column, index = %label, "no series row matches, appending one");
                table.push_row(label.clone(), &cells)
            }
            [pos] => table.set(*pos, column, value),
            [.., last] => match policy {
                SeriesWritePolicy::LastMatch => {
                    warn!(
                        column,
                        index = %label,
                        matches = matches.len(),
                        "several series rows match, updating only the last"
                    );
                    table.set(*last, column, value)
                }
                SeriesWritePolicy::AllMatches => {
                    for pos in &matches {
                        table.set(*pos, column, value.clone())?;
                    }
                    Ok(())
                }
                SeriesWritePolicy::Reject => Err(DocFrameError::ambiguous(format!(
                    "{} series rows match column '{column}' at index '{label}'; set a selector and subindex",
                    matches.len()
                ))),
            },
        }
    }
}

/// Outer-align two unique-index tables on their index. Labels of `left` come
/// first, then labels only `right` has.
fn align_on_index(left: &RawTable, right: &RawTable) -> Result<RawTable> {
    let layout = Layout::of(&[left, right]);
    let joined = columnar::ordered_join(
        layout.frame_of(left)?,
        layout.frame_of(right)?,
        &[INDEX],
        JoinType::Full,
    )?;
    let names: Vec<&str> = left.column_names().chain(right.column_names()).collect();
    layout.from_frame(&joined, Some(INDEX), &names)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn settings() -> FrameSettings {
        FrameSettings::default()
    }

    fn flat() -> RawTable {
        RawTable::new(vec![Value::Int(0), Value::Int(0), Value::Int(1)])
            .with_column("A", [10, 10, 11])
            .expect("A")
            .with_column("lang", ["en", "fr", "en"])
            .expect("lang")
            .with_column("text", ["hello", "bonjour", "bye"])
            .expect("text")
            .with_column("E", [7, 7, 7])
            .expect("E")
    }

    fn spec() -> Colspec {
        Colspec::new()
            .with(PartitionKind::Input, &["A"])
            .with(PartitionKind::Parameters, &["E"])
            .with(PartitionKind::SeriesCache, &["lang", "text"])
    }

    #[test]
    fn flatten_roundtrip_is_identical() {
        let frame = DocFrame::new(&flat(), &spec(), &settings()).expect("frame");
        let table = frame.to_table();
        assert_eq!(table.index(), flat().index());

        let rebuilt = DocFrame::new(&table, frame.colspec(), &settings()).expect("rebuild");
        assert_eq!(rebuilt.to_table(), table);
        assert_eq!(rebuilt.colspec(), frame.colspec());
    }

    #[test]
    fn flat_column_order_follows_partitions() {
        let frame = DocFrame::new(&flat(), &spec(), &settings()).expect("frame");
        assert_eq!(frame.columns(), vec!["A", "E", "lang", "text"]);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn series_partition_keeps_duplicates() {
        let frame = DocFrame::new(&flat(), &spec(), &settings()).expect("frame");
        let series = frame.store().partition(PartitionKind::SeriesCache).expect("series");
        assert_eq!(series.n_rows(), 3);
        let input = frame.store().partition(PartitionKind::Input).expect("input");
        assert!(!input.has_duplicate_index());
    }

    #[test]
    fn augment_aligns_unique_partitions() {
        let frame = DocFrame::new(&flat(), &spec(), &settings()).expect("frame");
        let extra = RawTable::new(vec![Value::Int(1), Value::Int(2)])
            .with_column("B", ["b1", "b2"])
            .expect("B");
        let frame = frame.augment(PartitionKind::Input, &extra).expect("augment");

        assert_eq!(frame.colspec().kind_of("B"), Some(PartitionKind::Input));
        assert_eq!(frame.index(), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
        let input = frame.store().partition(PartitionKind::Input).expect("input");
        assert_eq!(input.column("A").expect("A"), &[Value::Int(10), Value::Int(11), Value::Null]);
    }

    #[test]
    fn flatten_marks_padding_rows() {
        let extra = RawTable::new(vec![Value::Int(2)]).with_column("B", ["b2"]).expect("B");
        let frame = DocFrame::new(&flat(), &spec(), &settings())
            .expect("frame")
            .augment(PartitionKind::Input, &extra)
            .expect("augment");
        let columns = frame.columns();
        let (table, markers) = frame.flatten_marked(&frame.index(), &columns);
        assert_eq!(table.n_rows(), 4);

        let marks = |kind| {
            markers
                .iter()
                .find(|m| m.name == presence_column(kind))
                .map(|m| m.values.clone())
                .expect("marker")
        };
        assert_eq!(marks(PartitionKind::Input), vec![Value::Bool(true); 4]);
        assert_eq!(
            marks(PartitionKind::SeriesCache),
            [true, true, true, false].map(Value::Bool)
        );
    }

    #[test]
    fn from_flat_drops_unmarked_rows() {
        let extra = RawTable::new(vec![Value::Int(2)]).with_column("B", ["b2"]).expect("B");
        let frame = DocFrame::new(&flat(), &spec(), &settings())
            .expect("frame")
            .augment(PartitionKind::Input, &extra)
            .expect("augment");
        let columns = frame.columns();
        let (mut table, markers) = frame.flatten_marked(&frame.index(), &columns);
        for marker in markers {
            table.push_column(marker.name, marker.values).expect("marker");
        }

        let rebuilt =
            DocFrame::from_flat(&table, frame.colspec(), frame.parameters().clone(), &settings())
                .expect("rebuild");
        assert_eq!(rebuilt.colspec(), frame.colspec());
        let series = rebuilt.store().partition(PartitionKind::SeriesCache).expect("series");
        assert_eq!(series.n_rows(), 3);
        assert!(!series.contains_label(&Value::Int(2)));
        assert_eq!(rebuilt.to_table(), frame.to_table());
    }

    #[test]
    fn augment_rejects_existing_columns() {
        let frame = DocFrame::new(&flat(), &spec(), &settings()).expect("frame");
        let extra = RawTable::with_range_index(1).with_column("A", [1]).expect("A");
        assert!(frame.augment(PartitionKind::Cache, &extra).is_err());
    }

    #[test]
    fn persisted_partitions_carry_index_column() {
        let table = RawTable::new(vec![Value::from("a"), Value::from("b")])
            .with_column("out", [1, 2])
            .expect("out");
        let spec = Colspec::new().with(PartitionKind::Output, &["out"]);
        let frame = DocFrame::new(&table, &spec, &settings()).expect("frame");

        let saved = frame.persisted_partitions().expect("payloads");
        assert_eq!(saved.len(), 1);
        let (kind, payload) = &saved[0];
        assert_eq!(*kind, PartitionKind::Output);
        assert_eq!(payload.column_names().collect::<Vec<_>>(), vec!["index", "out"]);
    }
}
