//! Label- and position-addressed views over a frame.
//!
//! Each accessor borrows its frame: `&DocFrame` for reads, `&mut DocFrame`
//! for writes. [`PositionAccessor`] only translates positions into labels and
//! forwards to [`RangeAccessor`].

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use docframe_shared::{DocFrameError, Result, Value};

use crate::colspec::PartitionKind;
use crate::frame::DocFrame;
use crate::partition::uniform_value;
use crate::table::RawTable;

/// Rows or columns picked by a range or position accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    All,
    Only(Vec<T>),
}

impl<T> From<Vec<T>> for Selection<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Only(items)
    }
}

/// Values to write through a range accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assign {
    /// One value broadcast to every selected cell.
    Scalar(Value),
    /// One value per selected cell, in selection order.
    Values(Vec<Value>),
}

impl Assign {
    fn expand(&self, n: usize, column: &str) -> Result<Vec<Value>> {
        match self {
            Self::Scalar(v) => Ok(vec![v.clone(); n]),
            Self::Values(values) if values.len() == n => Ok(values.clone()),
            Self::Values(values) => Err(DocFrameError::ambiguous(format!(
                "{} values supplied for {n} selected cells of column '{column}'",
                values.len()
            ))),
        }
    }
}

impl From<Value> for Assign {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<Value>> for Assign {
    fn from(values: Vec<Value>) -> Self {
        Self::Values(values)
    }
}

impl DocFrame {
    /// Scalar accessor for reads.
    pub fn at(&self) -> CellAccessor<&Self> {
        CellAccessor { frame: self }
    }

    /// Scalar accessor for writes.
    pub fn at_mut(&mut self) -> CellAccessor<&mut Self> {
        CellAccessor { frame: self }
    }

    /// Range accessor for reads.
    pub fn loc(&self) -> RangeAccessor<&Self> {
        RangeAccessor { frame: self }
    }

    /// Range accessor for writes.
    pub fn loc_mut(&mut self) -> RangeAccessor<&mut Self> {
        RangeAccessor { frame: self }
    }

    /// Position accessor for reads.
    pub fn iloc(&self) -> PositionAccessor<&Self> {
        PositionAccessor { frame: self }
    }

    /// Position accessor for writes.
    pub fn iloc_mut(&mut self) -> PositionAccessor<&mut Self> {
        PositionAccessor { frame: self }
    }
}

// ---------------------------------------------------------------------------
// CellAccessor
// ---------------------------------------------------------------------------

/// Single label pair → single value.
pub struct CellAccessor<F> {
    frame: F,
}

impl<F: Deref<Target = DocFrame>> CellAccessor<F> {
    /// Value at (`label`, `column`). Parameters return the table-wide scalar;
    /// a series column returns its last row at `label`.
    pub fn get(&self, label: impl Into<Value>, column: &str) -> Result<Option<Value>> {
        let label = label.into();
        self.frame.require_label(&label)?;
        self.frame.read_cell(&label, column, None)
    }
}

impl<F: DerefMut<Target = DocFrame>> CellAccessor<F> {
    /// Write (`label`, `column`). Input columns are rejected.
    pub fn set(
        &mut self,
        label: impl Into<Value>,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let label = label.into();
        self.frame.require_label(&label)?;
        self.frame.write_cell(&label, column, value.into(), None)
    }
}

// ---------------------------------------------------------------------------
// RangeAccessor
// ---------------------------------------------------------------------------

/// Row labels × column names → sub-table.
pub struct RangeAccessor<F> {
    frame: F,
}

/// One column's worth of a validated range write.
enum Plan {
    Parameter(String, Value),
    Cells(PartitionKind, String, Vec<(usize, Value)>),
}

impl<F: Deref<Target = DocFrame>> RangeAccessor<F> {
    /// Flattened sub-table for the selection. Parameters are broadcast into
    /// every selected row.
    pub fn get(&self, rows: &Selection<Value>, columns: &Selection<String>) -> Result<RawTable> {
        let labels = resolve_labels(&self.frame, rows)?;
        let names = resolve_columns(&self.frame, columns)?;
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Ok(self.frame.flatten(&labels, &names))
    }
}

impl<F: DerefMut<Target = DocFrame>> RangeAccessor<F> {
    /// Write `values` into every selected column.
    ///
    /// `values` applies to each selected column on its own: an
    /// [`Assign::Values`] list holds one value per selected cell of a single
    /// column and is written in full to every column of the selection.
    ///
    /// The whole write is validated before anything changes: input columns
    /// are rejected, output/cache rows must exist, and values written to a
    /// parameters column must all be identical. An empty list leaves a
    /// parameters column as it is.
    pub fn set(
        &mut self,
        rows: &Selection<Value>,
        columns: &Selection<String>,
        values: impl Into<Assign>,
    ) -> Result<()> {
        let values = values.into();
        let labels = resolve_labels(&self.frame, rows)?;
        let names = resolve_columns(&self.frame, columns)?;

        let mut plans = Vec::with_capacity(names.len());
        for name in &names {
            plans.extend(plan_column(&self.frame, &labels, name, &values)?);
        }

        for plan in plans {
            match plan {
                Plan::Parameter(name, value) => self.frame.store.set_parameter(name, value),
                Plan::Cells(kind, name, cells) => {
                    let table = self.frame.store.partition_mut(kind).ok_or_else(|| {
                        DocFrameError::invalid_reference(format!("no {kind} partition"))
                    })?;
                    for (pos, value) in cells {
                        table.set(pos, &name, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn resolve_labels(frame: &DocFrame, rows: &Selection<Value>) -> Result<Vec<Value>> {
    match rows {
        Selection::All => Ok(frame.index()),
        Selection::Only(labels) => {
            for label in labels {
                frame.require_label(label)?;
            }
            Ok(labels.clone())
        }
    }
}

fn resolve_columns(frame: &DocFrame, columns: &Selection<String>) -> Result<Vec<String>> {
    match columns {
        Selection::All => Ok(frame.columns().into_iter().map(str::to_string).collect()),
        Selection::Only(names) => {
            for name in names {
                frame.kind_of(name)?;
            }
            Ok(names.clone())
        }
    }
}

/// Validated write for one column; `None` when there is nothing to write.
fn plan_column(
    frame: &DocFrame,
    labels: &[Value],
    column: &str,
    values: &Assign,
) -> Result<Option<Plan>> {
    let kind = frame.kind_of(column)?;
    match kind {
        PartitionKind::Input => Err(DocFrameError::immutable(column, kind)),
        PartitionKind::Parameters => {
            let supplied = match values {
                Assign::Scalar(v) => std::slice::from_ref(v),
                Assign::Values(vs) => vs.as_slice(),
            };
            if supplied.is_empty() {
                return Ok(None);
            }
            let scalar = uniform_value(column, supplied)?;
            Ok(Some(Plan::Parameter(column.to_string(), scalar)))
        }
        PartitionKind::Output | PartitionKind::Cache => {
            let table = frame.store.partition(kind);
            let rows = labels
                .iter()
                .map(|label| {
                    table
                        .and_then(|t| t.first_position(label))
                        .ok_or_else(|| {
                            DocFrameError::invalid_reference(format!(
                                "no {kind} row at index '{label}'; add it with add_row first"
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let cells = values.expand(rows.len(), column)?;
            Ok(Some(Plan::Cells(
                kind,
                column.to_string(),
                rows.into_iter().zip(cells).collect(),
            )))
        }
        PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
            let mut rows: Vec<usize> = Vec::new();
            if let Some(table) = frame.store.partition(kind) {
                let mut seen = HashSet::new();
                for label in labels.iter().filter(|l| seen.insert(*l)) {
                    rows.extend_from_slice(table.positions_of(label));
                }
            }
            let cells = values.expand(rows.len(), column)?;
            Ok(Some(Plan::Cells(
                kind,
                column.to_string(),
                rows.into_iter().zip(cells).collect(),
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// PositionAccessor
// ---------------------------------------------------------------------------

/// Integer offsets → labels, forwarded to [`RangeAccessor`].
///
/// Row positions follow the logical index; column positions follow partition
/// iteration order.
pub struct PositionAccessor<F> {
    frame: F,
}

impl<F: Deref<Target = DocFrame>> PositionAccessor<F> {
    pub fn get(&self, rows: &Selection<usize>, columns: &Selection<usize>) -> Result<RawTable> {
        let (rows, columns) = translate(&self.frame, rows, columns)?;
        RangeAccessor { frame: &*self.frame }.get(&rows, &columns)
    }
}

impl<F: DerefMut<Target = DocFrame>> PositionAccessor<F> {
    pub fn set(
        &mut self,
        rows: &Selection<usize>,
        columns: &Selection<usize>,
        values: impl Into<Assign>,
    ) -> Result<()> {
        let (rows, columns) = translate(&self.frame, rows, columns)?;
        RangeAccessor {
            frame: &mut *self.frame,
        }
        .set(&rows, &columns, values)
    }
}

fn translate(
    frame: &DocFrame,
    rows: &Selection<usize>,
    columns: &Selection<usize>,
) -> Result<(Selection<Value>, Selection<String>)> {
    let rows = match rows {
        Selection::All => Selection::All,
        Selection::Only(positions) => {
            let index = frame.index();
            Selection::Only(pick(&index, positions, "row")?)
        }
    };
    let columns = match columns {
        Selection::All => Selection::All,
        Selection::Only(positions) => {
            let names: Vec<String> = frame.columns().into_iter().map(str::to_string).collect();
            Selection::Only(pick(&names, positions, "column")?)
        }
    };
    Ok((rows, columns))
}

fn pick<T: Clone>(items: &[T], positions: &[usize], what: &str) -> Result<Vec<T>> {
    positions
        .iter()
        .map(|&p| {
            items.get(p).cloned().ok_or_else(|| {
                DocFrameError::invalid_reference(format!(
                    "{what} position {p} is out of bounds ({} available)",
                    items.len()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use docframe_shared::FrameSettings;

    use super::*;
    use crate::colspec::Colspec;

    fn frame() -> DocFrame {
        let table = RawTable::new(vec![Value::Int(0), Value::Int(1), Value::Int(1)])
            .with_column("A", [1, 2, 2])
            .expect("A")
            .with_column("out", [Value::Null, Value::Null, Value::Null])
            .expect("out")
            .with_column("E", [7, 7, 7])
            .expect("E")
            .with_column("s", ["a", "b", "c"])
            .expect("s");
        let spec = Colspec::new()
            .with(PartitionKind::Input, &["A"])
            .with(PartitionKind::Output, &["out"])
            .with(PartitionKind::Parameters, &["E"])
            .with(PartitionKind::SeriesCache, &["s"]);
        DocFrame::new(&table, &spec, &FrameSettings::default()).expect("frame")
    }

    fn names(cols: &[&str]) -> Selection<String> {
        Selection::Only(cols.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn at_reads_parameters_and_rejects_input_writes() {
        let mut frame = frame();
        assert_eq!(frame.at().get(1, "E").expect("get"), Some(Value::Int(7)));
        assert_eq!(frame.at().get(1, "s").expect("get"), Some(Value::from("c")));

        let err = frame.at_mut().set(0, "A", 9).unwrap_err();
        assert!(matches!(err, DocFrameError::Immutable { .. }));
        frame.at_mut().set(0, "out", "ok").expect("output write");
        assert_eq!(frame.at().get(0, "out").expect("get"), Some(Value::from("ok")));
    }

    #[test]
    fn loc_broadcasts_parameters() {
        let frame = frame();
        let sub = frame
            .loc()
            .get(&Selection::Only(vec![Value::Int(1)]), &names(&["A", "E"]))
            .expect("loc");
        assert_eq!(sub.n_rows(), 1);
        assert_eq!(sub.column("E").expect("E"), &[Value::Int(7)]);
    }

    #[test]
    fn loc_expands_series_rows() {
        let frame = frame();
        let sub = frame.loc().get(&Selection::All, &names(&["A", "s"])).expect("loc");
        assert_eq!(sub.n_rows(), 3);
        assert_eq!(sub.column("A").expect("A"), &[Value::Int(1), Value::Int(2), Value::Int(2)]);
    }

    #[test]
    fn loc_parameter_write_requires_identical_values() {
        let mut frame = frame();
        let err = frame
            .loc_mut()
            .set(&Selection::All, &names(&["E"]), vec![Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, DocFrameError::Consistency { .. }));

        frame
            .loc_mut()
            .set(&Selection::All, &names(&["E"]), vec![Value::Int(3), Value::Int(3)])
            .expect("uniform write");
        assert_eq!(frame.parameters().get("E"), Some(&Value::Int(3)));
    }

    #[test]
    fn loc_empty_parameter_write_keeps_the_scalar() {
        let mut frame = frame();
        frame
            .loc_mut()
            .set(&Selection::Only(Vec::new()), &names(&["E"]), Vec::<Value>::new())
            .expect("nothing to write");
        assert_eq!(frame.parameters().get("E"), Some(&Value::Int(7)));
    }

    #[test]
    fn loc_values_apply_to_each_column() {
        let mut frame = frame();
        frame.add_column(PartitionKind::Cache, "c", Value::Null).expect("cache column");
        frame
            .loc_mut()
            .set(
                &Selection::All,
                &names(&["out", "c"]),
                vec![Value::Int(1), Value::Int(2)],
            )
            .expect("write");
        for column in ["out", "c"] {
            assert_eq!(frame.at().get(1, column).expect("get"), Some(Value::Int(2)));
        }
    }

    #[test]
    fn loc_write_is_all_or_nothing() {
        let mut frame = frame();
        let err = frame
            .loc_mut()
            .set(&Selection::All, &names(&["out", "A"]), Value::from("x"))
            .unwrap_err();
        assert!(matches!(err, DocFrameError::Immutable { .. }));
        assert_eq!(frame.at().get(0, "out").expect("get"), Some(Value::Null));
    }

    #[test]
    fn loc_series_write_covers_every_row() {
        let mut frame = frame();
        frame
            .loc_mut()
            .set(
                &Selection::Only(vec![Value::Int(1)]),
                &names(&["s"]),
                vec![Value::from("x"), Value::from("y")],
            )
            .expect("series write");
        let series = frame.store().partition(PartitionKind::SeriesCache).expect("series");
        assert_eq!(
            series.column("s").expect("s"),
            &[Value::from("a"), Value::from("x"), Value::from("y")]
        );
    }

    #[test]
    fn iloc_translates_positions() {
        let frame = frame();
        let sub = frame
            .iloc()
            .get(&Selection::Only(vec![1]), &Selection::Only(vec![0, 2]))
            .expect("iloc");
        assert_eq!(sub.column_names().collect::<Vec<_>>(), vec!["A", "E"]);
        assert_eq!(sub.index(), &[Value::Int(1)]);

        assert!(frame.iloc().get(&Selection::Only(vec![5]), &Selection::All).is_err());
    }

    #[test]
    fn iloc_rejects_input_writes() {
        let mut frame = frame();
        let err = frame
            .iloc_mut()
            .set(&Selection::All, &Selection::Only(vec![0]), Value::Int(0))
            .unwrap_err();
        assert!(matches!(err, DocFrameError::Immutable { .. }));

        frame
            .iloc_mut()
            .set(&Selection::Only(vec![0]), &Selection::Only(vec![1]), Value::from("z"))
            .expect("output write");
        assert_eq!(frame.at().get(0, "out").expect("get"), Some(Value::from("z")));
    }
}
