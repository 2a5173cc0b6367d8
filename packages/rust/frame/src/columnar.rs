//! Bridge between [`RawTable`] and polars `DataFrame`s.
//!
//! Set-based table operations (take, filter, sort, stack, join) run on
//! polars. Cells keep their exact [`Value`] variant across the bridge: a
//! column holding a single variant maps to the matching polars dtype, a
//! column mixing variants travels as tagged text.

use std::collections::BTreeMap;

use polars::prelude::*;

use docframe_shared::{DocFrameError, Result, Value};

use crate::table::RawTable;

/// Column carrying the row index inside a bridged frame.
pub(crate) const INDEX: &str = "__index";

/// Row-order columns added to each side of a join.
const LEFT_ROW: &str = "__left_row";
const RIGHT_ROW: &str = "__right_row";

/// Type of a bridged column, widened over every table crossing together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellType {
    /// Only nulls seen so far.
    Empty,
    Bool,
    Int,
    Float,
    Text,
    /// More than one variant: carried as tagged text.
    Mixed,
}

impl CellType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Text,
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, t) | (t, Self::Empty) => t,
            (a, b) if a == b => a,
            _ => Self::Mixed,
        }
    }

    fn infer(values: &[Value]) -> Self {
        values
            .iter()
            .fold(Self::Empty, |acc, v| acc.widen(Self::of(v)))
    }
}

/// Cell types of every column crossing the bridge together, so that key
/// columns and stacked columns share a dtype on both sides.
#[derive(Debug, Default)]
pub(crate) struct Layout {
    types: BTreeMap<String, CellType>,
}

impl Layout {
    /// Unified layout of `tables`. The index is laid out as [`INDEX`].
    pub(crate) fn of(tables: &[&RawTable]) -> Self {
        let mut layout = Self::default();
        for table in tables {
            layout.widen(INDEX, table.index());
            for column in table.columns() {
                layout.widen(&column.name, &column.values);
            }
        }
        layout
    }

    fn widen(&mut self, name: &str, values: &[Value]) {
        let seen = CellType::infer(values);
        let slot = self
            .types
            .entry(name.to_string())
            .or_insert(CellType::Empty);
        *slot = slot.widen(seen);
    }

    fn cell_type(&self, name: &str) -> CellType {
        self.types.get(name).copied().unwrap_or(CellType::Empty)
    }

    /// Frame holding `names` of `table`, in that order. [`INDEX`] stands for
    /// the row index; names the table lacks come out as typed nulls.
    pub(crate) fn to_frame(&self, table: &RawTable, names: &[&str]) -> Result<DataFrame> {
        let columns = names
            .iter()
            .map(|name| {
                let values = if *name == INDEX {
                    Some(table.index())
                } else {
                    table.column(name)
                };
                let series = match values {
                    Some(values) => self.series(name, values),
                    None => Series::full_null((*name).into(), table.n_rows(), &DataType::String),
                };
                Column::from(series)
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// Frame with the index followed by every column of `table`.
    pub(crate) fn frame_of(&self, table: &RawTable) -> Result<DataFrame> {
        let names: Vec<&str> = std::iter::once(INDEX).chain(table.column_names()).collect();
        self.to_frame(table, &names)
    }

    /// Read `names` back out of `df`. The index comes from the `index`
    /// column, or is `0..height` when `None`.
    pub(crate) fn from_frame(
        &self,
        df: &DataFrame,
        index: Option<&str>,
        names: &[&str],
    ) -> Result<RawTable> {
        let index = match index {
            Some(name) => self.decode(df, name)?,
            None => (0..df.height()).map(Value::from).collect(),
        };
        let mut table = RawTable::new(index);
        for name in names {
            table.push_column(*name, self.decode(df, name)?)?;
        }
        Ok(table)
    }

    fn series(&self, name: &str, values: &[Value]) -> Series {
        let name: PlSmallStr = name.into();
        match self.cell_type(name.as_str()) {
            CellType::Empty => Series::full_null(name, values.len(), &DataType::String),
            CellType::Bool => {
                let cells: Vec<Option<bool>> = values.iter().map(bool_of).collect();
                Series::new(name, cells)
            }
            CellType::Int => {
                let cells: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
                Series::new(name, cells)
            }
            CellType::Float => {
                let cells: Vec<Option<f64>> = values.iter().map(float_of).collect();
                Series::new(name, cells)
            }
            CellType::Text => {
                let cells: Vec<Option<&str>> = values.iter().map(Value::as_str).collect();
                Series::new(name, cells)
            }
            CellType::Mixed => {
                let cells: Vec<Option<String>> = values.iter().map(tag).collect();
                Series::new(name, cells)
            }
        }
    }

    fn decode(&self, df: &DataFrame, name: &str) -> Result<Vec<Value>> {
        let series = df.column(name)?.as_materialized_series();
        let values = match self.cell_type(name) {
            CellType::Empty => vec![Value::Null; series.len()],
            CellType::Bool => series
                .bool()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Bool))
                .collect(),
            CellType::Int => series
                .i64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Int))
                .collect(),
            CellType::Float => series
                .f64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Float))
                .collect(),
            CellType::Text => series
                .str()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, |s| Value::Str(s.to_string())))
                .collect(),
            CellType::Mixed => series
                .str()?
                .into_iter()
                .map(|v| v.map_or(Ok(Value::Null), untag))
                .collect::<Result<_>>()?,
        };
        Ok(values)
    }
}

/// Run `op` on `table` as a polars frame and read the result back with the
/// same columns.
pub(crate) fn transform<F>(table: &RawTable, op: F) -> Result<RawTable>
where
    F: FnOnce(DataFrame) -> PolarsResult<DataFrame>,
{
    let layout = Layout::of(&[table]);
    let out = op(layout.frame_of(table)?)?;
    let names: Vec<&str> = table.column_names().collect();
    layout.from_frame(&out, Some(INDEX), &names)
}

/// Row positions as a polars gather index.
pub(crate) fn gather_index(rows: &[usize]) -> Result<IdxCa> {
    let rows = rows
        .iter()
        .map(|&r| {
            IdxSize::try_from(r)
                .map_err(|_| DocFrameError::Engine(format!("row {r} exceeds the engine's row limit")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(IdxCa::from_vec("rows".into(), rows))
}

/// Sort keys reproducing the [`Value`] order on a column of any layout.
///
/// A single-type column sorts natively. A mixed column is ranked by
/// variant first, then by the typed key of that variant.
pub(crate) fn sort_keys(df: &mut DataFrame, name: &str, values: &[Value]) -> Result<Vec<Expr>> {
    if CellType::infer(values) != CellType::Mixed {
        return Ok(vec![col(name)]);
    }
    let ranks: Vec<i32> = values.iter().map(|v| i32::from(v.rank())).collect();
    let bools: Vec<Option<bool>> = values.iter().map(bool_of).collect();
    let ints: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
    let floats: Vec<Option<f64>> = values.iter().map(float_of).collect();
    let texts: Vec<Option<&str>> = values.iter().map(Value::as_str).collect();
    let keys = [
        Series::new("__rank".into(), ranks),
        Series::new("__bool".into(), bools),
        Series::new("__int".into(), ints),
        Series::new("__float".into(), floats),
        Series::new("__text".into(), texts),
    ];
    let mut exprs = Vec::with_capacity(keys.len());
    for series in keys {
        exprs.push(col(series.name().clone()));
        df.with_column(series)?;
    }
    Ok(exprs)
}

/// Equi-join `left` and `right` on `keys`, coalescing the key columns.
///
/// Rows come out in left order, each followed by its matches in right
/// order; unmatched right rows of a full join trail. Null keys never match.
pub(crate) fn ordered_join(
    left: DataFrame,
    right: DataFrame,
    keys: &[&str],
    how: JoinType,
) -> Result<DataFrame> {
    let left = with_row_order(left, LEFT_ROW)?;
    let right = with_row_order(right, RIGHT_ROW)?;
    let on: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let joined = left
        .lazy()
        .join(
            right.lazy(),
            on.clone(),
            on,
            JoinArgs::new(how).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .sort_by_exprs(
            [col(LEFT_ROW), col(RIGHT_ROW)],
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;
    Ok(joined)
}

fn with_row_order(mut df: DataFrame, name: &str) -> Result<DataFrame> {
    let height = i64::try_from(df.height())
        .map_err(|_| DocFrameError::Engine(format!("{} rows exceed the engine's row limit", df.height())))?;
    df.with_column(Series::new(name.into(), (0..height).collect::<Vec<i64>>()))?;
    Ok(df)
}

fn bool_of(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Tagged text of a cell in a mixed column. Floats keep their exact bits.
fn tag(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::Int(i) => Some(format!("i:{i}")),
        Value::Float(f) => Some(format!("f:{:016x}", f.to_bits())),
        Value::Str(s) => Some(format!("s:{s}")),
    }
}

fn untag(text: &str) -> Result<Value> {
    let malformed = || DocFrameError::Engine(format!("malformed mixed cell '{text}'"));
    let (variant, body) = text.split_once(':').ok_or_else(malformed)?;
    match variant {
        "b" => body.parse().map(Value::Bool).map_err(|_| malformed()),
        "i" => body.parse().map(Value::Int).map_err(|_| malformed()),
        "f" => u64::from_str_radix(body, 16)
            .map(|bits| Value::Float(f64::from_bits(bits)))
            .map_err(|_| malformed()),
        "s" => Ok(Value::Str(body.to_string())),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> RawTable {
        RawTable::new(vec![Value::Int(0), Value::from("b"), Value::Float(1.0)])
            .with_column("m", [Value::Int(1), Value::Float(1.0), Value::from("1")])
            .expect("m")
            .with_column("n", [Value::Null, Value::Int(2), Value::Null])
            .expect("n")
    }

    #[test]
    fn cell_types_widen_to_mixed() {
        assert_eq!(CellType::Empty.widen(CellType::Int), CellType::Int);
        assert_eq!(CellType::Int.widen(CellType::Int), CellType::Int);
        assert_eq!(CellType::Int.widen(CellType::Float), CellType::Mixed);
        assert_eq!(CellType::infer(&[Value::Null, Value::Null]), CellType::Empty);
    }

    #[test]
    fn mixed_columns_keep_their_variants() {
        let table = mixed();
        let layout = Layout::of(&[&table]);
        assert_eq!(layout.cell_type("m"), CellType::Mixed);
        assert_eq!(layout.cell_type(INDEX), CellType::Mixed);

        let df = layout.frame_of(&table).expect("to polars");
        assert_eq!(df.height(), 3);
        let back = layout
            .from_frame(&df, Some(INDEX), &["m", "n"])
            .expect("from polars");
        assert_eq!(back, table);
    }

    #[test]
    fn missing_columns_come_back_null() {
        let table = RawTable::with_range_index(2).with_column("a", [1, 2]).expect("a");
        let layout = Layout::of(&[&table]);
        let df = layout.to_frame(&table, &[INDEX, "a", "absent"]).expect("to polars");
        let back = layout
            .from_frame(&df, Some(INDEX), &["absent"])
            .expect("from polars");
        assert_eq!(back.column("absent").expect("absent"), &[Value::Null, Value::Null]);
    }

    #[test]
    fn malformed_mixed_cells_are_engine_errors() {
        assert!(matches!(untag("x:1"), Err(DocFrameError::Engine(_))));
        assert!(matches!(untag("no tag"), Err(DocFrameError::Engine(_))));
        assert_eq!(untag("s:a:b").expect("text"), Value::from("a:b"));
        let nan = untag(&tag(&Value::Float(f64::NAN)).expect("tag")).expect("float");
        assert!(matches!(nan, Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn ordered_join_keeps_left_order_then_unmatched_right() {
        let left = RawTable::new(vec![Value::Int(2), Value::Int(1)])
            .with_column("l", ["two", "one"])
            .expect("l");
        let right = RawTable::new(vec![Value::Int(3), Value::Int(1), Value::Int(1)])
            .with_column("r", ["c", "a", "b"])
            .expect("r");
        let layout = Layout::of(&[&left, &right]);
        let joined = ordered_join(
            layout.frame_of(&left).expect("left"),
            layout.frame_of(&right).expect("right"),
            &[INDEX],
            JoinType::Full,
        )
        .expect("join");
        let table = layout
            .from_frame(&joined, Some(INDEX), &["l", "r"])
            .expect("read back");
        assert_eq!(
            table.index(),
            &[Value::Int(2), Value::Int(1), Value::Int(1), Value::Int(3)]
        );
        assert_eq!(
            table.column("r").expect("r"),
            &[Value::Null, Value::from("a"), Value::from("b"), Value::from("c")]
        );
    }
}
