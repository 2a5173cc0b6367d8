//! Relational merge (on columns) and join (on the index).
//!
//! Both sides are flattened with presence markers, paired by a polars
//! equi-join and redistributed into partitions.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use polars::prelude::JoinType;
use tracing::{info, instrument};

use docframe_shared::{DocFrameError, Result, Value};

use crate::colspec::{Colspec, PartitionKind};
use crate::columnar::{self, INDEX, Layout};
use crate::frame::{DocFrame, is_presence_column, presence_column};
use crate::table::{Column, RawTable};

/// Which unmatched rows a merge or join keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinHow {
    /// Matched rows only.
    #[default]
    Inner,
    /// Every left row.
    Left,
    /// Every right row, in right order.
    Right,
    /// Every row of both sides.
    Outer,
}

impl fmt::Display for JoinHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
        };
        f.write_str(s)
    }
}

/// Suffixes appended to overlapping non-key column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffixes {
    pub left: String,
    pub right: String,
}

impl Suffixes {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self::new("_x", "_y")
    }
}

enum Keys<'a> {
    Columns(&'a [&'a str]),
    Index,
}

impl DocFrame {
    /// Merge with `other` on the key columns `on`.
    ///
    /// Key columns appear once and take the left kind. Other overlapping
    /// names get the suffixes and keep the kind of the side they came from.
    /// The result has a fresh range index.
    #[instrument(skip_all, fields(%how, on = ?on))]
    pub fn merge(
        &self,
        other: &DocFrame,
        on: &[&str],
        how: JoinHow,
        suffixes: &Suffixes,
    ) -> Result<DocFrame> {
        if on.is_empty() {
            return Err(DocFrameError::ambiguous("merge needs at least one key column"));
        }
        for key in on {
            for (side, frame) in [("left", self), ("right", other)] {
                if frame.kind_of(key)? == PartitionKind::Parameters {
                    return Err(DocFrameError::ambiguous(format!(
                        "cannot merge on '{key}': it is a parameters column on the {side} side"
                    )));
                }
            }
        }
        relational(self, other, Keys::Columns(on), how, suffixes)
    }

    /// Join with `other` on the index labels. The result keeps the labels of
    /// the rows it was built from.
    #[instrument(skip_all, fields(%how))]
    pub fn join(&self, other: &DocFrame, how: JoinHow, suffixes: &Suffixes) -> Result<DocFrame> {
        relational(self, other, Keys::Index, how, suffixes)
    }
}

/// Non-parameter columns, in partition order.
fn data_columns(frame: &DocFrame) -> Vec<&str> {
    frame
        .colspec
        .all_columns()
        .into_iter()
        .filter(|c| frame.colspec.kind_of(c) != Some(PartitionKind::Parameters))
        .collect()
}

/// `name`, suffixed when the other side also has it and it is not a key.
fn output_name(name: &str, keys: &HashSet<&str>, other: &HashSet<&str>, suffix: &str) -> String {
    if !keys.contains(name) && other.contains(name) {
        format!("{name}{suffix}")
    } else {
        name.to_string()
    }
}

/// Suffix keeping the right side's presence markers apart from the left's.
const RIGHT_MARKER: &str = "__right";

/// Flatten `frame` with its presence markers appended, renaming data
/// columns to their output names and markers by `marker_suffix`.
fn flatten_side(
    frame: &DocFrame,
    columns: &[&str],
    renames: &[(&str, String)],
    marker_suffix: &str,
) -> Result<RawTable> {
    let (mut table, markers) = frame.flatten_marked(&frame.index(), columns);
    for (from, to) in renames {
        table.rename_column(from, to.clone());
    }
    for marker in markers {
        table.push_column(format!("{}{marker_suffix}", marker.name), marker.values)?;
    }
    Ok(table)
}

/// One presence marker per kind: a joined row holds a real row of a kind
/// when either side it came from did.
fn merge_markers(table: &mut RawTable) -> Result<()> {
    let holds = |column: &Option<Column>, row: usize| {
        column.as_ref().and_then(|c| c.values.get(row)) == Some(&Value::Bool(true))
    };
    for kind in PartitionKind::INDEX_PRIORITY {
        let name = presence_column(kind);
        let left = table.drop_column(&name);
        let right = table.drop_column(&format!("{name}{RIGHT_MARKER}"));
        if left.is_none() && right.is_none() {
            continue;
        }
        let merged = (0..table.n_rows())
            .map(|row| Value::Bool(holds(&left, row) || holds(&right, row)))
            .collect();
        table.push_column(name, merged)?;
    }
    Ok(())
}

fn relational(
    left: &DocFrame,
    right: &DocFrame,
    keys: Keys<'_>,
    how: JoinHow,
    suffixes: &Suffixes,
) -> Result<DocFrame> {
    let key_names: HashSet<&str> = match &keys {
        Keys::Columns(on) => on.iter().copied().collect(),
        Keys::Index => HashSet::new(),
    };
    let left_cols = data_columns(left);
    let right_cols = data_columns(right);
    let left_names: HashSet<&str> = left.columns().into_iter().collect();
    let right_names: HashSet<&str> = right.columns().into_iter().collect();

    let mut colspec = Colspec::new();
    let mut output: Vec<String> = Vec::new();
    let mut left_renames = Vec::new();
    for &column in &left_cols {
        let name = output_name(column, &key_names, &right_names, &suffixes.left);
        colspec.insert(left.kind_of(column)?, name.clone())?;
        output.push(name.clone());
        left_renames.push((column, name));
    }
    let mut right_renames = Vec::new();
    for column in right_cols.iter().copied().filter(|c| !key_names.contains(c)) {
        let name = output_name(column, &key_names, &left_names, &suffixes.right);
        colspec.insert(right.kind_of(column)?, name.clone())?;
        output.push(name.clone());
        right_renames.push((column, name));
    }

    let lt = flatten_side(left, &left_cols, &left_renames, "")?;
    let rt = flatten_side(right, &right_cols, &right_renames, RIGHT_MARKER)?;
    let layout = Layout::of(&[&lt, &rt]);
    let (on, index): (Vec<&str>, Option<&str>) = match keys {
        Keys::Columns(on) => (on.to_vec(), None),
        Keys::Index => (vec![INDEX], Some(INDEX)),
    };
    let lf = layout.to_frame(&lt, &bridged_names(&lt, index))?;
    let rf = layout.to_frame(&rt, &bridged_names(&rt, index))?;
    let joined = match how {
        JoinHow::Inner => columnar::ordered_join(lf, rf, &on, JoinType::Inner)?,
        JoinHow::Left => columnar::ordered_join(lf, rf, &on, JoinType::Left)?,
        JoinHow::Right => columnar::ordered_join(rf, lf, &on, JoinType::Left)?,
        JoinHow::Outer => columnar::ordered_join(lf, rf, &on, JoinType::Full)?,
    };

    let markers: Vec<&str> = lt
        .column_names()
        .chain(rt.column_names())
        .filter(|c| is_presence_column(c))
        .collect();
    let names: Vec<&str> = output.iter().map(String::as_str).chain(markers).collect();
    let mut table = layout.from_frame(&joined, index, &names)?;
    merge_markers(&mut table)?;

    let mut parameters = BTreeMap::new();
    for (frame, other, suffix) in [
        (left, &right_names, suffixes.left.as_str()),
        (right, &left_names, suffixes.right.as_str()),
    ] {
        for (name, value) in frame.parameters() {
            let name = output_name(name, &key_names, other, suffix);
            colspec.insert(PartitionKind::Parameters, name.clone())?;
            parameters.insert(name, value.clone());
        }
    }

    let joined = DocFrame::from_flat(&table, &colspec, parameters, &left.settings)?;
    info!(rows = table.n_rows(), columns = joined.colspec.len(), "frames joined");
    Ok(joined)
}

/// Columns a side sends to the engine: the index when joining on it, then
/// every flat column.
fn bridged_names<'a>(table: &'a RawTable, index: Option<&'a str>) -> Vec<&'a str> {
    index.into_iter().chain(table.column_names()).collect()
}
