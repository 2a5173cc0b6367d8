//! Row-wise transforms, element-wise column maps and row filtering.
//!
//! `apply` and `filter` work on the flattened rows and rebuild partitions
//! from them; presence markers carried alongside keep series partitions at
//! the rows they really had.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use docframe_shared::{Result, Value};

use crate::colspec::PartitionKind;
use crate::frame::{DocFrame, presence_column};
use crate::partition::uniform_value;
use crate::table::{RawTable, Row};

impl DocFrame {
    /// Row-wise transform over the flattened rows.
    ///
    /// Columns the result keeps retain their kind, columns it drops leave the
    /// colspec, and new columns are classified as cache. A parameters column
    /// must stay uniform across the result; over zero rows it keeps its
    /// scalar. When new columns appear the cache partition covers every row.
    #[instrument(skip_all)]
    pub fn apply<F>(&self, mut f: F) -> Result<DocFrame>
    where
        F: FnMut(Row) -> Result<Row>,
    {
        let columns = self.columns();
        let (flat, markers) = self.flatten_marked(&self.index(), &columns);
        let rows = flat.rows().map(&mut f).collect::<Result<Vec<_>>>()?;
        let mut table = if rows.is_empty() {
            flat
        } else {
            RawTable::from_row_structs(&rows)
        };

        let mut colspec = self.colspec.clone();
        colspec.retain(|_, c| table.has_column(c));
        let added = table.n_columns() - colspec.len();
        debug!(
            dropped = self.colspec.len() - colspec.len(),
            added,
            "columns reclassified after apply"
        );

        let mut parameters = BTreeMap::new();
        for name in colspec.columns(PartitionKind::Parameters) {
            let scalar = match table.column(name) {
                Some(values) if !values.is_empty() => uniform_value(name, values)?,
                _ => self.store.parameter(name).cloned().unwrap_or_default(),
            };
            parameters.insert(name.clone(), scalar);
        }

        let cache_marker = presence_column(PartitionKind::Cache);
        for marker in markers {
            if added > 0 && marker.name == cache_marker {
                continue;
            }
            table.push_column(marker.name, marker.values)?;
        }
        DocFrame::from_flat(&table, &colspec, parameters, &self.settings)
    }

    /// Element-wise transform of one column. Returns a new frame; a
    /// parameters column maps its scalar.
    pub fn map_column<F>(&self, column: &str, mut f: F) -> Result<DocFrame>
    where
        F: FnMut(&Value) -> Value,
    {
        let kind = self.kind_of(column)?;
        let mut out = self.clone();
        if kind == PartitionKind::Parameters {
            let current = out.store.parameter(column).cloned().unwrap_or_default();
            out.store.set_parameter(column, f(&current));
        } else if let Some(values) = out
            .store
            .partition_mut(kind)
            .and_then(|t| t.column_mut(column))
        {
            for value in values.iter_mut() {
                *value = f(value);
            }
        }
        Ok(out)
    }

    /// New frame with the flattened rows `keep` accepts. Parameters are
    /// kept as they are.
    #[instrument(skip_all)]
    pub fn filter<F>(&self, mut keep: F) -> Result<DocFrame>
    where
        F: FnMut(&Row) -> bool,
    {
        let columns = self.columns();
        let (mut flat, markers) = self.flatten_marked(&self.index(), &columns);
        let mask: Vec<bool> = flat.rows().map(|row| keep(&row)).collect();
        debug!(
            kept = mask.iter().filter(|k| **k).count(),
            of = flat.n_rows(),
            "rows filtered"
        );
        for marker in markers {
            flat.push_column(marker.name, marker.values)?;
        }
        DocFrame::from_flat(
            &flat.filter_rows(&mask)?,
            &self.colspec,
            self.store.parameters().clone(),
            &self.settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use docframe_shared::DocFrameError;

    use super::*;
    use crate::ops::tests::{frame, series_rows, uneven_series};

    #[test]
    fn apply_reclassifies_columns() {
        let frame = frame();
        let out = frame
            .apply(|mut row| {
                row.cells.remove("out");
                let doubled = row.get("A").and_then(Value::as_i64).map(|a| a * 2);
                row.cells.insert("double".into(), doubled.into());
                Ok(row)
            })
            .expect("apply");
        assert_eq!(out.colspec().kind_of("A"), Some(PartitionKind::Input));
        assert_eq!(out.colspec().kind_of("E"), Some(PartitionKind::Parameters));
        assert_eq!(out.colspec().kind_of("double"), Some(PartitionKind::Cache));
        assert!(!out.colspec().contains("out"));
        assert_eq!(out.at().get(2, "double").expect("get"), Some(Value::Int(6)));
    }

    #[test]
    fn apply_must_keep_parameters_uniform() {
        let frame = frame();
        let err = frame
            .apply(|mut row| {
                let e = if row.index == Value::Int(0) { 1 } else { 2 };
                row.cells.insert("E".into(), Value::Int(e));
                Ok(row)
            })
            .unwrap_err();
        assert!(matches!(err, DocFrameError::Consistency { .. }));
    }

    #[test]
    fn map_column_leaves_source_untouched() {
        let frame = frame();
        let mapped = frame
            .map_column("A", |v| v.as_i64().map_or(Value::Null, |a| Value::Int(a + 100)))
            .expect("map");
        assert_eq!(mapped.at().get(0, "A").expect("get"), Some(Value::Int(101)));
        assert_eq!(frame.at().get(0, "A").expect("get"), Some(Value::Int(1)));

        let param = frame.map_column("E", |_| Value::from("p")).expect("map");
        assert_eq!(param.parameters().get("E"), Some(&Value::from("p")));
    }

    #[test]
    fn filter_keeps_colspec_and_parameters() {
        let frame = frame();
        let odd = frame
            .filter(|row| row.get("A").and_then(Value::as_i64).is_some_and(|a| a % 2 == 1))
            .expect("filter");
        assert_eq!(odd.index(), vec![Value::Int(0), Value::Int(2)]);
        assert_eq!(odd.colspec(), frame.colspec());
        assert_eq!(odd.parameters().get("E"), Some(&Value::Int(7)));

        let none = frame.filter(|_| false).expect("filter");
        assert!(none.is_empty());
        assert_eq!(none.parameters().get("E"), Some(&Value::Int(7)));
    }

    #[test]
    fn apply_over_zero_rows_keeps_columns_and_parameters() {
        let empty = frame().filter(|_| false).expect("filter");
        let out = empty.apply(Ok).expect("apply");
        assert!(out.is_empty());
        assert_eq!(out.colspec(), empty.colspec());
        assert_eq!(out.parameters().get("E"), Some(&Value::Int(7)));
        assert_eq!(out.colspec().kind_of("out"), Some(PartitionKind::Output));
    }

    #[test]
    fn identity_filter_and_apply_keep_series_rows() {
        let frame = uneven_series();
        let before = series_rows(&frame);

        let filtered = frame.filter(|_| true).expect("filter");
        assert_eq!(series_rows(&filtered), before);
        assert_eq!(filtered.to_table(), frame.to_table());

        let applied = frame.apply(Ok).expect("apply");
        assert_eq!(series_rows(&applied), before);
        assert_eq!(applied.to_table(), frame.to_table());
    }

    #[test]
    fn filter_keeps_only_surviving_series_rows() {
        let frame = uneven_series();
        let english = frame
            .filter(|row| row.get("lang") != Some(&Value::from("fr")))
            .expect("filter");
        assert_eq!(series_rows(&english), BTreeMap::from([(Value::Int(0), 1), (Value::Int(1), 1)]));
        assert_eq!(english.len(), 3);

        let mut english = english;
        english.set_index(1).expect("focus");
        assert_eq!(
            english.get_subseries_values("text").expect("subseries"),
            vec![Value::from("bye")]
        );
    }

    #[test]
    fn apply_with_new_columns_keeps_series_rows() {
        let frame = uneven_series();
        let out = frame
            .apply(|row| Ok(row.with("flag", true)))
            .expect("apply");
        assert_eq!(series_rows(&out), series_rows(&frame));
        assert_eq!(out.colspec().kind_of("flag"), Some(PartitionKind::Cache));
        assert_eq!(out.at().get(2, "flag").expect("get"), Some(Value::Bool(true)));
    }
}
