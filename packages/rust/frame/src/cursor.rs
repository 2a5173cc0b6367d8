//! Focus cursor and cursor-addressed single-cell access.
//!
//! The cursor is `{index, column, selector, subindex}`. `selector` names a
//! series column and `subindex` one of its values, which together pick a
//! single row among several sharing an index label.

use tracing::debug;

use docframe_shared::{DocFrameError, Result, Value};

use crate::colspec::PartitionKind;
use crate::frame::DocFrame;

/// Current focus of a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusCursor {
    pub index: Option<Value>,
    pub column: Option<String>,
    pub selector: Option<String>,
    pub subindex: Option<Value>,
}

impl FocusCursor {
    /// Selector/subindex pair, when both are set.
    pub fn filter(&self) -> Option<(&str, &Value)> {
        Some((self.selector.as_deref()?, self.subindex.as_ref()?))
    }
}

impl DocFrame {
    pub fn focus(&self) -> &FocusCursor {
        &self.focus
    }

    /// Focus a logical index label.
    pub fn set_index(&mut self, label: impl Into<Value>) -> Result<()> {
        let label = label.into();
        self.require_label(&label)?;
        self.focus.index = Some(label);
        Ok(())
    }

    /// Focus a column.
    pub fn set_column(&mut self, column: &str) -> Result<()> {
        self.kind_of(column)?;
        self.focus.column = Some(column.to_string());
        Ok(())
    }

    /// Focus both an index label and a column.
    pub fn set_focus(&mut self, label: impl Into<Value>, column: &str) -> Result<()> {
        self.set_index(label)?;
        self.set_column(column)
    }

    /// Choose the series column used to tell rows apart. Clears the subindex.
    pub fn set_selector(&mut self, selector: Option<&str>) -> Result<()> {
        if let Some(name) = selector {
            let kind = self.kind_of(name)?;
            if !kind.is_series() {
                return Err(DocFrameError::invalid_reference(format!(
                    "selector '{name}' is a {kind} column, not a series column"
                )));
            }
        }
        self.focus.selector = selector.map(str::to_string);
        self.focus.subindex = None;
        Ok(())
    }

    /// Choose the selector value that identifies one series row.
    ///
    /// The value must occur somewhere in the selector column; it does not
    /// have to occur at the focused index, so a write can add that row.
    pub fn set_subindex(&mut self, subindex: Option<Value>) -> Result<()> {
        if let Some(value) = &subindex {
            let selector = self.focus.selector.as_deref().ok_or_else(|| {
                DocFrameError::ambiguous("a subindex needs a selector column to be set first")
            })?;
            let kind = self.kind_of(selector)?;
            let present = self
                .store
                .partition(kind)
                .and_then(|t| t.column(selector))
                .is_some_and(|values| values.contains(value));
            if !present {
                return Err(DocFrameError::invalid_reference(format!(
                    "subindex '{value}' does not occur in selector column '{selector}'"
                )));
            }
        }
        self.focus.subindex = subindex;
        Ok(())
    }

    /// Reset the cursor.
    pub fn clear_focus(&mut self) {
        self.focus = FocusCursor::default();
    }

    /// Value under the cursor. `Ok(None)` when no row exists there.
    pub fn get_value(&self) -> Result<Option<Value>> {
        let column = self.focused_column()?.to_string();
        self.get_value_column(&column)
    }

    /// Write the value under the cursor.
    ///
    /// Input columns reject writes. Output and cache cells must already
    /// exist. Series writes append a row when nothing matches.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let column = self.focused_column()?.to_string();
        self.set_value_column(&column, value)
    }

    /// Value of `column` at the focused index.
    pub fn get_value_column(&self, column: &str) -> Result<Option<Value>> {
        let kind = self.kind_of(column)?;
        if kind == PartitionKind::Parameters {
            return Ok(self.store.parameter(column).cloned());
        }
        let label = self.focused_index()?;
        self.read_cell(label, column, self.series_filter(kind))
    }

    /// Write `column` at the focused index.
    pub fn set_value_column(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let kind = self.kind_of(column)?;
        let value = value.into();
        if kind == PartitionKind::Parameters {
            return self.write_cell(&Value::Null, column, value, None);
        }
        let label = self.focused_index()?.clone();
        let filter = self
            .series_filter(kind)
            .map(|(s, v)| (s.to_string(), v.clone()));
        self.write_cell(
            &label,
            column,
            value,
            filter.as_ref().map(|(s, v)| (s.as_str(), v)),
        )
    }

    /// Every value `column` holds at the focused index, in row order.
    ///
    /// Series columns can return several values; other kinds return at most
    /// one.
    pub fn get_subseries_values(&self, column: &str) -> Result<Vec<Value>> {
        let kind = self.kind_of(column)?;
        match kind {
            PartitionKind::SeriesOutput | PartitionKind::SeriesCache => {
                let label = self.focused_index()?;
                let Some(table) = self.store.partition(kind) else {
                    return Ok(Vec::new());
                };
                let positions = self.series_positions(kind, label, None)?;
                Ok(positions
                    .into_iter()
                    .filter_map(|pos| table.get(pos, column).cloned())
                    .collect())
            }
            _ => Ok(self.get_value_column(column)?.into_iter().collect()),
        }
    }

    fn focused_column(&self) -> Result<&str> {
        self.focus
            .column
            .as_deref()
            .ok_or_else(|| DocFrameError::invalid_reference("no column is focused"))
    }

    fn focused_index(&self) -> Result<&Value> {
        self.focus
            .index
            .as_ref()
            .ok_or_else(|| DocFrameError::invalid_reference("no index is focused"))
    }

    /// Selector filter applicable to a column of `kind`.
    fn series_filter(&self, kind: PartitionKind) -> Option<(&str, &Value)> {
        if !kind.is_series() {
            return None;
        }
        let filter = self.focus.filter();
        if filter.is_none() && self.focus.selector.is_some() {
            debug!("selector set without subindex, resolving to the last matching row");
        }
        filter
    }
}
