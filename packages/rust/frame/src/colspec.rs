//! Partition kinds and the column → kind classification.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use docframe_shared::{DocFrameError, Result};

// ---------------------------------------------------------------------------
// PartitionKind
// ---------------------------------------------------------------------------

/// The kind of physical partition a column lives in.
///
/// Declaration order is partition iteration order, which is also the column
/// order of a flattened frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    /// Upstream data. Unique index, never writable.
    Input,
    /// Persisted results. Unique index.
    Output,
    /// Ephemeral working columns. Unique index.
    Cache,
    /// Table-wide scalars, one value per column.
    Parameters,
    /// Persisted one-to-many rows; index labels may repeat.
    SeriesOutput,
    /// Ephemeral one-to-many rows; index labels may repeat.
    SeriesCache,
}

impl PartitionKind {
    /// Every kind, in iteration order.
    pub const ALL: [PartitionKind; 6] = [
        Self::Input,
        Self::Output,
        Self::Cache,
        Self::Parameters,
        Self::SeriesOutput,
        Self::SeriesCache,
    ];

    /// Kinds that contribute to the logical index, highest priority first.
    pub const INDEX_PRIORITY: [PartitionKind; 5] = [
        Self::Input,
        Self::Output,
        Self::Cache,
        Self::SeriesOutput,
        Self::SeriesCache,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Cache => "cache",
            Self::Parameters => "parameters",
            Self::SeriesOutput => "series_output",
            Self::SeriesCache => "series_cache",
        }
    }

    /// Whether index labels may repeat in this partition.
    pub fn is_series(self) -> bool {
        matches!(self, Self::SeriesOutput | Self::SeriesCache)
    }

    /// Whether cells of this kind may be written.
    pub fn is_mutable(self) -> bool {
        !matches!(self, Self::Input)
    }

    /// Whether the partition is persisted on save.
    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Output | Self::SeriesOutput)
    }

    /// Whether rows may be appended to this partition.
    pub fn accepts_rows(self) -> bool {
        !matches!(self, Self::Input | Self::Parameters)
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionKind {
    type Err = DocFrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DocFrameError::ambiguous(format!("unsupported colspec kind '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Colspec
// ---------------------------------------------------------------------------

/// Declared mapping from partition kind to the columns it owns.
///
/// Serializes as `{kind: [columns...]}`. Kinds with no columns are never
/// stored, so two colspecs describing the same classification compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Colspec {
    kinds: BTreeMap<PartitionKind, Vec<String>>,
}

impl Colspec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, without validation.
    pub fn with<S: AsRef<str>>(mut self, kind: PartitionKind, columns: &[S]) -> Self {
        if !columns.is_empty() {
            self.kinds
                .entry(kind)
                .or_default()
                .extend(columns.iter().map(|c| c.as_ref().to_string()));
        }
        self
    }

    /// Parse the `{kind: [columns]}` description form.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)
            .map_err(|e| DocFrameError::parse(format!("invalid colspec: {e}")))?;
        spec.validate()?;
        Ok(spec.normalized())
    }

    /// Kind owning `column`.
    pub fn kind_of(&self, column: &str) -> Option<PartitionKind> {
        self.kinds
            .iter()
            .find(|(_, cols)| cols.iter().any(|c| c == column))
            .map(|(kind, _)| *kind)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.kind_of(column).is_some()
    }

    /// Columns owned by `kind`, in declaration order.
    pub fn columns(&self, kind: PartitionKind) -> &[String] {
        self.kinds.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Non-empty kinds with their columns, in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionKind, &[String])> {
        self.kinds.iter().map(|(k, cols)| (*k, cols.as_slice()))
    }

    /// Every column, in partition iteration order.
    pub fn all_columns(&self) -> Vec<&str> {
        self.kinds
            .values()
            .flat_map(|cols| cols.iter().map(String::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Number of classified columns.
    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    /// Classify a new column. Fails if the name is already classified.
    pub fn insert(&mut self, kind: PartitionKind, column: impl Into<String>) -> Result<()> {
        let column = column.into();
        if let Some(existing) = self.kind_of(&column) {
            return Err(DocFrameError::consistency(format!(
                "column '{column}' is already classified as {existing}"
            )));
        }
        self.kinds.entry(kind).or_default().push(column);
        Ok(())
    }

    /// Remove a column, returning the kind that owned it.
    pub fn remove(&mut self, column: &str) -> Option<PartitionKind> {
        let kind = self.kind_of(column)?;
        if let Some(cols) = self.kinds.get_mut(&kind) {
            cols.retain(|c| c != column);
            if cols.is_empty() {
                self.kinds.remove(&kind);
            }
        }
        Some(kind)
    }

    /// Keep only columns for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(PartitionKind, &str) -> bool) {
        for (kind, cols) in &mut self.kinds {
            cols.retain(|c| keep(*kind, c));
        }
        self.kinds.retain(|_, cols| !cols.is_empty());
    }

    /// Reject a column listed under two kinds (or twice under one).
    pub fn validate(&self) -> Result<()> {
        let mut owner: BTreeMap<&str, PartitionKind> = BTreeMap::new();
        for (kind, cols) in &self.kinds {
            for col in cols {
                if let Some(prev) = owner.insert(col.as_str(), *kind) {
                    return Err(DocFrameError::consistency(format!(
                        "column '{col}' is classified as both {prev} and {kind}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.kinds.retain(|_, cols| !cols.is_empty());
        self
    }
}
