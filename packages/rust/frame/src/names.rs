//! Name mapper: a bijection between template-safe identifiers and physical
//! column names.
//!
//! Every mapping records where it came from. Auto-generated entries can be
//! replaced freely; explicit entries can only be restated, never changed.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use docframe_shared::{DocFrameError, Result};

use crate::frame::DocFrame;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("valid regex"));

/// Words the template language reserves.
const KEYWORDS: &[&str] = &[
    "and", "as", "block", "break", "continue", "elif", "else", "endblock", "endfor", "endif",
    "false", "False", "filter", "for", "from", "if", "import", "in", "include", "is", "loop",
    "macro", "none", "None", "not", "or", "set", "true", "True", "with",
];

/// Where a mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrigin {
    Explicit,
    AutoGenerated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub identifier: String,
    pub origin: MappingOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapper {
    by_column: BTreeMap<String, Mapping>,
    by_identifier: BTreeMap<String, String>,
}

/// Whether `name` can be used as a template identifier as is.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name) && !KEYWORDS.contains(&name)
}

/// Template-safe identifier for a raw column name.
///
/// Valid identifiers map to themselves. Anything else is camel-cased from
/// its alphanumeric runs; a leading digit gets a `_` prefix and reserved
/// words a `_` suffix.
pub fn to_identifier(name: &str) -> String {
    if is_identifier(name) {
        return name.to_string();
    }
    if IDENTIFIER_RE.is_match(name) {
        return format!("{name}_");
    }

    let mut out = String::with_capacity(name.len());
    for (i, word) in WORD_RE.find_iter(name).map(|m| m.as_str()).enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }

    if out.is_empty() {
        out.push_str("column");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

impl NameMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `column` to a generated identifier, unless it already has an
    /// explicit one. Collisions with other columns get a numeric suffix.
    pub fn insert_auto(&mut self, column: &str) -> &str {
        let explicit = self
            .by_column
            .get(column)
            .is_some_and(|m| m.origin == MappingOrigin::Explicit);
        if !explicit {
            let base = to_identifier(column);
            let mut candidate = base.clone();
            let mut n = 2;
            while self
                .by_identifier
                .get(&candidate)
                .is_some_and(|owner| owner != column)
            {
                candidate = format!("{base}{n}");
                n += 1;
            }
            self.bind(column, candidate, MappingOrigin::AutoGenerated);
        }
        self.identifier(column).unwrap_or_default()
    }

    /// Map `column` to `identifier` explicitly.
    ///
    /// Restating the same explicit mapping is a no-op. Changing an explicit
    /// mapping, or claiming an identifier another column holds explicitly,
    /// is a [`DocFrameError::MappingConflict`]. A column that held the
    /// identifier through auto-generation is remapped.
    pub fn insert_explicit(&mut self, column: &str, identifier: &str) -> Result<()> {
        if !is_identifier(identifier) {
            return Err(DocFrameError::mapping_conflict(format!(
                "'{identifier}' is not a usable identifier for column '{column}'"
            )));
        }
        if let Some(existing) = self.by_column.get(column) {
            if existing.origin == MappingOrigin::Explicit {
                if existing.identifier == identifier {
                    return Ok(());
                }
                return Err(DocFrameError::mapping_conflict(format!(
                    "column '{column}' is already mapped to '{}', cannot remap it to '{identifier}'",
                    existing.identifier
                )));
            }
        }

        let displaced = match self.by_identifier.get(identifier) {
            Some(owner) if owner != column => {
                let owner = owner.clone();
                if self.origin(&owner) == Some(MappingOrigin::Explicit) {
                    return Err(DocFrameError::mapping_conflict(format!(
                        "identifier '{identifier}' is already mapped to column '{owner}'"
                    )));
                }
                Some(owner)
            }
            _ => None,
        };

        if let Some(owner) = &displaced {
            self.by_column.remove(owner);
            self.by_identifier.remove(identifier);
        }
        self.bind(column, identifier.to_string(), MappingOrigin::Explicit);
        if let Some(owner) = displaced {
            let remapped = self.insert_auto(&owner).to_string();
            debug!(column = %owner, identifier = %remapped, "auto mapping displaced by explicit mapping");
        }
        Ok(())
    }

    fn bind(&mut self, column: &str, identifier: String, origin: MappingOrigin) {
        if let Some(old) = self.by_column.remove(column) {
            self.by_identifier.remove(&old.identifier);
        }
        self.by_identifier.insert(identifier.clone(), column.to_string());
        self.by_column
            .insert(column.to_string(), Mapping { identifier, origin });
    }

    pub fn identifier(&self, column: &str) -> Option<&str> {
        self.by_column.get(column).map(|m| m.identifier.as_str())
    }

    /// Column an identifier stands for.
    pub fn column(&self, identifier: &str) -> Option<&str> {
        self.by_identifier.get(identifier).map(String::as_str)
    }

    pub fn origin(&self, column: &str) -> Option<MappingOrigin> {
        self.by_column.get(column).map(|m| m.origin)
    }

    /// Mappings by column name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mapping)> {
        self.by_column.iter().map(|(c, m)| (c.as_str(), m))
    }

    /// The identifier → column table handed to template rendering.
    pub fn identifiers(&self) -> &BTreeMap<String, String> {
        &self.by_identifier
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }
}

impl DocFrame {
    /// Build the name mapper for this frame's columns.
    ///
    /// Every column gets a generated identifier first; `explicit`
    /// (column → identifier) then overrides. Explicit entries for columns
    /// the frame does not have are skipped.
    #[instrument(skip_all, fields(columns = self.colspec.len(), explicit = explicit.len()))]
    pub fn name_mapper(&self, explicit: &BTreeMap<String, String>) -> Result<NameMapper> {
        let mut mapper = NameMapper::new();
        for column in self.columns() {
            mapper.insert_auto(column);
        }
        for (column, identifier) in explicit {
            if !self.colspec.contains(column) {
                debug!(%column, "explicit name mapping for unknown column skipped");
                continue;
            }
            mapper.insert_explicit(column, identifier)?;
        }
        Ok(mapper)
    }
}
