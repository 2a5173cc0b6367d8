//! Interface descriptions: the TOML document that tells a pipeline run
//! where its partitions live, how columns are classified and what to compute.
//!
//! ```toml
//! name = "catalog"
//! index_column = "sku"
//!
//! [[inputs]]
//! path = "products.json"
//!
//! [output]
//! path = "out/catalog.json"
//! columns = ["label"]
//!
//! [colspec]
//! parameters = ["currency"]
//!
//! [[compute]]
//! target = "label"
//! template = "{{ name }} ({{ currency }})"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use docframe_frame::{Colspec, PartitionKind};
use docframe_io::PartitionDesc;
use docframe_shared::{DocFrameError, Result};

use crate::template::ComputeSpec;

/// A parsed interface description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Human-readable name for logs and summaries.
    pub name: String,

    /// Index column used by every partition that does not name its own.
    #[serde(default)]
    pub index_column: Option<String>,

    /// `[[inputs]]`: input partitions, joined on the index.
    #[serde(default)]
    pub inputs: Vec<PartitionDesc>,

    /// `[output]`: where the output partition is saved.
    #[serde(default)]
    pub output: Option<PartitionDesc>,

    /// `[series_output]`: where the series output partition is saved.
    #[serde(default)]
    pub series_output: Option<PartitionDesc>,

    /// `[colspec]`: `kind = [columns]`.
    #[serde(default)]
    pub colspec: BTreeMap<String, Vec<String>>,

    /// `[names]`: explicit column → identifier mappings.
    #[serde(default)]
    pub names: BTreeMap<String, String>,

    /// `[[compute]]`: steps run in order.
    #[serde(default)]
    pub compute: Vec<ComputeSpec>,

    /// Directory relative paths resolve against (the file's directory).
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Overrides `base_dir` for output paths.
    #[serde(skip)]
    pub output_dir: Option<PathBuf>,
}

impl Interface {
    /// Load an interface from a TOML file. Relative paths inside it resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DocFrameError::io(path, e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&content, base_dir)
            .map_err(|e| DocFrameError::config(format!("{}: {e}", path.display())))
    }

    /// Parse an interface from TOML text.
    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut interface: Self = toml::from_str(content)
            .map_err(|e| DocFrameError::config(format!("invalid interface: {e}")))?;
        interface.base_dir = base_dir.into();
        interface.validate()?;
        debug!(
            name = %interface.name,
            inputs = interface.inputs.len(),
            steps = interface.compute.len(),
            "interface loaded"
        );
        Ok(interface)
    }

    /// Resolve relative output paths against `dir` instead of the file's
    /// directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DocFrameError::config("interface name must not be empty"));
        }
        for kind in self.colspec.keys() {
            kind.parse::<PartitionKind>()?;
        }
        if let Some(step) = self.compute.iter().find(|s| s.target.trim().is_empty()) {
            return Err(DocFrameError::config(format!(
                "compute step with template '{}' has no target",
                step.template
            )));
        }
        Ok(())
    }

    fn explicit(&self, kind: PartitionKind) -> Option<&[String]> {
        self.colspec
            .get(kind.as_str())
            .map(Vec::as_slice)
            .filter(|cols| !cols.is_empty())
    }

    fn compute_targets(&self, kind: PartitionKind) -> impl Iterator<Item = &String> {
        self.compute
            .iter()
            .filter(move |s| s.target_kind == kind)
            .map(|s| &s.target)
    }

    /// Output columns: the `[colspec]` output list when present, otherwise
    /// the `[output]` columns plus every output compute target.
    pub fn output_columns(&self) -> Vec<String> {
        if let Some(cols) = self.explicit(PartitionKind::Output) {
            return cols.to_vec();
        }
        let declared = self.output.iter().flat_map(|o| o.columns.iter());
        dedup(declared.chain(self.compute_targets(PartitionKind::Output)))
    }

    /// Cache columns: the `[colspec]` cache list when present, otherwise
    /// every cache compute target.
    pub fn cache_columns(&self) -> Vec<String> {
        match self.explicit(PartitionKind::Cache) {
            Some(cols) => cols.to_vec(),
            None => dedup(self.compute_targets(PartitionKind::Cache)),
        }
    }

    /// The colspec for the run: `[colspec]` completed with the default
    /// output and cache columns. Input columns are left to the inputs.
    pub fn colspec(&self) -> Result<Colspec> {
        let mut spec = Colspec::new();
        for (kind, columns) in &self.colspec {
            spec = spec.with(kind.parse()?, columns);
        }
        for (kind, columns) in [
            (PartitionKind::Output, self.output_columns()),
            (PartitionKind::Cache, self.cache_columns()),
        ] {
            for column in columns {
                if !spec.contains(&column) {
                    spec.insert(kind, column)?;
                }
            }
        }
        spec.validate()?;
        Ok(spec)
    }

    /// Input descriptions with resolved paths and index columns.
    ///
    /// Fails when there is no input, or an input has no index column and the
    /// interface names none either.
    pub fn input_descs(&self) -> Result<Vec<PartitionDesc>> {
        if self.inputs.is_empty() {
            return Err(DocFrameError::ambiguous(format!(
                "interface '{}' declares no inputs",
                self.name
            )));
        }
        self.inputs
            .iter()
            .map(|desc| {
                let index_column = desc
                    .index_column
                    .clone()
                    .or_else(|| self.index_column.clone())
                    .ok_or_else(|| {
                        DocFrameError::ambiguous(format!(
                            "no index column specified for input {}",
                            desc.path.display()
                        ))
                    })?;
                Ok(PartitionDesc {
                    path: resolve(&self.base_dir, &desc.path),
                    index_column: Some(index_column),
                    columns: desc.columns.clone(),
                })
            })
            .collect()
    }

    /// Destinations of the persisted partitions, keyed by kind.
    pub fn output_descs(&self) -> BTreeMap<PartitionKind, PartitionDesc> {
        let base = self.output_dir.as_deref().unwrap_or(&self.base_dir);
        [
            (PartitionKind::Output, &self.output),
            (PartitionKind::SeriesOutput, &self.series_output),
        ]
        .into_iter()
        .filter_map(|(kind, desc)| {
            let desc = desc.as_ref()?;
            Some((
                kind,
                PartitionDesc {
                    path: resolve(base, &desc.path),
                    index_column: desc.index_column.clone().or_else(|| self.index_column.clone()),
                    columns: desc.columns.clone(),
                },
            ))
        })
        .collect()
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn dedup<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}
