//! Compute collaborator: fills a target column by rendering a template for
//! every logical row.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use docframe_frame::{DocFrame, NameMapper, PartitionKind};
use docframe_shared::{DocFrameError, Result, Value};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex")
});

/// One `[[compute]]` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSpec {
    /// Column the step writes.
    pub target: String,
    /// Kind the target is created as when the frame lacks it.
    #[serde(default = "default_target_kind")]
    pub target_kind: PartitionKind,
    /// Text with `{{ identifier }}` placeholders.
    pub template: String,
}

fn default_target_kind() -> PartitionKind {
    PartitionKind::Output
}

impl ComputeSpec {
    pub fn new(target: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_kind: default_target_kind(),
            template: template.into(),
        }
    }
}

/// The single entry point a frame uses to run external computations.
pub trait Compute {
    /// Run `spec` against `frame`, returning the number of cells written.
    fn run(&self, frame: &mut DocFrame, spec: &ComputeSpec) -> Result<usize>;

    /// Human-readable name for tracing.
    fn name(&self) -> &str;
}

/// Renders templates whose placeholders are Name Mapper identifiers.
///
/// Series columns render every value at the row, joined with `", "`;
/// missing values render empty.
#[derive(Debug, Clone, Default)]
pub struct TemplateCompute {
    names: BTreeMap<String, String>,
}

impl TemplateCompute {
    /// `names` are explicit column → identifier mappings.
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self { names }
    }

    /// Identifiers used by `template`, in order of first use.
    pub fn placeholders(template: &str) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for cap in PLACEHOLDER_RE.captures_iter(template) {
            if let Some(m) = cap.get(1) {
                if !found.contains(&m.as_str()) {
                    found.push(m.as_str());
                }
            }
        }
        found
    }

    fn render_row(
        frame: &DocFrame,
        template: &str,
        columns: &BTreeMap<&str, String>,
    ) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;
        for cap in PLACEHOLDER_RE.captures_iter(template) {
            let (Some(whole), Some(ident)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            rendered.push_str(&template[last..whole.start()]);
            if let Some(column) = columns.get(ident.as_str()) {
                rendered.push_str(&render_cell(frame, column)?);
            }
            last = whole.end();
        }
        rendered.push_str(&template[last..]);
        Ok(rendered)
    }
}

fn render_cell(frame: &DocFrame, column: &str) -> Result<String> {
    if frame.kind_of(column)?.is_series() {
        let values = frame.get_subseries_values(column)?;
        Ok(values
            .iter()
            .filter(|v| !v.is_null())
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", "))
    } else {
        Ok(frame
            .get_value_column(column)?
            .map(|v| v.to_string())
            .unwrap_or_default())
    }
}

/// Column behind every placeholder of `template`, or a compute error naming
/// the first unknown identifier.
fn resolve_placeholders<'t>(
    mapper: &NameMapper,
    template: &'t str,
) -> Result<BTreeMap<&'t str, String>> {
    TemplateCompute::placeholders(template)
        .into_iter()
        .map(|ident| {
            let column = mapper.column(ident).ok_or_else(|| {
                DocFrameError::compute(format!("template references unknown identifier '{ident}'"))
            })?;
            Ok((ident, column.to_string()))
        })
        .collect()
}

impl Compute for TemplateCompute {
    #[instrument(skip_all, fields(target = %spec.target))]
    fn run(&self, frame: &mut DocFrame, spec: &ComputeSpec) -> Result<usize> {
        let mapper = frame.name_mapper(&self.names)?;
        let columns = resolve_placeholders(&mapper, &spec.template)?;

        if !frame.colspec().contains(&spec.target) {
            frame.add_column(spec.target_kind, &spec.target, Value::Null)?;
            debug!(kind = %spec.target_kind, "created compute target column");
        }
        if frame.kind_of(&spec.target)? == PartitionKind::Input {
            return Err(DocFrameError::immutable(&spec.target, PartitionKind::Input));
        }

        let mut written = 0;
        for label in frame.index() {
            frame.set_index(label)?;
            let text = Self::render_row(frame, &spec.template, &columns)?;
            frame.set_value_column(&spec.target, text)?;
            written += 1;
        }
        frame.clear_focus();
        debug!(written, "template rendered");
        Ok(written)
    }

    fn name(&self) -> &str {
        "template"
    }
}

#[cfg(test)]
mod tests {
    use docframe_frame::{Colspec, RawTable};
    use docframe_shared::FrameSettings;

    use super::*;

    fn frame() -> DocFrame {
        let table = RawTable::new(vec![Value::from("a"), Value::from("b"), Value::from("b")])
            .with_column("product name", ["Lamp", "Desk", "Desk"])
            .expect("name")
            .with_column("currency", ["EUR", "EUR", "EUR"])
            .expect("currency")
            .with_column("tag", ["light", "wood", "oak"])
            .expect("tag");
        let spec = Colspec::new()
            .with(PartitionKind::Input, &["product name"])
            .with(PartitionKind::Parameters, &["currency"])
            .with(PartitionKind::SeriesCache, &["tag"]);
        DocFrame::new(&table, &spec, &FrameSettings::default()).expect("frame")
    }

    #[test]
    fn placeholders_are_listed_once() {
        assert_eq!(
            TemplateCompute::placeholders("{{a}} {{ b }} {{a}} {{ not valid }}"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn renders_every_row_into_new_output_column() {
        let mut frame = frame();
        let spec = ComputeSpec::new("label", "{{ productName }} [{{ tag }}] in {{currency}}");
        let written = TemplateCompute::default().run(&mut frame, &spec).expect("run");
        assert_eq!(written, 2);
        assert_eq!(frame.colspec().kind_of("label"), Some(PartitionKind::Output));
        assert_eq!(
            frame.at().get("a", "label").expect("get"),
            Some(Value::from("Lamp [light] in EUR"))
        );
        assert_eq!(
            frame.at().get("b", "label").expect("get"),
            Some(Value::from("Desk [wood, oak] in EUR"))
        );
    }

    #[test]
    fn explicit_names_are_used() {
        let mut frame = frame();
        let names = BTreeMap::from([("product name".to_string(), "title".to_string())]);
        let spec = ComputeSpec::new("label", "{{ title }}");
        TemplateCompute::new(names).run(&mut frame, &spec).expect("run");
        assert_eq!(frame.at().get("a", "label").expect("get"), Some(Value::from("Lamp")));
    }

    #[test]
    fn unknown_identifier_fails_before_writing() {
        let mut frame = frame();
        let spec = ComputeSpec::new("label", "{{ nope }}");
        let err = TemplateCompute::default().run(&mut frame, &spec).unwrap_err();
        assert!(matches!(err, DocFrameError::Compute(_)));
        assert!(!frame.colspec().contains("label"));
    }

    #[test]
    fn input_target_is_rejected() {
        let mut frame = frame();
        let spec = ComputeSpec::new("product name", "x");
        let err = TemplateCompute::default().run(&mut frame, &spec).unwrap_err();
        assert!(matches!(err, DocFrameError::Immutable { .. }));
    }
}
