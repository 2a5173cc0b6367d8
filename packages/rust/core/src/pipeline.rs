//! End-to-end run: inputs → frame → compute steps → saved outputs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use docframe_frame::{Colspec, DocFrame, JoinHow, PartitionKind, RawTable, Suffixes};
use docframe_io::{PartitionIo, save_frame};
use docframe_shared::{DocFrameError, FrameSettings, Result, RunId, Value};

use crate::interface::Interface;
use crate::template::Compute;

/// Result of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineResult {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Logical rows of the final frame.
    pub rows: usize,
    /// Cells written by compute steps.
    pub cells_written: usize,
    /// Files (or keys) the outputs were saved to.
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
    /// The frame as it was saved.
    pub frame: DocFrame,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each compute step.
    fn step(&self, target: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn step(&self, _target: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// Merge explicit name mappings from the user config and the interface.
/// The same column mapped to two different identifiers is a conflict.
pub fn explicit_names(
    config: &BTreeMap<String, String>,
    interface: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut merged = config.clone();
    for (column, identifier) in interface {
        match merged.get(column) {
            Some(existing) if existing != identifier => {
                return Err(DocFrameError::mapping_conflict(format!(
                    "column '{column}' is mapped to '{existing}' in the config and to '{identifier}' in the interface"
                )));
            }
            _ => {
                merged.insert(column.clone(), identifier.clone());
            }
        }
    }
    Ok(merged)
}

/// Load every input and assemble the frame the interface describes.
///
/// Inputs are outer-joined on the index. Columns the interface classifies
/// keep that kind; the rest of an input's columns are input columns.
/// Classified columns no input provides are created empty.
#[instrument(skip_all, fields(interface = %interface.name, adapter = io.name()))]
pub fn build_frame(
    interface: &Interface,
    settings: &FrameSettings,
    io: &dyn PartitionIo,
) -> Result<DocFrame> {
    let colspec = interface.colspec()?;

    let mut frame: Option<DocFrame> = None;
    for desc in interface.input_descs()? {
        let (table, used) = io.load(&desc)?;
        info!(path = %used.path.display(), rows = table.n_rows(), "input loaded");
        let part = DocFrame::new(&table, &input_colspec(&colspec, &table), settings)?;
        frame = Some(match frame {
            None => part,
            Some(acc) => acc.join(&part, JoinHow::Outer, &Suffixes::default())?,
        });
    }
    let mut frame = frame.ok_or_else(|| DocFrameError::ambiguous("no input was loaded"))?;

    for (kind, columns) in colspec.iter() {
        for column in columns {
            if !frame.colspec().contains(column) {
                frame.add_column(kind, column, Value::Null)?;
            }
        }
    }
    Ok(frame)
}

/// Colspec for one input table: the run colspec restricted to the table's
/// columns, with unclassified columns as input.
fn input_colspec(colspec: &Colspec, table: &RawTable) -> Colspec {
    let mut spec = colspec.clone();
    spec.retain(|_, c| table.has_column(c));
    let unclassified: Vec<&str> = table.column_names().filter(|c| !spec.contains(c)).collect();
    spec.with(PartitionKind::Input, &unclassified)
}

/// Run the interface end to end.
///
/// 1. Load inputs and build the frame
/// 2. Run each compute step in order
/// 3. Save the output partitions
#[instrument(skip_all, fields(interface = %interface.name))]
pub fn run_pipeline(
    interface: &Interface,
    settings: &FrameSettings,
    io: &dyn PartitionIo,
    compute: &dyn Compute,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let start = Instant::now();
    let run_id = RunId::new();
    let started_at = Utc::now();
    info!(%run_id, compute = compute.name(), "starting pipeline");

    // --- Phase 1: Inputs ---
    progress.phase("Loading inputs");
    let mut frame = build_frame(interface, settings, io)?;

    // --- Phase 2: Compute ---
    progress.phase("Running compute steps");
    let total = interface.compute.len();
    let mut cells_written = 0;
    for (i, spec) in interface.compute.iter().enumerate() {
        progress.step(&spec.target, i + 1, total);
        cells_written += compute.run(&mut frame, spec)?;
    }

    // --- Phase 3: Save ---
    progress.phase("Saving outputs");
    let outputs = save_frame(&frame, io, &interface.output_descs())?;

    let result = PipelineResult {
        run_id,
        started_at,
        rows: frame.len(),
        cells_written,
        outputs,
        elapsed: start.elapsed(),
        frame,
    };
    progress.done(&result);

    info!(
        run_id = %result.run_id,
        rows = result.rows,
        cells_written = result.cells_written,
        outputs = result.outputs.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "pipeline complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use docframe_io::{JsonRecordsIo, MemoryIo};

    use super::*;
    use crate::template::TemplateCompute;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
    }

    fn memory_interface() -> (Interface, MemoryIo) {
        let toml = r#"
name = "memory"
index_column = "id"

[[inputs]]
path = "a"

[[inputs]]
path = "b"

[output]
path = "out"

[colspec]
parameters = ["unit"]

[[compute]]
target = "summary"
template = "{{ name }}: {{ qty }} {{ unit }}"
"#;
        let io = MemoryIo::new();
        io.insert(
            "a",
            RawTable::with_range_index(2)
                .with_column("id", [1, 2])
                .expect("id")
                .with_column("name", ["bolt", "nut"])
                .expect("name")
                .with_column("unit", ["pcs", "pcs"])
                .expect("unit"),
        );
        io.insert(
            "b",
            RawTable::with_range_index(1)
                .with_column("id", [2])
                .expect("id")
                .with_column("qty", [40])
                .expect("qty"),
        );
        (Interface::from_toml_str(toml, "").expect("interface"), io)
    }

    #[test]
    fn build_frame_joins_inputs_and_classifies() {
        let (interface, io) = memory_interface();
        let frame = build_frame(&interface, &FrameSettings::default(), &io).expect("frame");
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.colspec().kind_of("name"), Some(PartitionKind::Input));
        assert_eq!(frame.colspec().kind_of("qty"), Some(PartitionKind::Input));
        assert_eq!(frame.colspec().kind_of("unit"), Some(PartitionKind::Parameters));
        assert_eq!(frame.colspec().kind_of("summary"), Some(PartitionKind::Output));
        assert_eq!(frame.at().get(1, "qty").expect("get"), Some(Value::Null));
    }

    #[test]
    fn run_pipeline_saves_rendered_output() {
        let (interface, io) = memory_interface();
        let compute = TemplateCompute::new(interface.names.clone());
        let result = run_pipeline(
            &interface,
            &FrameSettings::default(),
            &io,
            &compute,
            &SilentProgress,
        )
        .expect("run");
        assert_eq!(result.rows, 2);
        assert_eq!(result.cells_written, 2);
        assert_eq!(result.outputs, vec![PathBuf::from("out")]);

        let saved = io.get("out").expect("saved");
        assert_eq!(saved.column("id").expect("id"), &[Value::Int(1), Value::Int(2)]);
        assert_eq!(
            saved.column("summary").expect("summary"),
            &[Value::from("bolt:  pcs"), Value::from("nut: 40 pcs")]
        );
    }

    #[test]
    fn explicit_names_conflict_between_sources() {
        let config = BTreeMap::from([("a".to_string(), "x".to_string())]);
        let same = BTreeMap::from([("a".to_string(), "x".to_string())]);
        let other = BTreeMap::from([("a".to_string(), "y".to_string())]);
        assert!(explicit_names(&config, &same).is_ok());
        assert!(matches!(
            explicit_names(&config, &other).unwrap_err(),
            DocFrameError::MappingConflict { .. }
        ));
    }

    #[test]
    fn fixture_interface_runs_end_to_end() {
        let out_dir = std::env::temp_dir().join(format!("docframe-run-{}", uuid::Uuid::now_v7()));
        let interface = Interface::load(&fixtures().join("catalog.toml"))
            .expect("fixture interface")
            .with_output_dir(&out_dir);
        let compute = TemplateCompute::new(interface.names.clone());

        let result = run_pipeline(
            &interface,
            &FrameSettings::default(),
            &JsonRecordsIo::new(),
            &compute,
            &SilentProgress,
        )
        .expect("run");
        assert_eq!(result.rows, 3);
        assert_eq!(result.outputs.len(), 2);

        let (saved, _) = JsonRecordsIo::new()
            .load(&docframe_io::PartitionDesc::new(out_dir.join("catalog.json")).with_index_column("sku"))
            .expect("load output");
        assert_eq!(
            saved.column("label").expect("label"),
            &[
                Value::from("Desk lamp, 24.5 EUR"),
                Value::from("Oak desk, 310 EUR"),
                Value::from("Office chair, 129.99 EUR"),
            ]
        );
        assert!(out_dir.join("catalog_tags.json").exists());

        let _ = std::fs::remove_dir_all(&out_dir);
    }
}
