//! JSON records adapter: a file holds an array of row objects.

use std::fs;

use serde_json::{Map, Value as Json};
use tracing::{debug, instrument};

use docframe_frame::{RawTable, Row};
use docframe_shared::{DocFrameError, Result, Value};

use crate::{PartitionDesc, PartitionIo};

/// Reads and writes `[{"col": value, ...}, ...]` files.
#[derive(Debug, Clone, Default)]
pub struct JsonRecordsIo {
    pretty: bool,
}

impl JsonRecordsIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent written files.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Parse records from a JSON string. Objects may have different keys;
    /// cells a record lacks are `Null`.
    pub fn parse_records(json: &str) -> Result<RawTable> {
        let records: Vec<Map<String, Json>> = serde_json::from_str(json)
            .map_err(|e| DocFrameError::parse(format!("expected an array of JSON objects: {e}")))?;
        let rows: Vec<Row> = records
            .iter()
            .enumerate()
            .map(|(i, record)| Row {
                index: Value::from(i),
                cells: record
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            })
            .collect();
        Ok(RawTable::from_row_structs(&rows))
    }

    /// Render a table as a JSON array of objects (the index is not written).
    pub fn to_records(table: &RawTable) -> Vec<Json> {
        (0..table.n_rows())
            .map(|row| {
                let record: Map<String, Json> = table
                    .columns()
                    .iter()
                    .map(|c| {
                        let cell = c.values.get(row).map(Value::to_json).unwrap_or(Json::Null);
                        (c.name.clone(), cell)
                    })
                    .collect();
                Json::Object(record)
            })
            .collect()
    }
}

impl PartitionIo for JsonRecordsIo {
    #[instrument(skip_all, fields(path = %desc.path.display()))]
    fn load(&self, desc: &PartitionDesc) -> Result<(RawTable, PartitionDesc)> {
        let index_column = desc.index_column.as_deref().ok_or_else(|| {
            DocFrameError::ambiguous(format!(
                "no index column specified for {}",
                desc.path.display()
            ))
        })?;
        let text = fs::read_to_string(&desc.path).map_err(|e| DocFrameError::io(&desc.path, e))?;
        let table = Self::parse_records(&text)?.set_index_column(index_column)?;

        let table = if desc.columns.is_empty() {
            table
        } else {
            table.select(&desc.columns)?
        };
        let used = PartitionDesc {
            path: desc.path.clone(),
            index_column: Some(index_column.to_string()),
            columns: table.column_names().map(str::to_string).collect(),
        };
        debug!(rows = table.n_rows(), columns = table.n_columns(), "records loaded");
        Ok((table, used))
    }

    #[instrument(skip_all, fields(path = %desc.path.display(), rows = table.n_rows()))]
    fn save(&self, table: &RawTable, desc: &PartitionDesc) -> Result<()> {
        let records = Json::Array(Self::to_records(table));
        let text = if self.pretty {
            serde_json::to_string_pretty(&records)
        } else {
            serde_json::to_string(&records)
        }
        .map_err(|e| DocFrameError::parse(format!("failed to encode records: {e}")))?;

        if let Some(parent) = desc.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DocFrameError::io(parent, e))?;
        }
        fs::write(&desc.path, text).map_err(|e| DocFrameError::io(&desc.path, e))
    }

    fn name(&self) -> &str {
        "json-records"
    }
}
