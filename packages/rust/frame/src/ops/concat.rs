//! Vertical stacking of frames.

use tracing::{info, instrument};

use docframe_shared::{DocFrameError, Result};

use crate::colspec::{Colspec, PartitionKind};
use crate::frame::DocFrame;
use crate::table::RawTable;

impl DocFrame {
    /// Stack frames vertically.
    ///
    /// Partition kinds do not survive stacking: every column lands in one
    /// bucket, series cache when the combined index repeats a label and plain
    /// cache otherwise. Settings come from the first frame.
    #[instrument(skip_all, fields(frames = frames.len()))]
    pub fn concat(frames: &[&DocFrame]) -> Result<DocFrame> {
        let first = frames
            .first()
            .ok_or_else(|| DocFrameError::ambiguous("concat needs at least one frame"))?;

        let flat: Vec<RawTable> = frames.iter().map(|f| f.to_table()).collect();
        let stacked = RawTable::vstack(&flat.iter().collect::<Vec<_>>())?;

        let kind = if stacked.has_duplicate_index() {
            PartitionKind::SeriesCache
        } else {
            PartitionKind::Cache
        };
        let names: Vec<&str> = stacked.column_names().collect();
        let colspec = Colspec::new().with(kind, &names);

        let out = DocFrame::new(&stacked, &colspec, &first.settings)?;
        info!(%kind, rows = stacked.n_rows(), "frames concatenated");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use docframe_shared::{FrameSettings, Value};

    use super::*;

    fn input_frame(index: Vec<i64>) -> DocFrame {
        let table = RawTable::new(index.into_iter().map(Value::from).collect())
            .with_column("A", [1, 2, 3])
            .expect("A");
        let spec = Colspec::new().with(PartitionKind::Input, &["A"]);
        DocFrame::new(&table, &spec, &FrameSettings::default()).expect("frame")
    }

    #[test]
    fn overlapping_indices_become_series_cache() {
        let t1 = input_frame(vec![0, 1, 2]);
        let t2 = input_frame(vec![0, 1, 2]);
        let out = DocFrame::concat(&[&t1, &t2]).expect("concat");
        assert_eq!(out.colspec(), &Colspec::new().with(PartitionKind::SeriesCache, &["A"]));
        assert_eq!(out.len(), 3);
        let series = out.store().partition(PartitionKind::SeriesCache).expect("series");
        assert_eq!(series.n_rows(), 6);
    }

    #[test]
    fn disjoint_indices_become_cache() {
        let t1 = input_frame(vec![0, 1, 2]);
        let t3 = input_frame(vec![3, 4, 5]);
        let out = DocFrame::concat(&[&t1, &t3]).expect("concat");
        assert_eq!(out.colspec(), &Colspec::new().with(PartitionKind::Cache, &["A"]));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn differing_columns_are_padded() {
        let t1 = input_frame(vec![0, 1, 2]);
        let table = RawTable::new(vec![Value::Int(9)]).with_column("B", ["b"]).expect("B");
        let spec = Colspec::new().with(PartitionKind::Output, &["B"]);
        let t2 = DocFrame::new(&table, &spec, &FrameSettings::default()).expect("frame");
        let out = DocFrame::concat(&[&t1, &t2]).expect("concat");
        assert_eq!(out.at().get(9, "A").expect("get"), Some(Value::Null));
        assert_eq!(out.at().get(0, "B").expect("get"), Some(Value::Null));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(DocFrame::concat(&[]).is_err());
    }
}
