//! The composite table engine.
//!
//! A [`DocFrame`] is one logical table backed by per-kind partitions
//! (input, output, cache, parameters and two series kinds). Columns are
//! classified by a [`Colspec`]; single cells are read and written through the
//! focus cursor or the `at`/`loc`/`iloc` accessors, and structural operators
//! (merge, join, concat, apply, filter) return new frames with a recomputed
//! colspec. [`NameMapper`] exposes template-safe identifiers for columns.
//!
//! A frame assumes a single writer. Share one across threads behind a lock
//! around the whole frame.

pub mod accessor;
pub mod colspec;
mod columnar;
pub mod cursor;
pub mod frame;
pub mod names;
pub mod ops;
pub mod partition;
pub mod table;

pub use accessor::{Assign, CellAccessor, PositionAccessor, RangeAccessor, Selection};
pub use colspec::{Colspec, PartitionKind};
pub use cursor::FocusCursor;
pub use frame::DocFrame;
pub use names::{Mapping, MappingOrigin, NameMapper, is_identifier, to_identifier};
pub use ops::{JoinHow, Suffixes};
pub use partition::PartitionStore;
pub use table::{Column, RawTable, Row};
