//! This module only defines the dataset logic for reading and holding the
//! corrupted mnist splits. Lazy access goes through `lines`, eager access
//! through `memory`, and `batch` builds minibatches over the latter.

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

pub mod batch;
pub mod corrupted_mnist;
pub mod lines;
pub mod memory;
pub mod prepare;

pub use batch::{Batch, Batches};
pub use lines::{iterate_records, LineIter, LineParser, LineRecords};
pub use memory::{materialize, MemoryDataset};

/// The universal Dataset trait for sequential minibatch consumption
pub trait Dataset {
    type DataPoint;
    fn next(&mut self) -> Option<Self::DataPoint>;
    fn reset(&mut self);
    fn shuffle(&mut self);
}

/// One decoded line: the corrupted image and the image to reconstruct.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T = i64> {
    pub input: Array1<T>,
    pub target: Array1<T>,
}

/// Borrowed record, as handed out by a materialized dataset
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a, T> {
    pub input: ArrayView1<'a, T>,
    pub target: ArrayView1<'a, T>,
}

impl<'a, T: Clone> RecordView<'a, T> {
    pub fn to_record(&self) -> Record<T> {
        Record {
            input: self.input.to_owned(),
            target: self.target.to_owned(),
        }
    }
}

/// What to do when a split holds a different number of records than declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthPolicy {
    /// Fail with `LengthMismatch`
    #[default]
    Strict,
    /// Report the declared length regardless of the file; surplus records
    /// are dropped and missing positions read as `None`
    Declared,
}
