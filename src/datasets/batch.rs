use ndarray::prelude::*;
use rand::seq::SliceRandom;

use super::{Dataset, MemoryDataset};
use crate::error::{DatasetError, Result};

/// A minibatch of records, one row per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub input: Array2<T>,
    pub target: Array2<T>,
}

/// Walks a materialized split in batches of a fixed size, in order until
/// `shuffle` is called. A trailing partial batch is not produced.
pub struct Batches<'a, T> {
    data: &'a MemoryDataset<T>,
    shuffle: Vec<usize>,
    idx: usize,
    batch_size: usize,
}

impl<'a, T> Batches<'a, T> {
    pub fn new(data: &'a MemoryDataset<T>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(DatasetError::InvalidConfig("batch size cannot be zero".into()));
        }
        Ok(Self {
            data,
            shuffle: (0..data.rows()).collect(),
            idx: 0,
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of full batches in one pass
    pub fn num_batches(&self) -> usize {
        self.shuffle.len() / self.batch_size
    }

    /// Record indices in their current visiting order
    pub fn order(&self) -> &[usize] {
        &self.shuffle
    }
}

impl<'a, T: Clone> Dataset for Batches<'a, T> {
    type DataPoint = Batch<T>;

    fn next(&mut self) -> Option<Self::DataPoint> {
        // batch size stride greater than the number of remaining elements
        if self.idx + self.batch_size > self.shuffle.len() {
            return None;
        }
        let indices = &self.shuffle[self.idx..self.idx + self.batch_size];
        let input = self.data.inputs().select(Axis(0), indices);
        let target = self.data.targets().select(Axis(0), indices);
        self.idx += self.batch_size;
        Some(Batch { input, target })
    }

    fn reset(&mut self) {
        self.idx = 0;
    }

    fn shuffle(&mut self) {
        self.shuffle.shuffle(&mut rand::thread_rng());
    }
}
