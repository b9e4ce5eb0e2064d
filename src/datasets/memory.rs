use std::ops::Range;

use ndarray::prelude::*;
use num::FromPrimitive;
use tracing::{debug, warn};

use super::{LengthPolicy, Record, RecordView};
use crate::error::{DatasetError, Result};

/// All records of a split held in memory. Inputs and targets live in two
/// row-major arrays with one row per record, each row the flattened field.
#[derive(Debug, Clone)]
pub struct MemoryDataset<T> {
    inputs: Array2<T>,
    targets: Array2<T>,
    input_shape: Vec<usize>,
    target_shape: Vec<usize>,
    length: usize,
}

/// Reads every record from `records` into memory, converting each element to `T`.
///
/// `shapes` gives the per-record shape of the input and target fields;
/// every record must hold exactly as many elements as its shape describes.
/// How a record count other than `declared_length` is handled depends on `policy`.
pub fn materialize<T, I>(
    records: I,
    shapes: [&[usize]; 2],
    declared_length: usize,
    policy: LengthPolicy,
) -> Result<MemoryDataset<T>>
where
    T: FromPrimitive + Clone,
    I: IntoIterator<Item = Result<Record>>,
{
    let [input_shape, target_shape] = shapes;
    let input_width: usize = input_shape.iter().product();
    let target_width: usize = target_shape.iter().product();

    let mut inputs = Vec::<T>::new();
    let mut targets = Vec::<T>::new();
    let mut count = 0;

    for record in records {
        let record = record?;
        if count >= declared_length && policy == LengthPolicy::Declared {
            warn!("More records than the declared {}, dropping the rest", declared_length);
            break;
        }
        count += 1;
        if policy == LengthPolicy::Strict && count > declared_length {
            // keep counting for the error message, but stop storing
            continue;
        }
        push_field(&mut inputs, &record.input, "input", input_width)?;
        push_field(&mut targets, &record.target, "target", target_width)?;
    }

    if count != declared_length {
        match policy {
            LengthPolicy::Strict => {
                return Err(DatasetError::LengthMismatch {
                    declared: declared_length,
                    actual: count,
                })
            }
            LengthPolicy::Declared if count < declared_length => {
                warn!("Only {} of {} declared records present", count, declared_length);
            }
            LengthPolicy::Declared => {}
        }
    }

    let rows = count.min(declared_length);
    let inputs = Array2::from_shape_vec((rows, input_width), inputs)
        .map_err(|e| DatasetError::InvalidConfig(format!("input layout: {}", e)))?;
    let targets = Array2::from_shape_vec((rows, target_width), targets)
        .map_err(|e| DatasetError::InvalidConfig(format!("target layout: {}", e)))?;
    debug!("Materialized {} records ({} declared)", rows, declared_length);

    Ok(MemoryDataset {
        inputs,
        targets,
        input_shape: input_shape.to_vec(),
        target_shape: target_shape.to_vec(),
        length: declared_length,
    })
}

fn push_field<T: FromPrimitive>(
    buf: &mut Vec<T>,
    field: &Array1<i64>,
    name: &'static str,
    width: usize,
) -> Result<()> {
    if field.len() != width {
        return Err(DatasetError::ShapeMismatch {
            field: name,
            expected: width,
            actual: field.len(),
        });
    }
    for &value in field.iter() {
        buf.push(T::from_i64(value).ok_or(DatasetError::Conversion { value })?);
    }
    Ok(())
}

impl<T> MemoryDataset<T> {
    /// The declared length of the dataset
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of records actually held. Only differs from `len` when
    /// materialized with `LengthPolicy::Declared` from a short file.
    pub fn rows(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn target_shape(&self) -> &[usize] {
        &self.target_shape
    }

    pub fn inputs(&self) -> ArrayView2<'_, T> {
        self.inputs.view()
    }

    pub fn targets(&self) -> ArrayView2<'_, T> {
        self.targets.view()
    }

    pub fn get(&self, index: usize) -> Option<RecordView<'_, T>> {
        if index >= self.rows() {
            return None;
        }
        Some(RecordView {
            input: self.inputs.row(index),
            target: self.targets.row(index),
        })
    }

    /// Inputs and targets of a contiguous range of records
    pub fn slice(&self, range: Range<usize>) -> Option<(ArrayView2<'_, T>, ArrayView2<'_, T>)> {
        if range.start > range.end || range.end > self.rows() {
            return None;
        }
        Some((
            self.inputs.slice(s![range.clone(), ..]),
            self.targets.slice(s![range, ..]),
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordView<'_, T>> {
        self.inputs
            .outer_iter()
            .zip(self.targets.outer_iter())
            .map(|(input, target)| RecordView { input, target })
    }
}

impl<T: Clone> MemoryDataset<T> {
    /// Input of record `index` in its declared shape
    pub fn input_array(&self, index: usize) -> Option<ArrayD<T>> {
        let record = self.get(index)?;
        record.input.to_owned().into_shape(IxDyn(&self.input_shape)).ok()
    }

    pub fn target_array(&self, index: usize) -> Option<ArrayD<T>> {
        let record = self.get(index)?;
        record.target.to_owned().into_shape(IxDyn(&self.target_shape)).ok()
    }
}
