//! The corrupted MNIST dataset: binary MNIST digits with a random subset of
//! pixels flipped, paired with the clean digit to reconstruct.
//!
//! Each split is a text file of `input_size + target_size` whitespace
//! separated integers per line, the corrupted image first.

use std::collections::HashMap;
use std::env;
use std::path::{Component, Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use tracing::info;

use super::lines::{LineParser, LineRecords};
use super::memory::{materialize, MemoryDataset};
use super::{LengthPolicy, Record};
use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

/// Format and size parameters of the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptedMnistParams {
    pub input_size: usize,
    pub target_size: usize,
    pub train_length: usize,
    pub valid_length: usize,
    pub test_length: usize,
    pub file_prefix: String,
    pub length_policy: LengthPolicy,
}

impl Default for CorruptedMnistParams {
    fn default() -> Self {
        Self {
            input_size: 784,
            target_size: 784,
            train_length: 50000,
            valid_length: 10000,
            test_length: 10000,
            file_prefix: "corrupted_mnist_".into(),
            length_policy: LengthPolicy::Strict,
        }
    }
}

/// Per split metadata, independent of whether the split was materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub input_size: usize,
    pub target_size: usize,
    pub length: usize,
}

/// Decodes a line into a record, splitting the tokens at `input_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordParser {
    pub input_size: usize,
    pub target_size: usize,
}

impl LineParser for RecordParser {
    type Output = Record;

    fn parse_line(&self, line: &str) -> std::result::Result<Record, String> {
        let expected = self.input_size + self.target_size;
        let tokens = line
            .split_whitespace()
            .map(|t| t.parse::<i64>().map_err(|e| format!("bad token {:?}: {}", t, e)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if tokens.len() != expected {
            return Err(format!("expected {} tokens, found {}", expected, tokens.len()));
        }
        let mut input = tokens;
        let target = input.split_off(self.input_size);
        Ok(Record {
            input: Array1::from_vec(input),
            target: Array1::from_vec(target),
        })
    }
}

pub type SplitRecords = LineRecords<RecordParser>;

/// The data of one split: either still on disk, or read into memory.
#[derive(Debug, Clone)]
pub enum DatasetHandle {
    Lazy(SplitRecords),
    Memory(MemoryDataset<f64>),
}

impl DatasetHandle {
    pub fn is_materialized(&self) -> bool {
        matches!(self, DatasetHandle::Memory(_))
    }

    pub fn as_lazy(&self) -> Option<&SplitRecords> {
        match self {
            DatasetHandle::Lazy(records) => Some(records),
            DatasetHandle::Memory(_) => None,
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryDataset<f64>> {
        match self {
            DatasetHandle::Memory(data) => Some(data),
            DatasetHandle::Lazy(_) => None,
        }
    }
}

pub type SplitMap = HashMap<Split, (DatasetHandle, Metadata)>;

/// Loads the train, valid and test splits from `dir` with the default
/// parameters. See [`CorruptedMnistParams::load`].
pub fn load(dir: impl AsRef<Path>, load_to_memory: bool) -> Result<SplitMap> {
    CorruptedMnistParams::default().load(dir, load_to_memory)
}

impl CorruptedMnistParams {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.target_size == 0 {
            return Err(DatasetError::InvalidConfig(
                "input and target sizes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn length(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train_length,
            Split::Valid => self.valid_length,
            Split::Test => self.test_length,
        }
    }

    pub fn file_name(&self, split: Split) -> String {
        format!("{}{}.txt", self.file_prefix, split)
    }

    pub fn split_path(&self, dir: &Path, split: Split) -> PathBuf {
        dir.join(self.file_name(split))
    }

    pub fn parser(&self) -> RecordParser {
        RecordParser {
            input_size: self.input_size,
            target_size: self.target_size,
        }
    }

    pub fn metadata(&self, split: Split) -> Metadata {
        Metadata {
            input_size: self.input_size,
            target_size: self.target_size,
            length: self.length(split),
        }
    }

    /// Loads all three splits found in `dir` (a leading `~` is expanded).
    ///
    /// Every split file is opened before anything is read, so a missing
    /// file is reported as `NotFound` whether or not `load_to_memory` is set.
    /// With `load_to_memory` each split is parsed completely and held as
    /// `f64`; otherwise the returned handles read their file on each pass.
    pub fn load(&self, dir: impl AsRef<Path>, load_to_memory: bool) -> Result<SplitMap> {
        self.validate()?;
        let dir = expand_user(dir.as_ref());

        let opened = Split::iter()
            .map(|split| -> Result<_> {
                let records = LineRecords::open(self.split_path(&dir, split), self.parser())?;
                Ok((split, records))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut splits = SplitMap::with_capacity(opened.len());
        for (split, records) in opened {
            let meta = self.metadata(split);
            let handle = if load_to_memory {
                let data: MemoryDataset<f64> = materialize(
                    records.iter()?,
                    [&[self.input_size], &[self.target_size]],
                    meta.length,
                    self.length_policy,
                )?;
                info!("Loaded {} split into memory: {} records", split, data.rows());
                DatasetHandle::Memory(data)
            } else {
                info!("Prepared lazy {} split from {:?}", split, records.path());
                DatasetHandle::Lazy(records)
            };
            splits.insert(split, (handle, meta));
        }
        Ok(splits)
    }
}

/// Replaces a leading `~` component with the user's home directory.
///
/// Only the current user's home is resolved; `~name/...` forms and paths
/// without a leading `~` are returned unchanged.
pub fn expand_user(path: &Path) -> PathBuf {
    let mut components = path.components();
    if let Some(Component::Normal(first)) = components.next() {
        if first == "~" {
            if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
                return PathBuf::from(home).join(components.as_path());
            }
        }
    }
    path.to_path_buf()
}
