pub mod datasets;
pub mod error;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub use datasets::corrupted_mnist::{self, load, CorruptedMnistParams, Metadata, Split, SplitMap};
pub use error::DatasetError;

/// Parameters that can be saved to disk and restored, serialized as ron.
pub trait Config {
    fn config(&self) -> Result<String>;
    fn load_config(&mut self, config: &str) -> Result<()>;
}

impl<T: Serialize + DeserializeOwned> Config for T {
    fn config(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize config")
    }
    fn load_config(&mut self, config: &str) -> Result<()> {
        *self = ron::from_str(config).context(format!("Failed to load config {}", config))?;
        Ok(())
    }
}
