use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strum::IntoEnumIterator;

use cmnist_lib::datasets::corrupted_mnist::DatasetHandle;
use cmnist_lib::datasets::prepare;
use cmnist_lib::{Config, CorruptedMnistParams, Split};

/// Loading and preparation of the corrupted MNIST dataset
#[derive(Parser, Debug)]
#[command(name = "corrupted_mnist", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the three splits and print their metadata
    Inspect {
        dir: PathBuf,
        /// Parse every split into memory instead of reading lazily
        #[arg(long)]
        load_to_memory: bool,
        /// Dataset parameters as a ron file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Download the source matrices and write the split text files
    Obtain {
        dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_params(config: Option<&PathBuf>) -> Result<CorruptedMnistParams> {
    let mut params = CorruptedMnistParams::default();
    if let Some(path) = config {
        let serialized = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        params.load_config(&serialized)?;
    }
    Ok(params)
}

fn inspect(dir: &Path, load_to_memory: bool, params: &CorruptedMnistParams) -> Result<()> {
    let splits = params
        .load(dir, load_to_memory)
        .with_context(|| format!("Failed to load dataset from {:?}", dir))?;

    for split in Split::iter() {
        let Some((handle, meta)) = splits.get(&split) else {
            continue;
        };
        let storage = match handle {
            DatasetHandle::Lazy(records) => format!("lazy, {:?}", records.path()),
            DatasetHandle::Memory(data) => format!("in memory, {} records held", data.rows()),
        };
        println!(
            "{:<6} input_size={} target_size={} length={} ({})",
            split, meta.input_size, meta.target_size, meta.length, storage
        );
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Inspect { dir, load_to_memory, config } => {
            let params = load_params(config.as_ref())?;
            inspect(&dir, load_to_memory, &params)
        }
        Command::Obtain { dir, config } => {
            let params = load_params(config.as_ref())?;
            prepare::obtain_from(&dir, prepare::BASE_URL, &params)
                .with_context(|| format!("Failed to obtain dataset into {:?}", dir))
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
