//! Fetches the raw corrupted MNIST matrices and rewrites them as the
//! binary text files read by [`super::corrupted_mnist`].

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use curl::easy::Easy;
use itertools::Itertools;
use ndarray::prelude::*;
use ndarray::ShapeBuilder;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use super::corrupted_mnist::{expand_user, CorruptedMnistParams, Split};
use crate::error::{DatasetError, Result};

pub const BASE_URL: &str = "http://www.cs.toronto.edu/~larocheh/public/datasets/corrupted_mnist/";

/// Pixels strictly above this become 1, the rest 0
pub const THRESHOLD: u8 = 127;

/// Name of the matrix variable inside every source file
const MATRIX_NAME: &str = "dat";

/// Source file holding the corrupted (`u`) or clean (`v`) images of a split.
pub fn source_file(split: Split, clean: bool) -> String {
    let part = match split {
        Split::Train => "",
        Split::Valid => "valid_",
        Split::Test => "test_",
    };
    format!("mnist_corrupted_{}{}.mat", part, if clean { "v" } else { "u" })
}

/// Downloads the dataset into `dir` and writes the three split files.
pub fn obtain(dir: impl AsRef<Path>) -> Result<()> {
    obtain_from(dir, BASE_URL, &CorruptedMnistParams::default())
}

pub fn obtain_from(dir: impl AsRef<Path>, base_url: &str, params: &CorruptedMnistParams) -> Result<()> {
    let dir = expand_user(dir.as_ref());
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| DatasetError::io(&dir, e))?;
    }

    info!("Downloading the dataset to {:?}", dir);
    for split in Split::iter() {
        for clean in [false, true] {
            let name = source_file(split, clean);
            download(&format!("{}{}", base_url, name), &dir.join(&name))?;
        }
    }

    for split in Split::iter() {
        let u = read_matrix(&dir.join(source_file(split, false)))?;
        let v = read_matrix(&dir.join(source_file(split, true)))?;
        let out_path = params.split_path(&dir, split);
        let file = File::create(&out_path).map_err(|e| DatasetError::io(&out_path, e))?;
        let mut out = BufWriter::new(file);
        let rows = write_split(u.view(), v.view(), &mut out)?;
        out.flush().map_err(|e| DatasetError::io(&out_path, e))?;
        if rows != params.length(split) {
            warn!("{} split has {} rows, expected {}", split, rows, params.length(split));
        }
        info!("Wrote {} rows to {:?}", rows, out_path);
    }
    info!("Done");
    Ok(())
}

/// Writes one line per row pair: the thresholded `u` row followed by the
/// thresholded `v` row, space separated. Returns the number of lines written.
pub fn write_split<T, W>(u: ArrayView2<T>, v: ArrayView2<T>, mut out: W) -> Result<usize>
where
    T: Copy + PartialOrd + From<u8>,
    W: Write,
{
    if u.nrows() != v.nrows() {
        return Err(DatasetError::RowMismatch {
            inputs: u.nrows(),
            targets: v.nrows(),
        });
    }
    let threshold = T::from(THRESHOLD);
    for (u_row, v_row) in u.outer_iter().zip(v.outer_iter()) {
        let line = u_row
            .iter()
            .chain(v_row.iter())
            .map(|&x| if x > threshold { '1' } else { '0' })
            .join(" ");
        writeln!(out, "{}", line).map_err(|e| DatasetError::io("<split output>", e))?;
    }
    Ok(u.nrows())
}

/// Fetches `url` into `file_path`, unless the file is already there.
fn download(url: &str, file_path: &Path) -> Result<()> {
    if file_path.exists() {
        info!("  File {:?} already exists, skipping downloading.", file_path);
        return Ok(());
    }
    info!("- Downloading {} to {:?}", url, file_path);

    let failed = |reason: String| DatasetError::Download {
        url: url.to_string(),
        reason,
    };
    let mut easy = Easy::new();
    easy.url(url).map_err(|e| failed(e.to_string()))?;
    easy.follow_location(true).map_err(|e| failed(e.to_string()))?;

    // written next to the target and renamed once complete
    let partial = file_path.with_extension("part");
    let file = File::create(&partial).map_err(|e| DatasetError::io(&partial, e))?;
    let mut file = BufWriter::new(file);
    let status = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| Ok(if file.write_all(data).is_ok() { data.len() } else { 0 }))
            .map_err(|e| failed(e.to_string()))?;
        transfer.perform()
    };
    let result = status
        .map_err(|e| failed(e.to_string()))
        .and_then(|_| easy.response_code().map_err(|e| failed(e.to_string())))
        .and_then(|code| match code {
            200 => Ok(()),
            code => Err(failed(format!("HTTP status {}", code))),
        })
        .and_then(|_| file.flush().map_err(|e| DatasetError::io(&partial, e)));

    drop(file);
    match result {
        Ok(()) => fs::rename(&partial, file_path).map_err(|e| DatasetError::io(file_path, e)),
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

/// Reads the `dat` matrix of a MATLAB file, one image per row.
pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let bad = |reason: String| DatasetError::Matrix {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mat = matfile::MatFile::parse(BufReader::new(file)).map_err(|e| bad(format!("{:?}", e)))?;
    let array = mat
        .find_by_name(MATRIX_NAME)
        .ok_or_else(|| bad(format!("no `{}` variable", MATRIX_NAME)))?;

    let size = array.size();
    if size.len() != 2 {
        return Err(bad(format!("expected a 2d matrix, got dims {:?}", size)));
    }
    let values: Vec<f64> = match array.data() {
        matfile::NumericData::UInt8 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        matfile::NumericData::Double { real, .. } => real.clone(),
        matfile::NumericData::Single { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        _ => return Err(bad("unsupported element type".into())),
    };
    // matlab stores column major
    Array2::from_shape_vec((size[0], size[1]).f(), values).map_err(|e| bad(e.to_string()))
}
