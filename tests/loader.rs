use std::fs;
use std::path::Path;

use itertools::Itertools;
use ndarray::prelude::*;
use strum::IntoEnumIterator;
use tempfile::TempDir;

use cmnist_lib::datasets::prepare::write_split;
use cmnist_lib::datasets::{LengthPolicy, Record};
use cmnist_lib::error::{DatasetError, Result};
use cmnist_lib::{load, CorruptedMnistParams, Split};

const WIDTH: usize = 784;

/// A deterministic full width line: input pixels set where (row + i) % 3 == 0,
/// target pixels where (row + i) % 5 == 0.
fn line(row: usize) -> String {
    (0..WIDTH)
        .map(|i| ((row + i) % 3 == 0) as u8)
        .chain((0..WIDTH).map(|i| ((row + i) % 5 == 0) as u8))
        .join(" ")
}

fn write_file(dir: &Path, split: Split, rows: usize) {
    let mut content = (0..rows).map(line).join("\n");
    content.push('\n');
    fs::write(dir.join(format!("corrupted_mnist_{}.txt", split)), content).unwrap();
}

fn dataset_dir(rows: [usize; 3]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (split, n) in Split::iter().zip(rows) {
        write_file(dir.path(), split, n);
    }
    dir
}

/// Default format, with declared lengths small enough for test files
fn params(lengths: [usize; 3]) -> CorruptedMnistParams {
    CorruptedMnistParams {
        train_length: lengths[0],
        valid_length: lengths[1],
        test_length: lengths[2],
        ..Default::default()
    }
}

#[test]
fn eager_load_matching_lengths() {
    let dir = dataset_dir([4, 2, 3]);
    let splits = params([4, 2, 3]).load(dir.path(), true).unwrap();
    assert_eq!(splits.len(), 3);

    for split in Split::iter() {
        let (handle, meta) = &splits[&split];
        assert!(handle.is_materialized());
        let data = handle.as_memory().unwrap();
        assert_eq!(data.len(), meta.length);
        assert_eq!(data.input_shape(), &[WIDTH]);
        assert_eq!(data.target_shape(), &[WIDTH]);
        for record in data.iter() {
            assert_eq!(record.input.len(), WIDTH);
            assert_eq!(record.target.len(), WIDTH);
        }
    }

    let train = splits[&Split::Train].0.as_memory().unwrap();
    let first = train.get(0).unwrap();
    assert_eq!(first.input[0], 1.0);
    assert_eq!(first.input[1], 0.0);
    assert_eq!(first.target[5], 1.0);
    assert_eq!(first.input.sum(), 262.0);
}

#[test]
fn eager_load_mismatching_lengths() {
    let dir = dataset_dir([3, 2, 2]);

    let err = params([5, 2, 2]).load(dir.path(), true).unwrap_err();
    assert!(matches!(err, DatasetError::LengthMismatch { declared: 5, actual: 3 }));

    let legacy = CorruptedMnistParams {
        length_policy: LengthPolicy::Declared,
        ..params([5, 2, 1])
    };
    let splits = legacy.load(dir.path(), true).unwrap();
    let train = splits[&Split::Train].0.as_memory().unwrap();
    assert_eq!(train.len(), 5);
    assert_eq!(train.rows(), 3);
    assert!(train.get(4).is_none());
    let test = splits[&Split::Test].0.as_memory().unwrap();
    assert_eq!(test.len(), 1);
    assert_eq!(test.rows(), 1);
}

#[test]
fn all_splits_present_for_empty_files() {
    let dir = dataset_dir([0, 0, 0]);
    let lazy = load(dir.path(), false).unwrap();
    let keys: Vec<_> = Split::iter().filter(|s| lazy.contains_key(s)).collect();
    assert_eq!(keys, [Split::Train, Split::Valid, Split::Test]);

    let eager = params([0, 0, 0]).load(dir.path(), true).unwrap();
    assert_eq!(eager.len(), 3);
    assert!(eager.values().all(|(h, _)| h.as_memory().unwrap().is_empty()));
}

#[test]
fn lazy_matches_eager() {
    let dir = dataset_dir([5, 3, 2]);
    let p = params([5, 3, 2]);
    let lazy = p.load(dir.path(), false).unwrap();
    let eager = p.load(dir.path(), true).unwrap();

    for split in Split::iter() {
        assert!(!lazy[&split].0.is_materialized());
        let records = lazy[&split].0.as_lazy().unwrap();
        let data = eager[&split].0.as_memory().unwrap();
        let mut count = 0;
        for (i, record) in records.iter().unwrap().enumerate() {
            let record = record.unwrap();
            let stored = data.get(i).unwrap();
            assert_eq!(record.input.mapv(|x| x as f64), stored.input);
            assert_eq!(record.target.mapv(|x| x as f64), stored.target);
            count += 1;
        }
        assert_eq!(count, data.rows());
    }
}

#[test]
fn lazy_sequence_restarts() {
    let dir = dataset_dir([3, 1, 1]);
    let splits = load(dir.path(), false).unwrap();
    let records = splits[&Split::Train].0.as_lazy().unwrap();

    let first: Vec<Record> = records.iter().unwrap().collect::<Result<_>>().unwrap();
    // stop early, then start over
    let partial = records.iter().unwrap().next().unwrap().unwrap();
    let second: Vec<Record> = records.iter().unwrap().collect::<Result<_>>().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(partial, first[0]);
}

#[test]
fn metadata_is_declared() {
    let dir = dataset_dir([2, 1, 1]);
    for load_to_memory in [false, true] {
        let p = CorruptedMnistParams {
            length_policy: LengthPolicy::Declared,
            ..Default::default()
        };
        let splits = p.load(dir.path(), load_to_memory).unwrap();
        let expected = [(Split::Train, 50000), (Split::Valid, 10000), (Split::Test, 10000)];
        for (split, length) in expected {
            let meta = splits[&split].1;
            assert_eq!(meta.input_size, 784);
            assert_eq!(meta.target_size, 784);
            assert_eq!(meta.length, length);
        }
    }
}

#[test]
fn missing_valid_file() {
    let dir = dataset_dir([1, 1, 1]);
    fs::remove_file(dir.path().join("corrupted_mnist_valid.txt")).unwrap();

    for load_to_memory in [false, true] {
        match params([1, 1, 1]).load(dir.path(), load_to_memory) {
            Err(DatasetError::NotFound { path }) => {
                assert!(path.ends_with("corrupted_mnist_valid.txt"))
            }
            other => panic!("expected NotFound, got {:?}", other.map(|s| s.len())),
        }
    }
}

#[test]
fn short_line_fails_eagerly() {
    let dir = dataset_dir([2, 1, 1]);
    let bad = format!("{}\n1 0 1\n", line(0));
    fs::write(dir.path().join("corrupted_mnist_test.txt"), bad).unwrap();

    match params([2, 1, 2]).load(dir.path(), true) {
        Err(DatasetError::Parse { path, line, .. }) => {
            assert!(path.ends_with("corrupted_mnist_test.txt"));
            assert_eq!(line, 2);
        }
        other => panic!("expected Parse, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn short_line_fails_on_touch() {
    let dir = dataset_dir([2, 1, 1]);
    let bad = format!("{}\n1 0 1\n{}\n", line(0), line(1));
    fs::write(dir.path().join("corrupted_mnist_train.txt"), bad).unwrap();

    let splits = load(dir.path(), false).unwrap();
    let records = splits[&Split::Train].0.as_lazy().unwrap();
    let mut iter = records.iter().unwrap();
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(iter.next().unwrap(), Err(DatasetError::Parse { line: 2, .. })));
    assert!(iter.next().unwrap().is_ok());
}

#[test]
fn blank_middle_line_fails_eagerly() {
    let dir = dataset_dir([2, 2, 2]);
    for split in Split::iter() {
        let content = format!("{}\n\n{}\n", line(0), line(1));
        fs::write(dir.path().join(format!("corrupted_mnist_{}.txt", split)), content).unwrap();
    }

    match params([2, 2, 2]).load(dir.path(), true) {
        Err(DatasetError::Parse { path, line, reason }) => {
            assert!(path.ends_with("corrupted_mnist_train.txt"));
            assert_eq!(line, 2);
            assert_eq!(reason, "expected 1568 tokens, found 0");
        }
        other => panic!("expected Parse, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn blank_middle_line_fails_on_touch() {
    let dir = dataset_dir([2, 2, 2]);
    let content = format!("{}\n\n{}\n", line(0), line(1));
    fs::write(dir.path().join("corrupted_mnist_valid.txt"), content).unwrap();

    let splits = load(dir.path(), false).unwrap();
    let records = splits[&Split::Valid].0.as_lazy().unwrap();
    let results: Vec<_> = records.iter().unwrap().collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(DatasetError::Parse { line: 2, .. })));
    assert!(results[2].is_ok());
}

#[test]
fn tilde_directory() {
    let home = match std::env::var_os("HOME") {
        Some(home) => home,
        None => return,
    };
    let dir = match tempfile::Builder::new().prefix("cmnist").tempdir_in(&home) {
        Ok(dir) => dir,
        Err(_) => return,
    };
    for split in Split::iter() {
        write_file(dir.path(), split, 1);
    }
    let name = dir.path().file_name().unwrap().to_str().unwrap();
    let splits = params([1, 1, 1]).load(format!("~/{}", name), true).unwrap();
    assert_eq!(splits[&Split::Valid].0.as_memory().unwrap().rows(), 1);
}

#[test]
fn prepared_files_load_back() {
    let dir = TempDir::new().unwrap();
    let u = Array2::from_shape_fn((3, WIDTH), |(r, c)| ((r * 31 + c * 7) % 256) as u8);
    let v = Array2::from_shape_fn((3, WIDTH), |(r, c)| ((r * 13 + c * 3) % 256) as u8);
    for split in Split::iter() {
        let file = fs::File::create(dir.path().join(format!("corrupted_mnist_{}.txt", split))).unwrap();
        write_split(u.view(), v.view(), file).unwrap();
    }

    let splits = params([3, 3, 3]).load(dir.path(), true).unwrap();
    let data = splits[&Split::Test].0.as_memory().unwrap();
    let expected_input = u.mapv(|x| if x > 127 { 1.0 } else { 0.0 });
    let expected_target = v.mapv(|x| if x > 127 { 1.0 } else { 0.0 });
    assert_eq!(data.inputs(), expected_input);
    assert_eq!(data.targets(), expected_target);
}
