use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DatasetError, Result};

/// Turns one line of text into a value, or explains why it can't.
pub trait LineParser {
    type Output;
    fn parse_line(&self, line: &str) -> std::result::Result<Self::Output, String>;
}

impl<T, F> LineParser for F
where
    F: Fn(&str) -> std::result::Result<T, String>,
{
    type Output = T;

    fn parse_line(&self, line: &str) -> std::result::Result<T, String> {
        self(line)
    }
}

/// A file of records, one per line, parsed on demand.
///
/// Nothing is kept in memory: every call to [`LineRecords::iter`] opens the
/// file again and walks it from the start, so iterations are independent of
/// each other and the sequence can be restarted at will.
#[derive(Clone)]
pub struct LineRecords<P> {
    path: PathBuf,
    parser: P,
}

impl<P> fmt::Debug for LineRecords<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineRecords").field("path", &self.path).finish()
    }
}

impl<P: LineParser> LineRecords<P> {
    /// Fails right away if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, parser: P) -> Result<Self> {
        let path = path.into();
        File::open(&path).map_err(|e| DatasetError::io(&path, e))?;
        debug!("Opened record file {:?}", path);
        Ok(Self { path, parser })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn iter(&self) -> Result<LineIter<'_, P>> {
        let file = File::open(&self.path).map_err(|e| DatasetError::io(&self.path, e))?;
        Ok(LineIter {
            path: &self.path,
            parser: &self.parser,
            lines: BufReader::new(file).lines(),
            line: 0,
            done: false,
        })
    }
}

/// Lazily reads `path`, applying `parser` to every line.
pub fn iterate_records<P: LineParser>(path: impl Into<PathBuf>, parser: P) -> Result<LineRecords<P>> {
    LineRecords::open(path, parser)
}

/// A single pass over a record file. The file handle is owned by the
/// iterator and closed when it is dropped.
pub struct LineIter<'a, P> {
    path: &'a Path,
    parser: &'a P,
    lines: io::Lines<BufReader<File>>,
    line: usize,
    done: bool,
}

impl<'a, P> LineIter<'a, P> {
    /// 1-based number of the last line read
    pub fn line_number(&self) -> usize {
        self.line
    }
}

impl<'a, P: LineParser> Iterator for LineIter<'a, P> {
    type Item = Result<P::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let text = match self.lines.next()? {
            Ok(text) => text,
            Err(e) => {
                self.done = true;
                return Some(Err(DatasetError::io(self.path, e)));
            }
        };
        self.line += 1;
        let parsed = self.parser.parse_line(&text).map_err(|reason| DatasetError::Parse {
            path: self.path.to_path_buf(),
            line: self.line,
            reason,
        });
        Some(parsed)
    }
}
