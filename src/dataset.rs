//! Tabular datasets with a one-hot class encoding.
//!
//! A data file holds a matrix of `n_rows x n_cols` reals. In ASCII mode the
//! first two numbers are the dimensions followed by the values in row-major
//! order (lines starting with `#` are skipped). In binary mode the header is
//! two little-endian `i32` followed by little-endian `f32` values. Either form
//! may be bzip2-compressed when the file name ends in `.bz2`.
use bzip2::read::BzDecoder;
use std::collections::VecDeque;
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Whitespace separated tokens of an ASCII data file.
pub struct TokenStream<R: BufRead> {
    stream: R,
    line_buf: String,
    pending: VecDeque<String>,
}

impl<R: BufRead> TokenStream<R> {
    pub fn new(stream: R) -> TokenStream<R> {
        TokenStream {
            stream,
            line_buf: String::new(),
            pending: VecDeque::new(),
        }
    }
}

impl<R: BufRead> Iterator for TokenStream<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            self.line_buf.clear();
            match self.stream.read_line(&mut self.line_buf) {
                // EOF
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }
            let line = self.line_buf.trim();
            // Skip comments
            if line.starts_with('#') {
                continue;
            }
            self.pending
                .extend(line.split_whitespace().map(|s| s.to_string()));
        }
    }
}

/// Open a data file, decompressing it on the fly if it ends in `.bz2`.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path).map_err(|err| Error::io(path, err))?;
    let is_bz2 = path
        .extension()
        .map(|ext| ext == "bz2")
        .unwrap_or(false);
    let reader = if is_bz2 {
        Box::new(BufReader::new(BzDecoder::new(f))) as Box<dyn BufRead>
    } else {
        Box::new(BufReader::new(f)) as Box<dyn BufRead>
    };
    Ok(reader)
}

/// Convert the command line `max_load` value, where anything <= 0 means
/// "load everything".
pub fn max_load_from_flag(max_load: i64) -> Option<usize> {
    if max_load > 0 {
        Some(max_load as usize)
    } else {
        None
    }
}

/// Dense real matrix loaded from disk, one example per row.
#[derive(Clone, Debug, PartialEq)]
pub struct MatDataSet {
    n_rows: usize,
    n_cols: usize,
    values: Vec<f64>,
}

impl MatDataSet {
    /// Build a dataset from row-major values.
    pub fn from_rows(n_cols: usize, values: Vec<f64>) -> Result<MatDataSet> {
        if n_cols == 0 || values.len() % n_cols != 0 {
            return Err(Error::Shape(format!(
                "{} values cannot be split into rows of {}",
                values.len(),
                n_cols
            )));
        }
        Ok(MatDataSet {
            n_rows: values.len() / n_cols,
            n_cols,
            values,
        })
    }

    /// Load `n_inputs + n_targets` columns from `path`, reading at most
    /// `max_load` rows.
    pub fn load<P: AsRef<Path>>(
        path: P,
        n_inputs: usize,
        n_targets: usize,
        max_load: Option<usize>,
        binary_mode: bool,
    ) -> Result<MatDataSet> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let data = if binary_mode {
            read_binary(reader, path, max_load)?
        } else {
            read_ascii(reader, path, max_load)?
        };
        if data.n_cols != n_inputs + n_targets {
            return Err(Error::Shape(format!(
                "{} has {} columns, expected {} inputs + {} targets",
                path.display(),
                data.n_cols,
                n_inputs,
                n_targets
            )));
        }
        tracing::debug!(
            path = %path.display(),
            rows = data.n_rows,
            cols = data.n_cols,
            "loaded data matrix"
        );
        Ok(data)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_cols..(i + 1) * self.n_cols]
    }
}

/// Number of rows to actually read given the header count and the cap.
fn capped_rows(n_rows: usize, max_load: Option<usize>) -> usize {
    match max_load {
        Some(max) if max < n_rows => max,
        _ => n_rows,
    }
}

/// Upper bound on the values reserved up front; the header is not trusted.
const MAX_RESERVED_VALUES: usize = 1 << 20;

/// Number of values announced by a `n_rows x n_cols` header.
fn value_count(path: &Path, n_rows: usize, n_cols: usize) -> Result<usize> {
    n_rows.checked_mul(n_cols).ok_or_else(|| {
        parse_error(
            path,
            format!("header dimensions {}x{} overflow", n_rows, n_cols),
        )
    })
}

fn parse_error(path: &Path, msg: String) -> Error {
    Error::Parse {
        path: PathBuf::from(path),
        msg,
    }
}

fn read_ascii<R: BufRead>(reader: R, path: &Path, max_load: Option<usize>) -> Result<MatDataSet> {
    let mut tokens = TokenStream::new(reader);
    let mut next_token = |what: &str| -> Result<String> {
        match tokens.next() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(Error::io(path, err)),
            None => Err(parse_error(path, format!("unexpected end of file reading {}", what))),
        }
    };

    let n_rows = next_token("row count")?;
    let n_rows = usize::from_str(&n_rows)
        .map_err(|_| parse_error(path, format!("invalid row count {:?}", n_rows)))?;
    let n_cols = next_token("column count")?;
    let n_cols = usize::from_str(&n_cols)
        .map_err(|_| parse_error(path, format!("invalid column count {:?}", n_cols)))?;

    let n_rows = capped_rows(n_rows, max_load);
    let count = value_count(path, n_rows, n_cols)?;
    let mut values = Vec::with_capacity(count.min(MAX_RESERVED_VALUES));
    for i in 0..count {
        let token = next_token("matrix values")
            .map_err(|_| parse_error(path, format!("expected {} values, found {}", count, i)))?;
        let value = f64::from_str(&token)
            .map_err(|_| parse_error(path, format!("invalid value {:?}", token)))?;
        values.push(value);
    }
    Ok(MatDataSet {
        n_rows,
        n_cols,
        values,
    })
}

fn read_i32<R: Read>(reader: &mut R, path: &Path) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|err| Error::io(path, err))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_binary<R: BufRead>(mut reader: R, path: &Path, max_load: Option<usize>) -> Result<MatDataSet> {
    let n_rows = read_i32(&mut reader, path)?;
    let n_cols = read_i32(&mut reader, path)?;
    if n_rows < 0 || n_cols < 0 {
        return Err(parse_error(
            path,
            format!("negative dimensions {}x{}", n_rows, n_cols),
        ));
    }
    let n_rows = capped_rows(n_rows as usize, max_load);
    let n_cols = n_cols as usize;

    let count = value_count(path, n_rows, n_cols)?;
    let mut values = Vec::with_capacity(count.min(MAX_RESERVED_VALUES));
    let mut buf = [0u8; 4];
    for i in 0..count {
        reader.read_exact(&mut buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                parse_error(path, format!("expected {} values, found {}", count, i))
            } else {
                Error::io(path, err)
            }
        })?;
        values.push(f32::from_le_bytes(buf) as f64);
    }
    Ok(MatDataSet {
        n_rows,
        n_cols,
        values,
    })
}

/// One-hot encoding of class labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OneHotClassFormat {
    n_classes: usize,
}

impl OneHotClassFormat {
    pub fn new(n_classes: usize) -> OneHotClassFormat {
        OneHotClassFormat { n_classes }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn encode(&self, label: usize) -> Vec<f64> {
        let mut target = vec![0.0; self.n_classes];
        target[label] = 1.0;
        target
    }

    /// Index of the largest entry of a one-hot (or score) vector.
    pub fn class_of(&self, target: &[f64]) -> usize {
        let mut best = 0;
        for (i, &value) in target.iter().enumerate() {
            if value > target[best] {
                best = i;
            }
        }
        best
    }
}

/// Classification view of a [`MatDataSet`]: the leading columns are the
/// inputs and the last column holds the class label.
#[derive(Clone, Debug)]
pub struct ClassDataSet {
    n_inputs: usize,
    format: OneHotClassFormat,
    inputs: Vec<f64>,
    labels: Vec<usize>,
}

impl ClassDataSet {
    pub fn new(data: &MatDataSet, n_inputs: usize, n_classes: usize) -> Result<ClassDataSet> {
        if data.n_cols() != n_inputs + 1 {
            return Err(Error::Shape(format!(
                "expected {} columns ({} inputs + label), found {}",
                n_inputs + 1,
                n_inputs,
                data.n_cols()
            )));
        }
        let mut inputs = Vec::with_capacity(data.n_rows() * n_inputs);
        let mut labels = Vec::with_capacity(data.n_rows());
        for i in 0..data.n_rows() {
            let row = data.row(i);
            inputs.extend_from_slice(&row[..n_inputs]);
            let value = row[n_inputs];
            if !(value >= 0.0 && value.fract() == 0.0 && (value as usize) < n_classes) {
                return Err(Error::Label { row: i, value });
            }
            labels.push(value as usize);
        }
        Ok(ClassDataSet {
            n_inputs,
            format: OneHotClassFormat::new(n_classes),
            inputs,
            labels,
        })
    }

    pub fn n_examples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn class_format(&self) -> &OneHotClassFormat {
        &self.format
    }

    pub fn inputs(&self, i: usize) -> &[f64] {
        &self.inputs[i * self.n_inputs..(i + 1) * self.n_inputs]
    }

    pub fn label(&self, i: usize) -> usize {
        self.labels[i]
    }

    /// One-hot target of example `i`.
    pub fn target(&self, i: usize) -> Vec<f64> {
        self.format.encode(self.labels[i])
    }
}
