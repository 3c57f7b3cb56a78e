//! Writers for the sorted eigenpairs.
//!
//! Results go to `hessian<label>/` under a root directory:
//! `eigenvals_full.txt` holds one eigenvalue per line and
//! `eigenvecs_full.txt` dumps the eigenvector matrix row by row, each value
//! followed by a space. The optional `.bin` files hold the same data as
//! little-endian `f64`.
use faer::MatRef;
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::estimator::Eigenpairs;

pub const EIGENVALS_TXT: &str = "eigenvals_full.txt";
pub const EIGENVECS_TXT: &str = "eigenvecs_full.txt";
pub const EIGENVALS_BIN: &str = "eigenvals_full.bin";
pub const EIGENVECS_BIN: &str = "eigenvecs_full.bin";

/// `hessian<label>` under `root`.
pub fn output_dir(root: &Path, label: &str) -> PathBuf {
    root.join(format!("hessian{}", label))
}

/// Create the output directory. Failures are only reported: the files may
/// still be writable if the directory already exists.
pub fn create_output_dir(dir: &Path) {
    if let Err(err) = std::fs::create_dir(dir) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            warn!("failed to create {}: {}", dir.display(), err);
        }
    }
}

pub fn write_eigenvalues<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    for value in values {
        writeln!(out, "{}", value)?;
    }
    Ok(())
}

/// Text dump of `vectors`: outer loop over rows, inner loop over columns.
pub fn write_eigenvectors<W: Write>(out: &mut W, vectors: MatRef<'_, f64>) -> io::Result<()> {
    for j in 0..vectors.nrows() {
        for k in 0..vectors.ncols() {
            write!(out, "{} ", vectors[(j, k)])?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_eigenvalues_binary<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    for value in values {
        out.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Binary dump of `vectors`, row-major.
pub fn write_eigenvectors_binary<W: Write>(
    out: &mut W,
    vectors: MatRef<'_, f64>,
) -> io::Result<()> {
    for j in 0..vectors.nrows() {
        for k in 0..vectors.ncols() {
            out.write_all(&vectors[(j, k)].to_le_bytes())?;
        }
    }
    Ok(())
}

/// Create `path` and hand a buffered writer to `write`.
fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let f = File::create(path).map_err(|err| Error::io(path, err))?;
    let mut buf = BufWriter::new(f);
    write(&mut buf)
        .and_then(|_| buf.flush())
        .map_err(|err| Error::io(path, err))
}

/// Save the sorted eigenpairs under `root/hessian<label>/` and return that
/// directory.
pub fn save_results(
    root: &Path,
    label: &str,
    pairs: &Eigenpairs,
    save_binary: bool,
) -> Result<PathBuf> {
    info!("Saving the results");
    let dir = output_dir(root, label);
    create_output_dir(&dir);

    write_file(&dir.join(EIGENVALS_TXT), |buf| {
        write_eigenvalues(buf, &pairs.values)
    })?;
    write_file(&dir.join(EIGENVECS_TXT), |buf| {
        write_eigenvectors(buf, pairs.vectors.as_ref())
    })?;

    if save_binary {
        write_file(&dir.join(EIGENVALS_BIN), |buf| {
            write_eigenvalues_binary(buf, &pairs.values)
        })?;
        write_file(&dir.join(EIGENVECS_BIN), |buf| {
            write_eigenvectors_binary(buf, pairs.vectors.as_ref())
        })?;
    }
    Ok(dir)
}
