//! Hessian estimation through the covariance of per-example gradients.
//!
//! The pipeline collects one gradient row per example, centers the rows,
//! forms `G^T G / (N - 1)` and eigendecomposes it. Eigenpairs are sorted by
//! descending eigenvalue with a selection sort that keeps the first maximum
//! on ties.
use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatRef, Par, Side};
use tracing::{debug, info};

use crate::criterion::ClassNllCriterion;
use crate::dataset::ClassDataSet;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::format_dims;

/// Eigenvalues and the matching eigenvectors, stored as the columns of
/// `vectors`.
#[derive(Clone, Debug)]
pub struct Eigenpairs {
    pub values: Vec<f64>,
    pub vectors: Mat<f64>,
}

/// Everything the estimator produces.
#[derive(Clone, Debug)]
pub struct Estimate {
    pub n_examples: usize,
    pub n_params: usize,
    /// Mean squared L2 norm of the gradient rows.
    pub mean_norm2: f64,
    /// Mean gradient.
    pub mean: Vec<f64>,
    /// Sorted eigenpairs of the gradient covariance.
    pub eigen: Eigenpairs,
}

/// Reports progress at each 10% boundary. The test is strict, so the 100%
/// mark is never reported.
struct Progress {
    n_examples: usize,
    tick: usize,
}

impl Progress {
    fn new(n_examples: usize) -> Progress {
        Progress {
            n_examples,
            tick: 1,
        }
    }

    /// Percentage reached after example `i`, if a new boundary was crossed.
    fn update(&mut self, i: usize) -> Option<usize> {
        if i as f64 / self.n_examples as f64 > self.tick as f64 / 10.0 {
            let percent = self.tick * 10;
            self.tick += 1;
            Some(percent)
        } else {
            None
        }
    }
}

/// Run forward/backward on every example and store the gradients row by row.
///
/// Columns follow the model's parameter group order. `der_params` is zeroed
/// before the first example and after every row is saved, so gradients never
/// leak from one example into the next.
pub fn collect_gradients<M: Model + ?Sized>(
    model: &mut M,
    criterion: &ClassNllCriterion,
    data: &ClassDataSet,
) -> Mat<f64> {
    let n_examples = data.n_examples();
    let n_params = model.der_params().total_len();
    let mut gradients = Mat::<f64>::zeros(n_examples, n_params);

    model.der_params_mut().zero();

    let mut total_loss = 0.0;
    let mut progress = Progress::new(n_examples);
    for i in 0..n_examples {
        let inputs = data.inputs(i);
        let target = data.target(i);

        let outputs = model.forward(inputs).to_vec();
        total_loss += criterion.forward(&outputs, &target);
        let beta = criterion.backward(&outputs, &target);
        model.backward(inputs, &beta);

        // Save the gradients, then clear them for the next example
        let der_params = model.der_params();
        let mut col = 0;
        for group in 0..der_params.n_groups() {
            for &g in der_params.group(group) {
                gradients[(i, col)] = g;
                col += 1;
            }
        }
        model.der_params_mut().zero();

        if let Some(percent) = progress.update(i) {
            info!("{}% of the examples processed", percent);
        }
    }
    if n_examples > 0 {
        debug!("mean loss = {}", total_loss / n_examples as f64);
    }
    gradients
}

/// Mean over rows of the squared L2 norm of each row.
pub fn mean_norm2(gradients: MatRef<'_, f64>) -> f64 {
    let n_examples = gradients.nrows();
    let mut total = 0.0;
    for i in 0..n_examples {
        let mut norm2 = 0.0;
        for j in 0..gradients.ncols() {
            let g = gradients[(i, j)];
            norm2 += g * g;
        }
        total += norm2;
    }
    total / n_examples as f64
}

/// Plain arithmetic mean of each column.
pub fn column_mean(gradients: MatRef<'_, f64>) -> Vec<f64> {
    let mut mean = vec![0.0; gradients.ncols()];
    for i in 0..gradients.nrows() {
        for (j, m) in mean.iter_mut().enumerate() {
            *m += gradients[(i, j)];
        }
    }
    let inv_n_examples = 1.0 / gradients.nrows() as f64;
    for m in &mut mean {
        *m *= inv_n_examples;
    }
    mean
}

/// Subtract `mean` from every row in place.
pub fn center_rows(gradients: &mut Mat<f64>, mean: &[f64]) {
    assert_eq!(gradients.ncols(), mean.len());
    for j in 0..gradients.ncols() {
        for i in 0..gradients.nrows() {
            gradients[(i, j)] -= mean[j];
        }
    }
}

/// `G^T G / (N - 1)` for centered gradients `G`.
///
/// Takes the gradient matrix by value and releases it as soon as the
/// product exists.
pub fn covariance(gradients: Mat<f64>) -> Result<Mat<f64>> {
    let n_examples = gradients.nrows();
    if n_examples < 2 {
        return Err(Error::Shape(format!(
            "the covariance needs at least 2 examples, got {}",
            n_examples
        )));
    }
    let n_params = gradients.ncols();
    let mut covariance = Mat::<f64>::zeros(n_params, n_params);
    matmul(
        covariance.as_mut(),
        Accum::Replace,
        gradients.as_ref().transpose(),
        gradients.as_ref(),
        1.0,
        Par::Seq,
    );
    drop(gradients);

    let scale = 1.0 / (n_examples as f64 - 1.0);
    for j in 0..n_params {
        for i in 0..n_params {
            covariance[(i, j)] *= scale;
        }
    }
    Ok(covariance)
}

/// Symmetric eigendecomposition. The pairs come back in solver order.
pub fn symmetric_eigen(covariance: MatRef<'_, f64>) -> Result<Eigenpairs> {
    let eig = covariance
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| Error::Eigen(format!("{:?}", err)))?;
    let diag = eig.S().column_vector();
    let values = (0..diag.nrows()).map(|i| diag[i]).collect();
    let vectors = eig.U().to_owned();
    Ok(Eigenpairs { values, vectors })
}

/// Swap two full columns of `m`.
pub fn swap_columns(m: &mut Mat<f64>, a: usize, b: usize) {
    if a == b {
        return;
    }
    for row in 0..m.nrows() {
        let tmp = m[(row, a)];
        m[(row, a)] = m[(row, b)];
        m[(row, b)] = tmp;
    }
}

/// Selection sort into descending order, moving eigenvector columns along
/// with their eigenvalues. On ties the earlier pair stays first.
pub fn sort_descending(pairs: &mut Eigenpairs) {
    let d = &mut pairs.values;
    let n = d.len();
    for i in 0..n {
        let mut max_index = i;
        let mut max_value = d[i];
        for j in i + 1..n {
            if max_value < d[j] {
                max_value = d[j];
                max_index = j;
            }
        }
        d[max_index] = d[i];
        d[i] = max_value;
        swap_columns(&mut pairs.vectors, i, max_index);
    }
}

/// Run the whole estimation on `data`.
pub fn estimate_hessian<M: Model + ?Sized>(
    model: &mut M,
    criterion: &ClassNllCriterion,
    data: &ClassDataSet,
) -> Result<Estimate> {
    let n_examples = data.n_examples();
    let n_params = model.der_params().total_len();
    info!("{} parameters.", n_params);
    if n_examples < 2 {
        return Err(Error::Shape(format!(
            "at least 2 examples are required, got {}",
            n_examples
        )));
    }
    if data.n_inputs() != model.n_inputs() {
        return Err(Error::Shape(format!(
            "the data has {} inputs but the model expects {}",
            data.n_inputs(),
            model.n_inputs()
        )));
    }
    if data.class_format().n_classes() != model.n_outputs() {
        return Err(Error::Shape(format!(
            "the data has {} classes but the model has {} outputs",
            data.class_format().n_classes(),
            model.n_outputs()
        )));
    }

    debug!(
        "gradient matrix {}, covariance {}",
        format_dims(&[n_examples, n_params]),
        format_dims(&[n_params, n_params])
    );
    let mut gradients = collect_gradients(model, criterion, data);

    let mean_norm2 = mean_norm2(gradients.as_ref());
    info!("mean_norm2 = {}", mean_norm2);

    info!("Computing the mean of the gradients.");
    let mean = column_mean(gradients.as_ref());

    info!("Centering the gradients.");
    center_rows(&mut gradients, &mean);

    info!("Computing the covariance.");
    let covariance = covariance(gradients)?;

    info!("Performing the eigendecomposition.");
    let mut eigen = symmetric_eigen(covariance.as_ref())?;
    drop(covariance);

    info!("Sorting the eigen values-vectors");
    sort_descending(&mut eigen);

    Ok(Estimate {
        n_examples,
        n_params,
        mean_norm2,
        mean,
        eigen,
    })
}
