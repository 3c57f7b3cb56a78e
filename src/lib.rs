//! Hessian estimation for stacked autoencoder classifiers.
//!
//! The hessian of the loss is approximated by the covariance of the
//! per-example parameter gradients. The covariance is computed in full and
//! eigendecomposed; the sorted eigenpairs are written as text files.
pub mod cli;
pub mod criterion;
pub mod dataset;
pub mod error;
pub mod estimator;
pub mod model;
pub mod output;
pub mod params;
pub mod spectrum;
pub mod synthetic;

pub use criterion::ClassNllCriterion;
pub use dataset::{ClassDataSet, MatDataSet, OneHotClassFormat};
pub use error::{Error, Result};
pub use estimator::{estimate_hessian, Eigenpairs, Estimate};
pub use model::{load_model, save_model, Model, StackedAutoencoder};
pub use params::ParameterGroups;

/// Return a string for representing the dimensions.
pub fn format_dims(dims: &[usize]) -> String {
    let mut s = String::new();
    for (i, dim) in dims.iter().enumerate() {
        if i > 0 {
            s.push('x');
        }
        s.push_str(&format!("{}", dim));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::format_dims;

    #[test]
    fn dims_are_joined_with_x() {
        assert_eq!(format_dims(&[3, 4]), "3x4");
        assert_eq!(format_dims(&[7]), "7");
        assert_eq!(format_dims(&[]), "");
    }
}
