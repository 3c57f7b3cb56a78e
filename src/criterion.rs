//! Negative log-likelihood on one-hot class targets.
use crate::dataset::OneHotClassFormat;

/// NLL criterion for models whose outputs are log-probabilities.
///
/// The criterion sits at the top of the chain, so its backward pass takes no
/// upstream gradient: `beta` only depends on the target class.
#[derive(Clone, Debug)]
pub struct ClassNllCriterion {
    format: OneHotClassFormat,
}

impl ClassNllCriterion {
    pub fn new(format: OneHotClassFormat) -> ClassNllCriterion {
        ClassNllCriterion { format }
    }

    /// Loss of one example.
    pub fn forward(&self, outputs: &[f64], target: &[f64]) -> f64 {
        -outputs[self.format.class_of(target)]
    }

    /// Gradient of the loss with respect to `outputs`.
    pub fn backward(&self, outputs: &[f64], target: &[f64]) -> Vec<f64> {
        let mut beta = vec![0.0; outputs.len()];
        beta[self.format.class_of(target)] = -1.0;
        beta
    }
}
