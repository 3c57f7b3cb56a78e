//! Stacked autoencoder classifier.
//!
//! Each autoencoder layer owns an encoder (`weights`, `bias`) and a decoder
//! bias; the decoder shares the transposed encoder weights. The supervised
//! path only goes through the encoders and a final log-softmax output layer,
//! so the decoder bias gradients stay at zero.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Error, Result};
use crate::params::ParameterGroups;

/// A differentiable model with a gradient buffer laid out like its
/// parameters.
pub trait Model {
    fn n_inputs(&self) -> usize;

    fn n_outputs(&self) -> usize;

    fn params(&self) -> &ParameterGroups;

    fn der_params(&self) -> &ParameterGroups;

    fn der_params_mut(&mut self) -> &mut ParameterGroups;

    /// Run inference and return the outputs.
    fn forward(&mut self, inputs: &[f64]) -> &[f64];

    /// Back-propagate `beta`, the gradient of the loss with respect to the
    /// outputs of the last `forward` call. Gradients are added to
    /// `der_params`, never overwritten.
    fn backward(&mut self, inputs: &[f64], beta: &[f64]);
}

/// On-disk form of one autoencoder layer. Weights are row-major
/// `n_hidden x n_inputs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredLayer {
    pub n_inputs: usize,
    pub n_hidden: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
    pub recon_bias: Vec<f64>,
}

/// On-disk form of the output layer. Weights are row-major
/// `n_outputs x n_inputs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredOutput {
    pub n_inputs: usize,
    pub n_outputs: usize,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    pub layers: Vec<StoredLayer>,
    pub output: StoredOutput,
}

fn check_len(what: &str, found: usize, expected: usize) -> Result<()> {
    if found != expected {
        return Err(Error::Model(format!(
            "{} has {} entries, expected {}",
            what, found, expected
        )));
    }
    Ok(())
}

/// Entries of a row-major `n_out x n_in` weight matrix.
fn weight_count(what: &str, n_out: usize, n_in: usize) -> Result<usize> {
    n_out.checked_mul(n_in).ok_or_else(|| {
        Error::Model(format!("{} shape {}x{} overflows", what, n_out, n_in))
    })
}

impl StoredModel {
    /// Check that every layer chains into the next and that all buffers have
    /// the advertised sizes.
    pub fn validate(&self) -> Result<()> {
        let mut n_prev = None;
        for (k, layer) in self.layers.iter().enumerate() {
            if let Some(n_prev) = n_prev {
                if layer.n_inputs != n_prev {
                    return Err(Error::Model(format!(
                        "layer {} takes {} inputs but the previous layer has {} units",
                        k, layer.n_inputs, n_prev
                    )));
                }
            }
            let name = format!("encoder{}.weights", k);
            let expected = weight_count(&name, layer.n_hidden, layer.n_inputs)?;
            check_len(&name, layer.weights.len(), expected)?;
            check_len(&format!("encoder{}.bias", k), layer.bias.len(), layer.n_hidden)?;
            check_len(
                &format!("decoder{}.bias", k),
                layer.recon_bias.len(),
                layer.n_inputs,
            )?;
            n_prev = Some(layer.n_hidden);
        }
        let output = &self.output;
        if let Some(n_prev) = n_prev {
            if output.n_inputs != n_prev {
                return Err(Error::Model(format!(
                    "output layer takes {} inputs but the last layer has {} units",
                    output.n_inputs, n_prev
                )));
            }
        }
        if output.n_outputs == 0 {
            return Err(Error::Model("output layer has no units".to_string()));
        }
        let expected = weight_count("output.weights", output.n_outputs, output.n_inputs)?;
        check_len("output.weights", output.weights.len(), expected)?;
        check_len("output.bias", output.bias.len(), output.n_outputs)?;
        Ok(())
    }
}

/// Shape and parameter group indices of one encoder layer.
#[derive(Clone, Debug)]
struct LayerShape {
    n_inputs: usize,
    n_hidden: usize,
    weights: usize,
    bias: usize,
    recon_bias: usize,
}

#[derive(Clone, Debug)]
struct OutputShape {
    n_inputs: usize,
    n_outputs: usize,
    weights: usize,
    bias: usize,
}

#[derive(Clone, Debug)]
pub struct StackedAutoencoder {
    layers: Vec<LayerShape>,
    output: OutputShape,
    params: ParameterGroups,
    der_params: ParameterGroups,
    /// Hidden activations of the last forward pass, one buffer per layer.
    hidden: Vec<Vec<f64>>,
    /// Log-probabilities of the last forward pass.
    outputs: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `out = W x + b` with `W` row-major `out.len() x x.len()`.
fn affine(weights: &[f64], bias: &[f64], x: &[f64], out: &mut [f64]) {
    let n_in = x.len();
    for (j, o) in out.iter_mut().enumerate() {
        let row = &weights[j * n_in..(j + 1) * n_in];
        *o = bias[j] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
    }
}

/// Accumulate `dW += delta x^T`, `db += delta` and return `W^T delta`.
fn affine_backward(
    weights: &[f64],
    x: &[f64],
    delta: &[f64],
    der_weights: &mut [f64],
    der_bias: &mut [f64],
) -> Vec<f64> {
    let n_in = x.len();
    let mut dx = vec![0.0; n_in];
    for (j, &d) in delta.iter().enumerate() {
        der_bias[j] += d;
        let row = &weights[j * n_in..(j + 1) * n_in];
        let der_row = &mut der_weights[j * n_in..(j + 1) * n_in];
        for i in 0..n_in {
            der_row[i] += d * x[i];
            dx[i] += row[i] * d;
        }
    }
    dx
}

impl StackedAutoencoder {
    pub fn from_stored(stored: &StoredModel) -> Result<StackedAutoencoder> {
        stored.validate()?;
        let mut params = ParameterGroups::new();
        let mut layers = vec![];
        let mut hidden = vec![];
        for (k, layer) in stored.layers.iter().enumerate() {
            let weights = params.push_group_from(&format!("encoder{}.weights", k), &layer.weights);
            let bias = params.push_group_from(&format!("encoder{}.bias", k), &layer.bias);
            let recon_bias =
                params.push_group_from(&format!("decoder{}.bias", k), &layer.recon_bias);
            layers.push(LayerShape {
                n_inputs: layer.n_inputs,
                n_hidden: layer.n_hidden,
                weights,
                bias,
                recon_bias,
            });
            hidden.push(vec![0.0; layer.n_hidden]);
        }
        let output = &stored.output;
        let output = OutputShape {
            n_inputs: output.n_inputs,
            n_outputs: output.n_outputs,
            weights: params.push_group_from("output.weights", &output.weights),
            bias: params.push_group_from("output.bias", &output.bias),
        };
        let der_params = params.zeros_like();
        Ok(StackedAutoencoder {
            outputs: vec![0.0; output.n_outputs],
            layers,
            output,
            params,
            der_params,
            hidden,
        })
    }

    pub fn to_stored(&self) -> StoredModel {
        let layers = self
            .layers
            .iter()
            .map(|layer| StoredLayer {
                n_inputs: layer.n_inputs,
                n_hidden: layer.n_hidden,
                weights: self.params.group(layer.weights).to_vec(),
                bias: self.params.group(layer.bias).to_vec(),
                recon_bias: self.params.group(layer.recon_bias).to_vec(),
            })
            .collect();
        StoredModel {
            layers,
            output: StoredOutput {
                n_inputs: self.output.n_inputs,
                n_outputs: self.output.n_outputs,
                weights: self.params.group(self.output.weights).to_vec(),
                bias: self.params.group(self.output.bias).to_vec(),
            },
        }
    }

    pub fn params_mut(&mut self) -> &mut ParameterGroups {
        &mut self.params
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Model for StackedAutoencoder {
    fn n_inputs(&self) -> usize {
        self.layers
            .first()
            .map(|layer| layer.n_inputs)
            .unwrap_or(self.output.n_inputs)
    }

    fn n_outputs(&self) -> usize {
        self.output.n_outputs
    }

    fn params(&self) -> &ParameterGroups {
        &self.params
    }

    fn der_params(&self) -> &ParameterGroups {
        &self.der_params
    }

    fn der_params_mut(&mut self) -> &mut ParameterGroups {
        &mut self.der_params
    }

    fn forward(&mut self, inputs: &[f64]) -> &[f64] {
        for k in 0..self.layers.len() {
            let layer = &self.layers[k];
            let (before, rest) = self.hidden.split_at_mut(k);
            let x = if k == 0 { inputs } else { &before[k - 1][..] };
            let h = &mut rest[0];
            affine(
                self.params.group(layer.weights),
                self.params.group(layer.bias),
                x,
                h,
            );
            h.iter_mut().for_each(|v| *v = sigmoid(*v));
        }

        let x = self.hidden.last().map(|h| &h[..]).unwrap_or(inputs);
        affine(
            self.params.group(self.output.weights),
            self.params.group(self.output.bias),
            x,
            &mut self.outputs,
        );
        // Log-softmax
        let max = self
            .outputs
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let log_sum = self
            .outputs
            .iter()
            .map(|v| (v - max).exp())
            .sum::<f64>()
            .ln()
            + max;
        self.outputs.iter_mut().for_each(|v| *v -= log_sum);
        &self.outputs
    }

    fn backward(&mut self, inputs: &[f64], beta: &[f64]) {
        // Through the log-softmax: dz_j = beta_j - p_j * sum(beta)
        let beta_sum: f64 = beta.iter().sum();
        let delta: Vec<f64> = self
            .outputs
            .iter()
            .zip(beta)
            .map(|(log_p, b)| b - log_p.exp() * beta_sum)
            .collect();

        let x = self.hidden.last().map(|h| &h[..]).unwrap_or(inputs);
        let (der_weights, der_bias) = two_groups_mut(
            &mut self.der_params,
            self.output.weights,
            self.output.bias,
        );
        let mut dh = affine_backward(
            self.params.group(self.output.weights),
            x,
            &delta,
            der_weights,
            der_bias,
        );

        for k in (0..self.layers.len()).rev() {
            let layer = &self.layers[k];
            let h = &self.hidden[k];
            let delta: Vec<f64> = dh
                .iter()
                .zip(h)
                .map(|(d, h)| d * h * (1.0 - h))
                .collect();
            let x = if k == 0 { inputs } else { &self.hidden[k - 1][..] };
            let (der_weights, der_bias) =
                two_groups_mut(&mut self.der_params, layer.weights, layer.bias);
            dh = affine_backward(
                self.params.group(layer.weights),
                x,
                &delta,
                der_weights,
                der_bias,
            );
        }
    }
}

/// Borrow two distinct groups mutably. `first` must come before `second`.
fn two_groups_mut(
    groups: &mut ParameterGroups,
    first: usize,
    second: usize,
) -> (&mut [f64], &mut [f64]) {
    let a = groups.info()[first].range();
    let b = groups.info()[second].range();
    assert!(a.end <= b.start);
    let (head, tail) = groups.as_mut_slice().split_at_mut(b.start);
    (&mut head[a], &mut tail[..b.end - b.start])
}

/// Load a model from a JSON file.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<StackedAutoencoder> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|err| Error::io(path, err))?;
    let stored: StoredModel = serde_json::from_reader(BufReader::new(f))?;
    let model = StackedAutoencoder::from_stored(&stored)?;
    tracing::debug!(
        path = %path.display(),
        layers = model.n_layers(),
        params = model.params().total_len(),
        "loaded model"
    );
    Ok(model)
}

/// Save a model as JSON.
pub fn save_model<P: AsRef<Path>>(model: &StackedAutoencoder, path: P) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).map_err(|err| Error::io(path, err))?;
    serde_json::to_writer(BufWriter::new(f), &model.to_stored())?;
    Ok(())
}
