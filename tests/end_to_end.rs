//! End-to-end runs through data, model and output files.
use approx::assert_relative_eq;
use std::path::Path;
use tempfile::tempdir;

use hessian_estimator::cli::{run, Args};
use hessian_estimator::output::{save_results, EIGENVALS_TXT, EIGENVECS_TXT};
use hessian_estimator::synthetic::{gendata_file, genmodel, DataOptions, ModelOptions};
use hessian_estimator::{
    estimate_hessian, save_model, ClassDataSet, ClassNllCriterion, MatDataSet, Model,
    ParameterGroups,
};

/// Two parameters whose gradient at an example equals the example inputs.
struct ConstantGradientModel {
    params: ParameterGroups,
    der_params: ParameterGroups,
    outputs: Vec<f64>,
}

impl ConstantGradientModel {
    fn new() -> ConstantGradientModel {
        let mut params = ParameterGroups::new();
        params.push_group("a", 1);
        params.push_group("b", 1);
        ConstantGradientModel {
            der_params: params.zeros_like(),
            params,
            outputs: vec![0.0],
        }
    }
}

impl Model for ConstantGradientModel {
    fn n_inputs(&self) -> usize {
        2
    }

    fn n_outputs(&self) -> usize {
        1
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

    fn forward(&mut self, _inputs: &[f64]) -> &[f64] {
        &self.outputs
    }

    fn backward(&mut self, inputs: &[f64], beta: &[f64]) {
        for (g, x) in self.der_params.as_mut_slice().iter_mut().zip(inputs) {
            *g -= beta[0] * x;
        }
    }
}

fn read_values(path: &Path) -> Vec<f64> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.parse().unwrap())
        .collect()
}

fn read_rows(path: &Path) -> Vec<Vec<f64>> {
    let text = std::fs::read_to_string(path).unwrap();
    text.lines()
        .map(|line| {
            assert!(line.ends_with(' '), "row without trailing space: {:?}", line);
            line.split_whitespace().map(|v| v.parse().unwrap()).collect()
        })
        .collect()
}

#[test]
fn toy_gradients_give_hand_computed_eigenpairs() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("toy.txt");
    std::fs::write(&data_path, "3 3\n1 0 0\n0 1 0\n1 1 0\n").unwrap();

    let data = MatDataSet::load(&data_path, 2, 1, None, false).unwrap();
    let data = ClassDataSet::new(&data, 2, 1).unwrap();
    let criterion = ClassNllCriterion::new(*data.class_format());
    let mut model = ConstantGradientModel::new();
    let estimate = estimate_hessian(&mut model, &criterion, &data).unwrap();

    assert_relative_eq!(estimate.mean[0], 2.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(estimate.mean[1], 2.0 / 3.0, epsilon = 1e-12);

    let out = save_results(dir.path(), "_toy", &estimate.eigen, false).unwrap();
    let values = read_values(&out.join(EIGENVALS_TXT));
    assert_eq!(values.len(), 2);
    assert_relative_eq!(values[0], 0.5, epsilon = 1e-10);
    assert_relative_eq!(values[1], 1.0 / 6.0, epsilon = 1e-10);

    // rows of the file are coordinates, columns are eigenvectors
    let rows = read_rows(&out.join(EIGENVECS_TXT));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.len() == 2));
    let s = std::f64::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(rows[0][0].abs(), s, epsilon = 1e-10);
    assert_relative_eq!(rows[1][0], -rows[0][0], epsilon = 1e-10);
    assert_relative_eq!(rows[0][1].abs(), s, epsilon = 1e-10);
    assert_relative_eq!(rows[1][1], rows[0][1], epsilon = 1e-10);
}

fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let model_path = dir.join("model.json");
    let model = genmodel(&ModelOptions {
        n_inputs: 3,
        hidden: vec![2],
        n_classes: 2,
        init_std: 0.5,
        seed: 11,
    })
    .unwrap();
    save_model(&model, &model_path).unwrap();

    let data_path = dir.join("data.txt");
    gendata_file(
        &DataOptions {
            n_examples: 30,
            n_inputs: 3,
            n_classes: 2,
            seed: 3,
        },
        &data_path,
    )
    .unwrap();
    (data_path, model_path)
}

fn args(data: &Path, model: &Path, label: &str, max_load: i64) -> Args {
    Args {
        n_inputs: 3,
        n_classes: 2,
        data_filename: data.to_path_buf(),
        model_filename: model.to_path_buf(),
        model_label: label.to_string(),
        max_load,
        binary_mode: false,
        save_binary: false,
    }
}

#[test]
fn full_run_writes_sorted_spectrum() {
    let dir = tempdir().unwrap();
    let (data, model) = write_fixtures(dir.path());
    let estimate = run(&args(&data, &model, "_sae", -1), dir.path()).unwrap();

    // encoder 3x2 + 2, decoder 3, output 2x2 + 2
    let n_params = 6 + 2 + 3 + 4 + 2;
    assert_eq!(estimate.n_examples, 30);
    assert_eq!(estimate.n_params, n_params);

    let out = dir.path().join("hessian_sae");
    let values = read_values(&out.join(EIGENVALS_TXT));
    assert_eq!(values.len(), n_params);
    for pair in values.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    // the covariance is positive semi-definite
    assert!(values.iter().all(|&v| v > -1e-9));

    let rows = read_rows(&out.join(EIGENVECS_TXT));
    assert_eq!(rows.len(), n_params);
    assert!(rows.iter().all(|row| row.len() == n_params));
    // eigenvector columns are unit length
    for k in 0..n_params {
        let norm2: f64 = rows.iter().map(|row| row[k] * row[k]).sum();
        assert_relative_eq!(norm2, 1.0, epsilon = 1e-6);
    }
}

#[test]
fn max_load_truncates_examples() {
    let dir = tempdir().unwrap();
    let (data, model) = write_fixtures(dir.path());
    let estimate = run(&args(&data, &model, "_capped", 7), dir.path()).unwrap();
    assert_eq!(estimate.n_examples, 7);
}

#[test]
fn missing_model_is_an_error() {
    let dir = tempdir().unwrap();
    let (data, _) = write_fixtures(dir.path());
    let missing = dir.path().join("nope.json");
    assert!(run(&args(&data, &missing, "", -1), dir.path()).is_err());
    assert!(!dir.path().join("hessian").exists());
}
