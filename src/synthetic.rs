//! Seeded generators for models and datasets.
//!
//! Both generators take JSON options and a seed so the same options always
//! give the same files.
use rand::prelude::*;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{StackedAutoencoder, StoredLayer, StoredModel, StoredOutput};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelOptions {
    /// Input dimension
    pub n_inputs: usize,
    /// Hidden units of each autoencoder layer
    pub hidden: Vec<usize>,
    /// Number of classes
    pub n_classes: usize,
    /// Standard deviation of the initial weights
    pub init_std: f64,
    /// Seed for the RNG.
    pub seed: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DataOptions {
    pub n_examples: usize,
    pub n_inputs: usize,
    pub n_classes: usize,
    /// Seed for the RNG.
    pub seed: u64,
}

/// Read generator options from a JSON file.
pub fn load_options<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    Ok(serde_json::from_str(&text)?)
}

fn normal_weights<R: Rng>(n: usize, distr: &Normal<f64>, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| distr.sample(rng)).collect()
}

/// Random stacked autoencoder with `Normal(0, init_std)` weights and zero
/// biases.
pub fn genmodel(opts: &ModelOptions) -> Result<StackedAutoencoder> {
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let distr = Normal::new(0.0, opts.init_std)
        .map_err(|err| Error::Model(format!("invalid init_std {}: {}", opts.init_std, err)))?;

    let mut layers = vec![];
    let mut n_prev = opts.n_inputs;
    for &n_hidden in &opts.hidden {
        layers.push(StoredLayer {
            n_inputs: n_prev,
            n_hidden,
            weights: normal_weights(n_hidden * n_prev, &distr, &mut rng),
            bias: vec![0.0; n_hidden],
            recon_bias: vec![0.0; n_prev],
        });
        n_prev = n_hidden;
    }
    let output = StoredOutput {
        n_inputs: n_prev,
        n_outputs: opts.n_classes,
        weights: normal_weights(opts.n_classes * n_prev, &distr, &mut rng),
        bias: vec![0.0; opts.n_classes],
    };
    StackedAutoencoder::from_stored(&StoredModel { layers, output })
}

/// Write a random ASCII dataset: uniform `[0, 1)` inputs followed by a
/// uniform class label.
pub fn gendata<W: Write>(opts: &DataOptions, out: &mut W) -> Result<()> {
    write_dataset(opts, out, Path::new("<writer>"))
}

/// Same as [`gendata`], with write errors reported against `path`.
fn write_dataset<W: Write>(opts: &DataOptions, out: &mut W, path: &Path) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let value_distr = Uniform::new(0.0, 1.0)
        .map_err(|err| Error::Shape(format!("failed to create input distribution: {}", err)))?;
    let class_distr = Uniform::new(0, opts.n_classes)
        .map_err(|err| Error::Shape(format!("failed to create class distribution: {}", err)))?;

    let write = |out: &mut W, rng: &mut ChaCha8Rng| -> std::io::Result<()> {
        writeln!(out, "{} {}", opts.n_examples, opts.n_inputs + 1)?;
        for _ in 0..opts.n_examples {
            for _ in 0..opts.n_inputs {
                let value: f64 = value_distr.sample(rng);
                write!(out, "{:.6} ", value)?;
            }
            writeln!(out, "{}", class_distr.sample(rng))?;
        }
        Ok(())
    };
    write(out, &mut rng).map_err(|err| Error::io(path, err))
}

/// Write a random dataset to `path`.
pub fn gendata_file<P: AsRef<Path>>(opts: &DataOptions, path: P) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).map_err(|err| Error::io(path, err))?;
    let mut buf = BufWriter::new(f);
    write_dataset(opts, &mut buf, path)?;
    buf.flush().map_err(|err| Error::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ClassDataSet, MatDataSet};
    use crate::model::Model;
    use tempfile::tempdir;

    fn model_opts() -> ModelOptions {
        ModelOptions {
            n_inputs: 4,
            hidden: vec![3, 2],
            n_classes: 3,
            init_std: 0.1,
            seed: 100,
        }
    }

    #[test]
    fn genmodel_is_reproducible() {
        let a = genmodel(&model_opts()).unwrap();
        let b = genmodel(&model_opts()).unwrap();
        assert_eq!(a.to_stored(), b.to_stored());
        assert_eq!(a.n_inputs(), 4);
        assert_eq!(a.n_outputs(), 3);
        assert_eq!(a.params().total_len(), (12 + 3 + 4) + (6 + 2 + 3) + (6 + 3));

        let mut other = model_opts();
        other.seed = 101;
        assert_ne!(genmodel(&other).unwrap().to_stored(), a.to_stored());
    }

    #[test]
    fn gendata_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let opts = DataOptions {
            n_examples: 20,
            n_inputs: 4,
            n_classes: 3,
            seed: 5,
        };
        gendata_file(&opts, &path).unwrap();
        let data = MatDataSet::load(&path, 4, 1, None, false).unwrap();
        assert_eq!(data.n_rows(), 20);
        let classes = ClassDataSet::new(&data, 4, 3).unwrap();
        assert!((0..20).all(|i| classes.label(i) < 3));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn large_data_opts() -> DataOptions {
        DataOptions {
            n_examples: 1000,
            n_inputs: 10,
            n_classes: 3,
            seed: 5,
        }
    }

    #[test]
    fn gendata_reports_write_errors() {
        match gendata(&large_data_opts(), &mut FailingWriter) {
            Err(Error::Io { path, .. }) => assert_eq!(path, Path::new("<writer>")),
            other => panic!("expected an i/o error, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn gendata_file_errors_name_the_file() {
        // Writes to /dev/full fail with ENOSPC once the buffer spills.
        let path = Path::new("/dev/full");
        if !path.exists() {
            return;
        }
        match gendata_file(&large_data_opts(), path) {
            Err(Error::Io { path: err_path, .. }) => assert_eq!(err_path, path),
            other => panic!("expected an i/o error, got {:?}", other),
        }
    }

    #[test]
    fn options_parse_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"n_inputs": 4, "hidden": [3], "n_classes": 2, "init_std": 0.5, "seed": 1}"#,
        )
        .unwrap();
        let opts: ModelOptions = load_options(&path).unwrap();
        assert_eq!(opts.hidden, vec![3]);
        assert_eq!(opts.seed, 1);
    }
}
