//! Command line and logging setup for the estimator binary.
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::criterion::ClassNllCriterion;
use crate::dataset::{max_load_from_flag, ClassDataSet, MatDataSet};
use crate::error::Result;
use crate::estimator::{estimate_hessian, Estimate};
use crate::model::load_model;
use crate::output::save_results;
use crate::spectrum;

/// Estimates the hessian with the covariance approximation.
///
/// The covariance is fully computed and so is the eigendecomposition.
#[derive(Parser, Debug, Clone)]
#[command(name = "hessian_estimator", version, about, long_about = None)]
pub struct Args {
    /// Number of inputs
    pub n_inputs: usize,

    /// Number of targets
    pub n_classes: usize,

    /// Filename for the data
    pub data_filename: PathBuf,

    /// The model filename
    pub model_filename: PathBuf,

    /// Label used to describe the model
    #[arg(long = "model_label", default_value = "", allow_hyphen_values = true)]
    pub model_label: String,

    /// Max number of examples to load (<= 0 loads everything)
    #[arg(long = "max_load", default_value_t = -1, allow_negative_numbers = true)]
    pub max_load: i64,

    /// Binary mode for the data file
    #[arg(long = "binary_mode")]
    pub binary_mode: bool,

    /// Also write the results as little-endian f64 files
    #[arg(long = "save_binary")]
    pub save_binary: bool,
}

/// Options whose next token is a value and must not be rewritten.
const VALUE_OPTIONS: [&str; 2] = ["model_label", "max_load"];

/// Rewrite single-dash long options (`-model_label`) into the `--` form.
/// Short flags, negative numbers and option values are left alone.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut takes_value = false;
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if std::mem::take(&mut takes_value) {
                return arg;
            }
            let mut chars = arg.chars();
            let is_long = i > 0
                && chars.next() == Some('-')
                && chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
                && arg.len() > 2;
            let name = arg.trim_start_matches('-');
            takes_value = i > 0 && arg.starts_with('-') && VALUE_OPTIONS.contains(&name);
            if is_long {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

/// Parse the process arguments.
pub fn parse_args() -> Args {
    Args::parse_from(normalize_args(std::env::args()))
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}

/// Load the inputs named by `args`, estimate the hessian and save the sorted
/// eigenpairs under `root`.
pub fn run(args: &Args, root: &Path) -> Result<Estimate> {
    let max_load = max_load_from_flag(args.max_load);
    let data = MatDataSet::load(
        &args.data_filename,
        args.n_inputs,
        1,
        max_load,
        args.binary_mode,
    )?;
    let data = ClassDataSet::new(&data, args.n_inputs, args.n_classes)?;
    tracing::info!("{} examples loaded.", data.n_examples());

    let mut model = load_model(&args.model_filename)?;
    let criterion = ClassNllCriterion::new(*data.class_format());

    let estimate = estimate_hessian(&mut model, &criterion, &data)?;
    if let Some(summary) = spectrum::summarize(&estimate.eigen.values) {
        spectrum::log_summary(&summary);
    }
    save_results(root, &args.model_label, &estimate.eigen, args.save_binary)?;
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_torch_style_options() {
        let args = normalize_args(strings(&[
            "hessian_estimator",
            "-model_label",
            "_a",
            "-max_load",
            "-1",
            "-binary_mode",
            "-h",
            "--save_binary",
        ]));
        assert_eq!(
            args,
            strings(&[
                "hessian_estimator",
                "--model_label",
                "_a",
                "--max_load",
                "-1",
                "--binary_mode",
                "-h",
                "--save_binary",
            ])
        );
    }

    #[test]
    fn option_values_are_not_rewritten() {
        let args = normalize_args(strings(&[
            "hessian_estimator",
            "-model_label",
            "-relu",
            "--max_load",
            "-5",
            "-binary_mode",
        ]));
        assert_eq!(
            args,
            strings(&[
                "hessian_estimator",
                "--model_label",
                "-relu",
                "--max_load",
                "-5",
                "--binary_mode",
            ])
        );

        let parsed = Args::parse_from(normalize_args(strings(&[
            "hessian_estimator",
            "2",
            "3",
            "d",
            "m",
            "-model_label",
            "-relu",
        ])));
        assert_eq!(parsed.model_label, "-relu");
        assert!(!parsed.binary_mode);
    }

    #[test]
    fn parses_positionals_and_options() {
        let args = Args::parse_from(normalize_args(strings(&[
            "hessian_estimator",
            "784",
            "10",
            "train.txt",
            "model.json",
            "-max_load",
            "500",
            "-binary_mode",
        ])));
        assert_eq!(args.n_inputs, 784);
        assert_eq!(args.n_classes, 10);
        assert_eq!(args.data_filename, PathBuf::from("train.txt"));
        assert_eq!(args.model_filename, PathBuf::from("model.json"));
        assert_eq!(args.model_label, "");
        assert_eq!(args.max_load, 500);
        assert!(args.binary_mode);
        assert!(!args.save_binary);
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(strings(&["hessian_estimator", "2", "3", "d", "m"]));
        assert_eq!(args.max_load, -1);
        assert!(!args.binary_mode);
        assert!(Args::try_parse_from(strings(&["hessian_estimator", "2"])).is_err());
    }
}
