//! Estimate the hessian of a stacked autoencoder with the covariance of its
//! per-example gradients, then save the full sorted eigendecomposition.
use std::path::Path;

use hessian_estimator::cli;

fn main() {
    cli::init_tracing();
    let args = cli::parse_args();
    if let Err(err) = cli::run(&args, Path::new(".")) {
        eprintln!("hessian_estimator: {}", err);
        std::process::exit(1);
    }
}
