//! Generate a random stacked autoencoder from JSON options.
use hessian_estimator::model::save_model;
use hessian_estimator::synthetic::{genmodel, load_options, ModelOptions};

fn main() {
    let args: Vec<String> = std::env::args().map(|arg| arg.to_string()).collect();
    if args.len() != 3 {
        eprintln!("Usage: {} [OPTIONS_JSON] [MODEL_FILE]", args[0]);
        std::process::exit(2);
    }
    let result = load_options::<ModelOptions, _>(&args[1])
        .and_then(|opts| genmodel(&opts))
        .and_then(|model| save_model(&model, &args[2]));
    if let Err(err) = result {
        eprintln!("genmodel: {}", err);
        std::process::exit(1);
    }
}
