//! Generate a random ASCII classification dataset from JSON options.
use hessian_estimator::synthetic::{gendata_file, load_options, DataOptions};

fn main() {
    let args: Vec<String> = std::env::args().map(|arg| arg.to_string()).collect();
    if args.len() != 3 {
        eprintln!("Usage: {} [OPTIONS_JSON] [DATA_FILE]", args[0]);
        std::process::exit(2);
    }
    let result = load_options::<DataOptions, _>(&args[1])
        .and_then(|opts| gendata_file(&opts, &args[2]));
    if let Err(err) = result {
        eprintln!("gendata: {}", err);
        std::process::exit(1);
    }
}
