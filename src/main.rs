//! Replica-probe CLI entry point.
//!
//! A minimal entrypoint: parse arguments, run one probing invocation,
//! print errors to stderr, exit non-zero on failure. All logic is
//! delegated to the CLI module.

use replica_probe::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
