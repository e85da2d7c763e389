use anyhow::Result;
use clap::Parser;
use payload_diagnose::cli;
use tracing::error;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        // config and logging setup can fail before a subscriber exists
        if tracing::dispatcher::has_been_set() {
            error!("{:#}", err);
        } else {
            eprintln!("error: {:#}", err);
        }
        std::process::exit(1);
    }
    Ok(())
}
