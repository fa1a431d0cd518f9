mod args;
mod report;

use std::process::ExitCode;

use clap::Parser;
use dwarflint_elf::{ByteView, ElfObject};
use tracing_subscriber::EnvFilter;

use args::Args;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut had_failure = false;

    for path in &args.inputs {
        match check_one(path, &args) {
            Ok(failed) => had_failure |= failed,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                had_failure = true;
            }
        }
    }

    if had_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check_one(path: &std::path::Path, args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let view = ByteView::open(path)?;
    let object = ElfObject::parse(&view)?;
    let input = object.build_input()?;

    let config = args.to_config();
    let diagnostics = dwarflint_core::run(&input, &config);
    Ok(report::report(path, &diagnostics, args))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
