use clap::Parser;
use log::LevelFilter;
use std::process::ExitCode;

use sheet_overlay::cli::{self, CliArgs};
use sheet_overlay::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let _ = match &args.log_file {
        Some(path) => logger::init_with_path(path, level),
        None => logger::init(level),
    };

    cli::run(args)
}
