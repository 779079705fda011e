use std::process::ExitCode;

use clap::Parser;

use editfe::cli::{self, CliArgs};
use editfe::{EditorSettings, log_info, logger};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let settings = EditorSettings::load();

    logger::init(settings.log_to_stderr || args.verbose);
    log_info!("editfe {} starting", env!("CARGO_PKG_VERSION"));

    cli::run(args, settings)
}
