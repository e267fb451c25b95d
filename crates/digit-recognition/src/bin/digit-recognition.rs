use std::process::ExitCode;

use clap::Parser;
use digit_recognition::cli::{install_logger, run, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logger(cli.verbose);

    match run(&cli) {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
