use std::process::ExitCode;

use anyhow::Result;
use tracing::error;

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match verso_cli::run(&args) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(verso_cli::CliError::Usage(banner)) => {
            eprint!("{banner}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            error!(error = %err, "fatal error");
            eprintln!("verso: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
