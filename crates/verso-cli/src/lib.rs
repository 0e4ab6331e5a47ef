//! Command-line driver for verso: option parsing, the game loop and the
//! batch tools around the engine.

mod error;
mod options;
mod script;
mod session;

pub use error::CliError;
pub use options::{Level, Options, parse, usage};
pub use session::{build_engine, eval_text};

/// Parse `args` and run the requested mode.
pub fn run(args: &[String]) -> Result<(), CliError> {
    let options = parse(args)?;
    session::run(&options)
}
