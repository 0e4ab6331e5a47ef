//! CLI errors.

/// Errors surfacing at the command-line boundary. Everything here is
/// fatal: the driver prints one diagnostic and exits with status 1.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad command line; the payload is the usage banner.
    #[error("usage error")]
    Usage(String),

    /// A referenced file could not be used.
    #[error("cannot access {path}: {source}")]
    File {
        /// The offending path.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A scripted move sequence contained an illegal move.
    #[error("illegal move '{move_string}' in scripted sequence")]
    IllegalScriptedMove {
        /// The move as written.
        move_string: String,
    },

    /// A move was rejected by the board during play.
    #[error(transparent)]
    Move(#[from] verso_core::MoveError),

    /// Book trouble (bad file, bad magic, malformed data).
    #[error(transparent)]
    Book(#[from] verso_engine::BookError),

    /// Weight-file trouble.
    #[error(transparent)]
    Coeffs(#[from] verso_engine::CoeffError),

    /// A position dump could not be parsed.
    #[error("bad position: {0}")]
    Position(#[from] verso_core::PositionError),
}

#[cfg(test)]
mod tests {
    use super::CliError;

    #[test]
    fn display_formats() {
        let err = CliError::IllegalScriptedMove { move_string: "z9".into() };
        assert_eq!(format!("{err}"), "illegal move 'z9' in scripted sequence");
    }
}
