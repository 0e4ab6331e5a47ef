//! Engine error types.

/// Errors from reading the evaluation weight file.
#[derive(Debug, thiserror::Error)]
pub enum CoeffError {
    /// The weight file could not be opened or read.
    #[error("cannot read weight file {path}: {source}")]
    InvalidFile {
        /// The path that failed.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The leading magic words do not match the expected format.
    #[error("weight file {path} has wrong magic words")]
    BadMagic {
        /// The path that failed.
        path: String,
    },

    /// The compressed stream ended before all tables were read.
    #[error("weight file {path} is truncated")]
    TruncatedStream {
        /// The path that failed.
        path: String,
    },
}

/// Errors from reading, writing or updating opening-book files.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    /// A book file could not be opened, read or written.
    #[error("cannot access book file {path}: {source}")]
    InvalidFile {
        /// The path that failed.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The leading magic values do not match the book format.
    #[error("book file {path} has wrong magic values")]
    BadMagic {
        /// The path that failed.
        path: String,
    },

    /// A book, game or script file is structurally malformed.
    #[error("format error in {path}: {reason}")]
    FormatError {
        /// The path that failed.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// A scripted game contained a move that flips no discs.
    #[error("invalid move {move_string} in game record")]
    InvalidMove {
        /// The move as written in the record.
        move_string: String,
    },

    /// A replayed move was rejected by the board.
    #[error(transparent)]
    IllegalMove {
        /// The rejected move and side.
        #[from]
        source: verso_core::MoveError,
    },

    /// A position referenced by a result file is not in the book.
    #[error("position on line {line} not found in book")]
    PositionNotFound {
        /// Line number in the script file.
        line: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::{BookError, CoeffError};

    #[test]
    fn coeff_error_display() {
        let err = CoeffError::BadMagic { path: "weights.bin".into() };
        assert_eq!(format!("{err}"), "weight file weights.bin has wrong magic words");
    }

    #[test]
    fn book_error_display() {
        let err = BookError::InvalidMove { move_string: "j9".into() };
        assert_eq!(format!("{err}"), "invalid move j9 in game record");
    }
}
