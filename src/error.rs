//! Error types for pgn2dcg

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for PGN import and DCG encoding/decoding
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed PGN text; `offset` is the byte offset of the offending line
    #[error("PGN parse error at byte {offset}: {message}")]
    Parse { offset: u64, message: String },

    #[error("Illegal move '{san}' at byte {offset}: {message}")]
    IllegalMove {
        offset: u64,
        san: String,
        message: String,
    },

    #[error("Invalid FEN '{fen}': {message}")]
    Fen { fen: String, message: String },

    /// Malformed encoded game; `offset` is relative to the start of the encoded bytes
    #[error("DCG decode error at byte {offset}: {message}")]
    Decode { offset: usize, message: String },

    #[error("Length {0} exceeds the largest size class")]
    LengthOverflow(u64),

    #[error("Invalid database file {}: {message}", path.display())]
    InvalidDatabase { path: PathBuf, message: String },

    #[error("Dictionary {} is full: next offset would collide with the no-match sentinel", path.display())]
    OffsetOverflow { path: PathBuf },

    #[error("Unresolved {kind} '{value}': not present in the dictionary")]
    Unresolved { kind: &'static str, value: String },
}

impl Error {
    pub(crate) fn parse(offset: u64, message: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn decode(offset: usize, message: impl Into<String>) -> Self {
        Error::Decode {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_database(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::InvalidDatabase {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Errors confined to a single source game. Everything else concerns the
    /// import as a whole.
    pub fn is_game_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::IllegalMove { .. } | Error::Fen { .. } | Error::LengthOverflow(_)
        )
    }
}

/// Result type alias for pgn2dcg operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_decode_error_reports_offset() {
        let err = Error::decode(17, "unknown marker 0x99");
        assert_eq!(err.to_string(), "DCG decode error at byte 17: unknown marker 0x99");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_game_error());
    }

    #[test]
    fn test_game_errors() {
        assert!(Error::parse(0, "bad tag").is_game_error());
        assert!(Error::LengthOverflow(1 << 40).is_game_error());
        assert!(!Error::decode(0, "bad marker").is_game_error());
    }
}
