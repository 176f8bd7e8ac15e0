//! Error types for the pkzip codec core

use std::io;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading or writing an archive
#[derive(Debug)]
pub enum Error {
    /// No end-of-central-directory record could be located in the stream.
    NotAZip,
    /// A structural inconsistency was found: bad signature mid-stream, a
    /// size mismatch, a malformed extra block, a central-vs-local name
    /// mismatch, etc.
    Corrupt(String),
    /// The archive uses a feature this core does not implement: multi-disk
    /// spanning, or an unrecognized compression method.
    Unsupported(String),
    /// The encryption check byte did not match; the supplied password is
    /// wrong.
    BadPassword,
    /// A write would exceed the 32-bit format limits and the archive was
    /// not opened with ZIP64 permitted.
    TooLarge,
    /// An argument was invalid for the requested operation (e.g. a
    /// modification year below 1980).
    InvalidArgument(String),
    /// The operation was attempted on an archive whose stream has already
    /// been closed.
    Closed,
    /// The underlying stream returned an I/O error.
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotAZip => write!(f, "not a zip file"),
            Error::Corrupt(msg) => write!(f, "corrupt archive: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::BadPassword => write!(f, "bad password"),
            Error::TooLarge => write!(f, "operation requires ZIP64, which was not permitted"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Closed => write!(f, "archive is closed"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(Error::NotAZip.to_string(), "not a zip file");
        assert_eq!(Error::BadPassword.to_string(), "bad password");
        assert_eq!(Error::TooLarge.to_string(),
            "operation requires ZIP64, which was not permitted");
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
