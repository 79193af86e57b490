use std::fmt::{self, Display};

/// Result returning Error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(String),
    Corrupt(String),
    Decode(String),
    // Index or store holds nothing at the requested position yet.
    EndOfData,
    IndexFull,
    Internal(String),
    Io(std::io::Error),
    NoSegments,
    OffsetOutOfRange(u64),
}

impl Error {
    /// True for the conditions a poller should retry rather than give up on.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, Error::OffsetOutOfRange(_) | Error::EndOfData)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(s) | Error::Internal(s) => write!(f, "{}", s),
            Error::Corrupt(s) => write!(f, "Corrupt log data: {}", s),
            Error::Decode(s) => write!(f, "Failed to decode record: {}", s),
            Error::EndOfData => write!(f, "End of data"),
            Error::IndexFull => write!(f, "Index is full"),
            Error::Io(err) => write!(f, "{}", err),
            Error::NoSegments => write!(f, "No log segments"),
            Error::OffsetOutOfRange(off) => write!(f, "Offset out of range: {}", off),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(err: std::net::AddrParseError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_display_carries_offset() {
        let err = Error::OffsetOutOfRange(42);
        assert_eq!(err.to_string(), "Offset out of range: 42");
        assert!(err.is_not_yet_available());
        assert!(!Error::IndexFull.is_not_yet_available());
    }

    #[test]
    fn test_io_error_kind_is_preserved() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        match err {
            Error::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
