use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    Stopped,
    Eof,
    Io(String),
    Other(String),
}

impl Error {
    /// Stopped and end-of-input end a copy loop without failing it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Stopped | Error::Eof)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Eof,
            _                                 => Error::Io(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::Stopped  => write!(f, "reading stopped"),
            Error::Eof      => write!(f, "end of input"),
            Error::Io(e)    => write!(f, "io error: {}", e),
            Error::Other(e) => write!(f, "{}", e),
        }
    }
}
