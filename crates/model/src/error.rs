use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be sent, or the backend answered with an
    /// unsuccessful handshake (status code or headers), or the transport
    /// broke while reading the body.
    Network,
    /// A frame of the streamed reply is not valid, or doesn't have the
    /// expected shape.
    StreamParse,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "Network error"),
            ErrorKind::StreamParse => write!(f, "Stream parse error"),
        }
    }
}
