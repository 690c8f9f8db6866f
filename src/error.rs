use std::fmt;
use std::io;
use std::net::SocketAddr;

#[derive(Debug)]
pub enum ServerError {
    IoError(io::Error),
    Bind { addr: SocketAddr, source: io::Error },
    Config(String),
    BadRequest(String),
    NotImplemented(String),
    UriTooLong,
    HeadersTooLarge,
    VersionNotSupported(String),
    PanicError(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::UriTooLong => 414,
            ServerError::HeadersTooLarge => 431,
            ServerError::NotImplemented(_) => 501,
            ServerError::VersionNotSupported(_) => 505,
            ServerError::IoError(_)
            | ServerError::Bind { .. }
            | ServerError::Config(_)
            | ServerError::PanicError(_) => 500,
        }
    }

    /// Whether the connection may carry further requests after this error
    /// has been answered.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ServerError::NotImplemented(_))
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::IoError(err) => write!(f, "IO error: {}", err),
            ServerError::Bind { addr, source } => write!(f, "Could not bind {}: {}", addr, source),
            ServerError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            ServerError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ServerError::NotImplemented(method) => write!(f, "Unsupported method ('{}')", method),
            ServerError::UriTooLong => write!(f, "Request-URI too long"),
            ServerError::HeadersTooLarge => write!(f, "Too many headers"),
            ServerError::VersionNotSupported(version) => {
                write!(f, "Invalid HTTP version ({})", version)
            }
            ServerError::PanicError(msg) => write!(f, "Panic: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::IoError(err) => Some(err),
            ServerError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::IoError(err)
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
