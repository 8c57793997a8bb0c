/*!
Error handling for the TLS socket wrapper.

Every engine- and transport-level failure is mapped onto [`Error`] at the
session boundary, so callers only ever see the socket error vocabulary.
Engine outcomes themselves are classified by [`EngineError`].
*/

use std::io;
use thiserror::Error;

/// Result type for socket and session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Socket-level error taxonomy shared by transports and TLS sessions
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from a std-backed transport
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Operation attempted without a bound transport
    #[error("no transport socket")]
    NoSocket,

    /// Handshake was never started, or the peer is not connected
    #[error("not connected")]
    NoConnection,

    /// Benign: the connection (or handshake) is already complete
    #[error("socket is already connected")]
    IsConnected,

    /// First handshake attempt did not finish synchronously
    #[error("operation in progress")]
    InProgress,

    /// A previously started operation is still pending
    #[error("operation already in progress")]
    Already,

    /// Operation needs more transport I/O; retry later
    #[error("operation would block")]
    WouldBlock,

    /// Malformed argument, certificate or key material
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// Allocation failure
    #[error("out of memory")]
    NoMemory,

    /// Handshake failed for a reason other than needing more I/O
    #[error("TLS authentication failed")]
    AuthFailure(#[source] EngineError),

    /// Generic I/O-layer failure during an established session
    #[error("device error: {0}")]
    DeviceError(String),

    /// Operation has no meaning for this socket
    #[error("operation not supported")]
    Unsupported,
}

impl Error {
    /// Whether the caller should simply retry later
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::InProgress | Error::Already)
    }
}

/// Outcome classification for every TLS engine call.
///
/// `WantRead` and `WantWrite` are the "need more I/O" signals; everything
/// else except `PeerClosed` is fatal for the call that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine needs more input from the transport
    #[error("engine needs more input")]
    WantRead,

    /// Engine has output the transport could not take yet
    #[error("engine needs to flush output")]
    WantWrite,

    /// Peer sent close_notify or closed the stream
    #[error("peer closed the connection")]
    PeerClosed,

    /// Certificate or key material could not be parsed or installed
    #[error("credential rejected: {0}")]
    Credential(String),

    /// Peer certificate verification failed
    #[error("certificate verification failed: {0}")]
    Verification(String),

    /// TLS protocol violation or alert
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport failed underneath the engine
    #[error("transport failure: {0}")]
    Transport(String),
}

impl EngineError {
    /// Whether this is one of the "need more I/O" outcomes
    pub fn wants_io(&self) -> bool {
        matches!(self, EngineError::WantRead | EngineError::WantWrite)
    }
}

/// Create an invalid parameter error
#[macro_export]
macro_rules! param_err {
    ($msg:expr) => {
        Err($crate::core::error::Error::Parameter($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        Err($crate::core::error::Error::Parameter(format!($fmt, $($arg)*)))
    };
}

/// Convert from Error to io::Error (for std::io adapters)
impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(io_error) => io_error,
            Error::NoSocket => io::Error::new(io::ErrorKind::NotConnected, "no transport socket"),
            Error::NoConnection => io::Error::new(io::ErrorKind::NotConnected, "not connected"),
            Error::IsConnected => io::Error::new(io::ErrorKind::Other, "already connected"),
            Error::InProgress | Error::Already | Error::WouldBlock => {
                io::Error::from(io::ErrorKind::WouldBlock)
            }
            Error::Parameter(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            Error::NoMemory => io::Error::from(io::ErrorKind::OutOfMemory),
            Error::AuthFailure(cause) => io::Error::new(io::ErrorKind::PermissionDenied, cause),
            Error::DeviceError(msg) => io::Error::new(io::ErrorKind::Other, msg),
            Error::Unsupported => io::Error::from(io::ErrorKind::Unsupported),
        }
    }
}
