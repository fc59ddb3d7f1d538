//! Error taxonomy.
//!
//! One cross-platform set of error conditions shared by every device. A
//! filter never invents its own error space: it reports the condition it
//! observed, and a failed delegate call surfaces the underlying device's
//! condition unchanged.

use std::io;

/// Error conditions reported by devices.
///
/// The set is deliberately small and stable across platforms; OS error
/// codes are folded into it at the transport boundary (see [`Errno::from_io`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Errno {
    /// A parameter, mode string, or operation sequence was invalid.
    #[error("invalid argument")]
    InvalidArgument,
    /// An allocation or resource reservation failed.
    #[error("out of memory")]
    NoMemory,
    /// The handle is not open for the requested direction.
    #[error("permission denied")]
    PermissionDenied,
    /// The peer or a lower layer is gone; the handle is unusable for I/O.
    #[error("broken pipe")]
    BrokenPipe,
    /// Malformed framing or syntax in a parsed stream.
    #[error("bad message")]
    BadMessage,
    /// A transport deadline expired.
    #[error("timed out")]
    TimedOut,
    /// The operation is not defined for this device.
    #[error("operation not supported")]
    NotSupported,
    /// The underlying device failed to produce bytes.
    #[error("read fault")]
    ReadFault,
    /// The underlying device failed to accept bytes.
    #[error("write fault")]
    WriteFault,
    /// A bounded buffer or window has no room left.
    #[error("no buffer space available")]
    NoBufferSpace,
    /// The connection was reset by the peer.
    #[error("connection reset")]
    ConnectionReset,
    /// A local address is already in use.
    #[error("address in use")]
    AddressInUse,
    /// Seek was requested on a device with no position.
    #[error("seek on non-seekable device")]
    NotSeekable,
    /// A blocking call was interrupted before completing.
    #[error("interrupted")]
    Interrupted,
    /// A protocol-level failure (TLS handshake, certificate verification).
    #[error("protocol error")]
    Protocol,
    /// Name resolution produced no usable address.
    #[error("not found")]
    NotFound,
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Errno>;

impl Errno {
    /// Fold an OS-level I/O error into the taxonomy.
    ///
    /// The mapping is total: unrecognized kinds become [`Errno::ReadFault`]
    /// or [`Errno::WriteFault`] at the call site's discretion via
    /// [`Errno::from_io_or`].
    pub fn from_io(err: &io::Error) -> Errno {
        Errno::from_io_or(err, Errno::ReadFault)
    }

    /// Fold an OS-level I/O error, using `fallback` for unrecognized kinds.
    pub fn from_io_or(err: &io::Error, fallback: Errno) -> Errno {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => Errno::PermissionDenied,
            ErrorKind::NotFound => Errno::NotFound,
            ErrorKind::BrokenPipe => Errno::BrokenPipe,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Errno::ConnectionReset,
            ErrorKind::ConnectionRefused => Errno::BrokenPipe,
            ErrorKind::AddrInUse => Errno::AddressInUse,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Errno::TimedOut,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Errno::InvalidArgument,
            ErrorKind::UnexpectedEof => Errno::BadMessage,
            ErrorKind::Interrupted => Errno::Interrupted,
            ErrorKind::OutOfMemory => Errno::NoMemory,
            ErrorKind::Unsupported => Errno::NotSupported,
            ErrorKind::AlreadyExists => Errno::InvalidArgument,
            _ => fallback,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
