//! Error types shared across the driver.

use core::fmt;

pub type Result<T> = core::result::Result<T, UdcError>;

/// Synchronous failures surfaced to callers.
///
/// Transfer-level outcomes (halt, data-toggle error, ...) are not errors in
/// this sense; they travel on the request as [`crate::XferStatus`] and reach
/// the completion callback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdcError {
    /// Null-ish or inconsistent arguments; nothing was touched.
    InvalidArgument,
    /// The operation raced with suspend or a SETUP token and should be
    /// retried by the caller.
    WouldBlock,
    /// A descriptor in the chain is still owned by hardware.
    StillBusy,
    /// The request is already on an endpoint queue.
    AlreadyQueued,
    /// Isochronous request exceeds (mult + 1) * wMaxPacketSize.
    MessageTooBig,
    /// A split large transfer is still in flight on this endpoint.
    LargeTransferInProgress,
    /// Descriptor pool or queue slot exhaustion; no partial state was left
    /// queued.
    NoMemory,
    /// Feature not supported by the platform configuration.
    NotSupported,
    /// The controller is not in a state to accept the operation.
    Shutdown,
}

impl fmt::Display for UdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UdcError::InvalidArgument => "invalid argument",
            UdcError::WouldBlock => "operation would block",
            UdcError::StillBusy => "descriptor still active",
            UdcError::AlreadyQueued => "request already queued",
            UdcError::MessageTooBig => "request too big for isochronous endpoint",
            UdcError::LargeTransferInProgress => "large transfer in progress",
            UdcError::NoMemory => "out of descriptors",
            UdcError::NotSupported => "not supported",
            UdcError::Shutdown => "controller not active",
        };
        f.write_str(s)
    }
}
