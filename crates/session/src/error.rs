//! Session and transport error types

use protocol::DescriptorError;
use std::fmt;
use thiserror::Error;

/// Failure reported by a [`Transport`](crate::Transport)
///
/// The variants follow the libusb error classes so that a native backend
/// can map its errors one to one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Operation timed out")]
    Timeout,

    #[error("Endpoint stalled")]
    Pipe,

    #[error("Device disconnected")]
    NoDevice,

    #[error("Entity not found")]
    NotFound,

    #[error("Resource busy")]
    Busy,

    #[error("Buffer overflow")]
    Overflow,

    #[error("Input/output error")]
    Io,

    #[error("Invalid parameter")]
    InvalidParam,

    #[error("Access denied")]
    Access,

    #[error("Operation not supported")]
    Unsupported,

    #[error("{0}")]
    Other(String),
}

/// Public session operation, used to label errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListDevices,
    Open,
    Close,
    SelectConfiguration,
    ClaimInterface,
    ReleaseInterface,
    SelectAlternateInterface,
    ControlTransferIn,
    ControlTransferOut,
    TransferIn,
    TransferOut,
    ClearHalt,
    IsochronousTransferIn,
    IsochronousTransferOut,
    Reset,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Operation::ListDevices => "list devices",
            Operation::Open => "open",
            Operation::Close => "close",
            Operation::SelectConfiguration => "select configuration",
            Operation::ClaimInterface => "claim interface",
            Operation::ReleaseInterface => "release interface",
            Operation::SelectAlternateInterface => "select alternate interface",
            Operation::ControlTransferIn => "control transfer in",
            Operation::ControlTransferOut => "control transfer out",
            Operation::TransferIn => "transfer in",
            Operation::TransferOut => "transfer out",
            Operation::ClearHalt => "clear halt",
            Operation::IsochronousTransferIn => "isochronous transfer in",
            Operation::IsochronousTransferOut => "isochronous transfer out",
            Operation::Reset => "reset",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity an operation could not find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Device,
    Configuration,
    Interface,
    Alternate,
    Endpoint,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Device => f.write_str("device"),
            Missing::Configuration => f.write_str("configuration"),
            Missing::Interface => f.write_str("interface"),
            Missing::Alternate => f.write_str("alternate"),
            Missing::Endpoint => f.write_str("endpoint"),
        }
    }
}

/// Error returned by every public session operation
///
/// Renders as `"<operation> error: <reason>"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{operation} error: {what} not found")]
    NotFound { operation: Operation, what: Missing },

    #[error("{operation} error: {reason}")]
    InvalidState {
        operation: Operation,
        reason: &'static str,
    },

    #[error("{operation} error: {reason}")]
    Validation {
        operation: Operation,
        reason: &'static str,
    },

    #[error("{operation} error: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: TransportError,
    },

    #[error("{operation} error: not implemented")]
    NotImplemented { operation: Operation },
}

impl SessionError {
    pub fn operation(&self) -> Operation {
        match self {
            SessionError::NotFound { operation, .. }
            | SessionError::InvalidState { operation, .. }
            | SessionError::Validation { operation, .. }
            | SessionError::Transport { operation, .. }
            | SessionError::NotImplemented { operation } => *operation,
        }
    }

    pub(crate) fn not_found(operation: Operation, what: Missing) -> Self {
        SessionError::NotFound { operation, what }
    }

    pub(crate) fn invalid_state(operation: Operation, reason: &'static str) -> Self {
        SessionError::InvalidState { operation, reason }
    }

    pub(crate) fn validation(operation: Operation, reason: &'static str) -> Self {
        SessionError::Validation { operation, reason }
    }

    pub(crate) fn transport(operation: Operation) -> impl FnOnce(TransportError) -> Self {
        move |source| SessionError::Transport { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Why discovering a single device failed
///
/// Discovery failures are absorbed per device; the device is simply not
/// added to the live set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Device reports no configurations")]
    NoConfigurations,

    #[error("Duplicate endpoint {address:#04x} in interface {interface} alternate {alternate}")]
    DuplicateEndpoint {
        interface: u8,
        alternate: u8,
        address: u8,
    },
}
