//! Error types for fts-io-core
//!
//! This module provides a no_std compatible error type that every layer of
//! the engine returns. Failures are ordinary values: nothing in the engine
//! panics on a bus or protocol error.

use core::fmt;

/// Legacy driver code: success
pub const OK: u32 = 0x0000_0000;
/// Legacy driver code: preallocated buffers too small
pub const ERROR_ALLOC: u32 = 0x8000_0100;
/// Legacy driver code: bus read failed
pub const ERROR_BUS_R: u32 = 0x8000_0200;
/// Legacy driver code: bus write failed
pub const ERROR_BUS_W: u32 = 0x8000_0300;
/// Legacy driver code: bus write followed by read failed
pub const ERROR_BUS_WR: u32 = 0x8000_0400;
/// Legacy driver code: bus channel not open
pub const ERROR_BUS_O: u32 = 0x8000_0500;
/// Legacy driver code: operation not allowed
pub const ERROR_OP_NOT_ALLOW: u32 = 0x8000_0600;
/// Legacy driver code: timed out
pub const ERROR_TIMEOUT: u32 = 0x8000_0700;
/// Legacy driver code: echo check failed
pub const ERROR_CHECK_ECHO_FAIL: u32 = 0x8000_2100;

/// Failure classification reported by a raw transport
///
/// This mirrors the error kinds of common bus stacks so adapter crates
/// can map their native errors without losing the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// The slave did not acknowledge an address or data byte
    Nack,
    /// Another master won bus arbitration
    ArbitrationLoss,
    /// Generic bus error (misplaced start/stop, framing)
    Bus,
    /// Data was lost because a FIFO overflowed
    Overrun,
    /// Any other failure
    Other,
}

/// Reason a firmware command echo could not be confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoFailure {
    /// The echo event never appeared within the polling budget
    NoEcho,
    /// The controller reported an error event instead of the echo
    ErrorEvent {
        /// Event identifier byte
        id: u8,
        /// Error type byte
        kind: u8,
    },
    /// Reading the event FIFO failed
    EventReadFailed,
    /// Verifier-specific failure code
    Code(u32),
}

impl EchoFailure {
    /// Legacy driver code for this failure
    pub const fn code(&self) -> u32 {
        match self {
            Self::NoEcho => ERROR_TIMEOUT | ERROR_CHECK_ECHO_FAIL,
            Self::ErrorEvent { .. } => ERROR_CHECK_ECHO_FAIL,
            Self::EventReadFailed => ERROR_BUS_WR | ERROR_CHECK_ECHO_FAIL,
            Self::Code(code) => *code,
        }
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Preconditions
    /// No transport has been bound to the device context
    BusNotOpen,
    /// Requested length exceeds the fixed scratch buffer capacity
    AllocationTooSmall {
        /// Bytes the operation needed
        requested: usize,
        /// Bytes the scratch buffer holds
        capacity: usize,
    },
    /// Address width (in bytes) is larger than a 64-bit address
    AddressWidthUnsupported(u8),
    /// Configuration values are out of range
    InvalidConfig,

    // Transfer failures (retry budget exhausted)
    /// Write-only transfer failed
    WriteFailed,
    /// Read-only transfer failed
    ReadFailed,
    /// Write followed by read failed
    WriteReadFailed,
    /// First (header-only) write of a split-address operation failed
    FirstWriteFailed,
    /// Second (header + payload) write of a split-address operation failed
    SecondWriteFailed,

    // Protocol failures
    /// The firmware command was written but its echo never matched
    EchoMismatch(EchoFailure),
}

impl Error {
    /// Legacy driver code for this error
    ///
    /// `EchoMismatch` reports the verifier's own code.
    pub const fn code(&self) -> u32 {
        match self {
            Self::BusNotOpen => ERROR_BUS_O,
            Self::AllocationTooSmall { .. } => ERROR_ALLOC,
            Self::AddressWidthUnsupported(_) | Self::InvalidConfig => ERROR_OP_NOT_ALLOW,
            Self::WriteFailed | Self::FirstWriteFailed | Self::SecondWriteFailed => ERROR_BUS_W,
            Self::ReadFailed => ERROR_BUS_R,
            Self::WriteReadFailed => ERROR_BUS_WR,
            Self::EchoMismatch(failure) => failure.code(),
        }
    }

    /// Returns true if the error came from the bus rather than a
    /// precondition or protocol check
    pub const fn is_transfer_failure(&self) -> bool {
        matches!(
            self,
            Self::WriteFailed
                | Self::ReadFailed
                | Self::WriteReadFailed
                | Self::FirstWriteFailed
                | Self::SecondWriteFailed
        )
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "no acknowledge"),
            Self::ArbitrationLoss => write!(f, "arbitration lost"),
            Self::Bus => write!(f, "bus error"),
            Self::Overrun => write!(f, "overrun"),
            Self::Other => write!(f, "transport error"),
        }
    }
}

impl fmt::Display for EchoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEcho => write!(f, "echo event not received"),
            Self::ErrorEvent { id, kind } => {
                write!(f, "error event {:02X} {:02X} instead of echo", id, kind)
            }
            Self::EventReadFailed => write!(f, "event FIFO read failed"),
            Self::Code(code) => write!(f, "echo check failed (code {:08X})", code),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusNotOpen => write!(f, "bus channel not open"),
            Self::AllocationTooSmall {
                requested,
                capacity,
            } => write!(
                f,
                "preallocated buffers too small: {} bytes requested, {} available",
                requested, capacity
            ),
            Self::AddressWidthUnsupported(width) => {
                write!(f, "address size of {} bytes not supported (max 8)", width)
            }
            Self::InvalidConfig => write!(f, "invalid I/O configuration"),
            Self::WriteFailed => write!(f, "bus write failed"),
            Self::ReadFailed => write!(f, "bus read failed"),
            Self::WriteReadFailed => write!(f, "bus write-read failed"),
            Self::FirstWriteFailed => write!(f, "first write failed"),
            Self::SecondWriteFailed => write!(f, "second write failed"),
            Self::EchoMismatch(failure) => write!(f, "check echo failed: {}", failure),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
