//! Scratch buffer arena
//!
//! Each device context owns one fixed set of buffers used to stage bus
//! transfers when the caller's memory is not used directly. The arena is
//! only ever touched through `&mut` access to its context, so two logical
//! operations can never interleave on it.

use crate::error::{Error, Result};
use crate::frame::MAX_HEADER_LEN;
use crate::opcodes::{DUMMY_BYTE, READ_CHUNK, WRITE_CHUNK};

/// Capacity of the read scratch buffer
pub const READ_BUF_LEN: usize = READ_CHUNK + DUMMY_BYTE;
/// Capacity of each write scratch buffer
pub const WRITE_BUF_LEN: usize = WRITE_CHUNK + MAX_HEADER_LEN + DUMMY_BYTE;

/// Where a transfer's bytes live
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferMode {
    /// Copy through the context's scratch arena; lengths are checked
    /// against its fixed capacity
    #[default]
    Scratch,
    /// Transfer straight from/to the caller's buffers; the caller
    /// guarantees they are transfer-capable
    Direct,
}

/// Fixed-capacity staging buffers owned by a device context
pub struct ScratchBuffers {
    pub(crate) write: [u8; WRITE_BUF_LEN],
    pub(crate) extra_write: [u8; WRITE_BUF_LEN],
    pub(crate) read: [u8; READ_BUF_LEN],
}

impl ScratchBuffers {
    /// Create a zeroed arena
    pub const fn new() -> Self {
        Self {
            write: [0; WRITE_BUF_LEN],
            extra_write: [0; WRITE_BUF_LEN],
            read: [0; READ_BUF_LEN],
        }
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject `requested` bytes if they do not fit a buffer of `capacity`
pub(crate) fn ensure_fits(requested: usize, capacity: usize) -> Result<()> {
    if requested > capacity {
        log::error!(
            "preallocated buffers are too small: {} > {}",
            requested,
            capacity
        );
        return Err(Error::AllocationTooSmall {
            requested,
            capacity,
        });
    }
    Ok(())
}

/// Copy `data` to the front of `buf` and return the filled part
pub(crate) fn stage<'a>(buf: &'a mut [u8], data: &[u8]) -> &'a [u8] {
    buf[..data.len()].copy_from_slice(data);
    &buf[..data.len()]
}
