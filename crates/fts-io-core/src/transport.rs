//! Raw transport trait definitions
//!
//! These traits use `maybe_async` to support both sync and async modes.
//! - With the `is_sync` feature (default), traits are blocking
//! - Without it, traits become async (suitable for Embassy)

use crate::error::TransportFault;
use bitflags::bitflags;
use maybe_async::maybe_async;

bitflags! {
    /// Transport capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransportFeatures: u32 {
        /// Can chain write, write, read in one bus operation
        const WRITE_WRITE_READ = 1 << 0;
        /// Read commands return a leading dummy byte on this bus
        const READ_DUMMY_BYTE  = 1 << 1;
    }
}

impl Default for TransportFeatures {
    fn default() -> Self {
        TransportFeatures::empty()
    }
}

/// One phase of a bus operation
///
/// A bus operation is a list of up to three phases executed without
/// releasing the bus in between.
#[derive(Debug)]
pub enum Segment<'a> {
    /// Bytes sent to the controller
    Write(&'a [u8]),
    /// Buffer filled by the controller
    Read(&'a mut [u8]),
}

impl Segment<'_> {
    /// Number of bytes this phase moves
    pub fn len(&self) -> usize {
        match self {
            Self::Write(data) => data.len(),
            Self::Read(buf) => buf.len(),
        }
    }

    /// Returns true if this phase moves no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true for a read phase
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}

/// Raw bus transport (sync or async depending on `is_sync` feature)
///
/// This trait represents the host bus stack: it executes one bus operation
/// made of 1-3 chained phases (write-only, read-only, write-then-read or
/// write-write-read) atomically with respect to bus ownership.
///
/// Implementations must not retry internally; the engine retries the
/// entire phase list on failure.
///
/// ## Example
///
/// ```ignore
/// impl Transport for MyI2c {
///     fn features(&self) -> TransportFeatures {
///         TransportFeatures::WRITE_WRITE_READ
///     }
///
///     fn transfer(&mut self, segments: &mut [Segment<'_>]) -> Result<(), TransportFault> {
///         for segment in segments.iter_mut() {
///             match segment {
///                 Segment::Write(data) => self.push(data)?,
///                 Segment::Read(buf) => self.pull(buf)?,
///             }
///         }
///         self.stop()
///     }
///
///     fn delay_ms(&mut self, ms: u32) {
///         std::thread::sleep(std::time::Duration::from_millis(ms as u64));
///     }
/// }
/// ```
#[maybe_async(AFIT)]
pub trait Transport {
    /// Get the capabilities of this transport
    fn features(&self) -> TransportFeatures {
        TransportFeatures::empty()
    }

    /// Execute one bus operation
    async fn transfer(
        &mut self,
        segments: &mut [Segment<'_>],
    ) -> core::result::Result<(), TransportFault>;

    /// Block (or yield, in async mode) for the given number of milliseconds
    async fn delay_ms(&mut self, ms: u32);
}
