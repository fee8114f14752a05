//! SPI transport
//!
//! All phases of a transfer run inside one `SpiDevice::transaction`, with
//! chip select held for the whole sequence. A short delay is appended
//! before chip select is released; the controller needs it between
//! consecutive commands.
//!
//! Read commands on SPI return one dummy byte ahead of the data, which is
//! reported through [`TransportFeatures::READ_DUMMY_BYTE`].

use crate::MAX_SEGMENTS;
use fts_io_core::{Segment, Transport, TransportFault, TransportFeatures};
use maybe_async::maybe_async;

#[cfg(feature = "is_sync")]
use embedded_hal::{delay::DelayNs, spi::SpiDevice};
#[cfg(not(feature = "is_sync"))]
use embedded_hal_async::{delay::DelayNs, spi::SpiDevice};

use embedded_hal::spi::{Error as _, ErrorKind, Operation};

/// Delay before chip select is released, in nanoseconds
pub const DEFAULT_CS_DELAY_NS: u32 = 10_000;

/// Transfer phases plus the trailing chip-select delay
const MAX_OPS: usize = MAX_SEGMENTS + 1;

/// Touch controller on an SPI bus
pub struct SpiTransport<SPI, D> {
    spi: SPI,
    delay: D,
    cs_delay_ns: u32,
}

impl<SPI, D> SpiTransport<SPI, D> {
    /// Create a transport with the default chip-select delay
    pub fn new(spi: SPI, delay: D) -> Self {
        Self {
            spi,
            delay,
            cs_delay_ns: DEFAULT_CS_DELAY_NS,
        }
    }

    /// Set the delay before chip select is released (0 disables it)
    pub fn with_cs_delay_ns(mut self, ns: u32) -> Self {
        self.cs_delay_ns = ns;
        self
    }

    /// Give back the device and the delay provider
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }
}

pub(crate) fn fault(kind: ErrorKind) -> TransportFault {
    match kind {
        ErrorKind::Overrun => TransportFault::Overrun,
        ErrorKind::ModeFault | ErrorKind::FrameFormat | ErrorKind::ChipSelectFault => {
            TransportFault::Bus
        }
        _ => TransportFault::Other,
    }
}

#[maybe_async(AFIT)]
impl<SPI, D> Transport for SpiTransport<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    fn features(&self) -> TransportFeatures {
        TransportFeatures::WRITE_WRITE_READ | TransportFeatures::READ_DUMMY_BYTE
    }

    async fn transfer(&mut self, segments: &mut [Segment<'_>]) -> Result<(), TransportFault> {
        let mut ops: heapless::Vec<Operation<'_, u8>, MAX_OPS> = heapless::Vec::new();
        for segment in segments.iter_mut() {
            let op = match segment {
                Segment::Write(data) => Operation::Write(*data),
                Segment::Read(buf) => Operation::Read(&mut **buf),
            };
            if ops.push(op).is_err() {
                log::error!("fts_spi: more than {} phases in one transfer", MAX_SEGMENTS);
                return Err(TransportFault::Other);
            }
        }
        if self.cs_delay_ns > 0 {
            // MAX_OPS leaves room for it
            let _ = ops.push(Operation::DelayNs(self.cs_delay_ns));
        }

        self.spi.transaction(&mut ops).await.map_err(|e| {
            let kind = e.kind();
            log::trace!("fts_spi: transaction failed: {:?}", kind);
            fault(kind)
        })
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }
}
