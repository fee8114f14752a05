//! I2C transport
//!
//! Every transfer becomes one `I2c::transaction` call, so the phases of a
//! write-then-read are separated by a repeated start and never by a stop.

use crate::MAX_SEGMENTS;
use fts_io_core::{Segment, Transport, TransportFault, TransportFeatures};
use maybe_async::maybe_async;

#[cfg(feature = "is_sync")]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(not(feature = "is_sync"))]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use embedded_hal::i2c::{Error as _, ErrorKind, Operation, SevenBitAddress};

/// 7-bit slave address the controller answers on by default
pub const DEFAULT_I2C_ADDRESS: SevenBitAddress = 0x49;

/// Touch controller on an I2C bus
pub struct I2cTransport<I2C, D> {
    i2c: I2C,
    delay: D,
    address: SevenBitAddress,
}

impl<I2C, D> I2cTransport<I2C, D> {
    /// Create a transport talking to `address`
    pub fn new(i2c: I2C, delay: D, address: SevenBitAddress) -> Self {
        log::debug!("fts_i2c: slave address {:02X}", address);
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Current slave address
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Change the slave address used by later transfers
    ///
    /// Meant for debugging controllers strapped to a different address.
    pub fn set_address(&mut self, address: SevenBitAddress) {
        log::debug!(
            "fts_i2c: slave address {:02X} -> {:02X}",
            self.address,
            address
        );
        self.address = address;
    }

    /// Give back the bus and the delay provider
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

pub(crate) fn fault(kind: ErrorKind) -> TransportFault {
    match kind {
        ErrorKind::NoAcknowledge(_) => TransportFault::Nack,
        ErrorKind::ArbitrationLoss => TransportFault::ArbitrationLoss,
        ErrorKind::Bus => TransportFault::Bus,
        ErrorKind::Overrun => TransportFault::Overrun,
        _ => TransportFault::Other,
    }
}

#[maybe_async(AFIT)]
impl<I2C, D> Transport for I2cTransport<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Adjacent writes in one I2C transaction are merged into a single
    /// message, so write-write-read chains are not offered here.
    fn features(&self) -> TransportFeatures {
        TransportFeatures::empty()
    }

    async fn transfer(&mut self, segments: &mut [Segment<'_>]) -> Result<(), TransportFault> {
        let mut ops: heapless::Vec<Operation<'_>, MAX_SEGMENTS> = heapless::Vec::new();
        for segment in segments.iter_mut() {
            let op = match segment {
                Segment::Write(data) => Operation::Write(*data),
                Segment::Read(buf) => Operation::Read(&mut **buf),
            };
            if ops.push(op).is_err() {
                log::error!("fts_i2c: more than {} phases in one transfer", MAX_SEGMENTS);
                return Err(TransportFault::Other);
            }
        }

        self.i2c
            .transaction(self.address, &mut ops)
            .await
            .map_err(|e| {
                let kind = e.kind();
                log::trace!("fts_i2c: transaction failed: {:?}", kind);
                fault(kind)
            })
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource};
    use std::vec;
    use std::vec::Vec;

    #[derive(Debug, PartialEq)]
    enum Op {
        W(Vec<u8>),
        R(usize),
    }

    #[derive(Default)]
    struct FakeI2c {
        log: Vec<(u8, Vec<Op>)>,
        error: Option<ErrorKind>,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut ops = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => ops.push(Op::W(data.to_vec())),
                    Operation::Read(buf) => {
                        buf.fill(0xA5);
                        ops.push(Op::R(buf.len()));
                    }
                }
            }
            self.log.push((address, ops));
            match self.error {
                Some(kind) => Err(kind),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct FakeDelay {
        ns: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += u64::from(ns);
        }
    }

    #[test]
    fn test_write_read_is_one_transaction() {
        let mut bus = I2cTransport::new(FakeI2c::default(), FakeDelay::default(), 0x49);
        let mut buf = [0u8; 3];
        bus.transfer(&mut [
            Segment::Write(&[0xFA, 0x00]),
            Segment::Read(&mut buf),
        ])
        .unwrap();
        assert_eq!(buf, [0xA5; 3]);

        let (i2c, _) = bus.release();
        assert_eq!(i2c.log, [(0x49, vec![Op::W(vec![0xFA, 0x00]), Op::R(3)])]);
    }

    #[test]
    fn test_address_change() {
        let mut bus = I2cTransport::new(FakeI2c::default(), FakeDelay::default(), 0x49);
        bus.set_address(0x48);
        assert_eq!(bus.address(), 0x48);
        bus.transfer(&mut [Segment::Write(&[0x87])]).unwrap();
        assert_eq!(bus.release().0.log[0].0, 0x48);
    }

    #[test]
    fn test_error_kinds_map_to_faults() {
        let mut i2c = FakeI2c::default();
        i2c.error = Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        let mut bus = I2cTransport::new(i2c, FakeDelay::default(), 0x49);
        assert_eq!(
            bus.transfer(&mut [Segment::Write(&[0x87])]),
            Err(TransportFault::Nack)
        );
        assert_eq!(
            fault(ErrorKind::ArbitrationLoss),
            TransportFault::ArbitrationLoss
        );
        assert_eq!(fault(ErrorKind::Other), TransportFault::Other);
    }

    #[test]
    fn test_too_many_phases() {
        let mut bus = I2cTransport::new(FakeI2c::default(), FakeDelay::default(), 0x49);
        let result = bus.transfer(&mut [
            Segment::Write(&[1]),
            Segment::Write(&[2]),
            Segment::Write(&[3]),
            Segment::Write(&[4]),
        ]);
        assert_eq!(result, Err(TransportFault::Other));
        assert!(bus.release().0.log.is_empty());
    }

    #[test]
    fn test_delay_uses_provider() {
        let mut bus = I2cTransport::new(FakeI2c::default(), FakeDelay::default(), 0x49);
        bus.delay_ms(2);
        assert_eq!(bus.release().1.ns, 2_000_000);
    }

    #[test]
    fn test_no_write_write_read() {
        let bus = I2cTransport::new(FakeI2c::default(), FakeDelay::default(), 0x49);
        assert!(
            !bus.features().contains(TransportFeatures::WRITE_WRITE_READ)
        );
    }
}
