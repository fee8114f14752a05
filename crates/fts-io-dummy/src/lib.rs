//! fts-io-dummy - In-memory touch controller emulator for testing
//!
//! This crate provides a [`Transport`] that emulates the register interface
//! of an FTS touch controller in memory, so the I/O engine can be exercised
//! without hardware. Every transfer and every delay is recorded, and
//! failures can be injected to drive the retry and echo paths.
//!
//! Emulated commands:
//!
//! | Op code | Address | Behaviour |
//! |---------|---------|-----------|
//! | `0xFA`  | 4 bytes | hardware register write / read |
//! | `0xA6`  | 2 bytes | frame buffer read, always one leading dummy byte |
//! | `0xF0`  | 2 bytes | latch the upper half of a split address |
//! | `0xF1`  | 2 bytes | register write / read at latch + lower half |
//! | `0xA0`, `0xA2`, `0xA4` | - | firmware command, queues an echo event |
//! | `0x87`  | - | read one event from the FIFO |
//! | `0x86`  | - | read as many events as fit |

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::collections::VecDeque;
#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use fts_io_core::opcodes::{
    EVT_ID_ERROR, EVT_ID_STATUS_UPDATE, EVT_TYPE_STATUS_ECHO, FEATURE, FIFO_EVENT_SIZE,
    FIFO_READ_ALL, FIFO_READ_ONE, FRAMEBUFFER_R, HW_REG, SCAN_MODE, SYSTEM,
};
use fts_io_core::{Segment, Transport, TransportFault, TransportFeatures};

/// Op code latching the upper half of a split address
pub const PAGE_LATCH: u8 = 0xF0;
/// Op code accessing registers at the latched page
pub const PAGE_DATA: u8 = 0xF1;
/// Value returned in place of a dummy byte
pub const DUMMY_VALUE: u8 = 0xDD;

/// Configuration for the emulated controller
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Capabilities reported to the engine
    pub features: TransportFeatures,
    /// First address of the hardware register space
    pub hw_base: u32,
    /// Size of the hardware register space in bytes
    pub hw_size: usize,
    /// Size of the frame buffer in bytes
    pub frame_buffer_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            features: TransportFeatures::WRITE_WRITE_READ,
            hw_base: 0x2000_0000,
            hw_size: 64 * 1024,
            frame_buffer_size: 8 * 1024,
        }
    }
}

impl DummyConfig {
    /// Emulate the SPI flavour: chained transfers and leading dummy bytes
    pub fn spi() -> Self {
        Self {
            features: TransportFeatures::WRITE_WRITE_READ | TransportFeatures::READ_DUMMY_BYTE,
            ..Self::default()
        }
    }

    /// Emulate the I2C flavour: no chained write-write-read
    pub fn i2c() -> Self {
        Self {
            features: TransportFeatures::empty(),
            ..Self::default()
        }
    }
}

#[cfg(feature = "alloc")]
/// One recorded phase of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Bytes written
    Write(Vec<u8>),
    /// Number of bytes requested
    Read(usize),
}

#[cfg(feature = "alloc")]
/// One recorded transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Phases in bus order
    pub phases: Vec<Phase>,
    /// True if the transfer was answered with a fault
    pub failed: bool,
}

#[cfg(feature = "alloc")]
impl Transfer {
    /// Bytes of the first write phase, if any
    pub fn header(&self) -> Option<&[u8]> {
        self.phases.iter().find_map(|p| match p {
            Phase::Write(data) => Some(data.as_slice()),
            Phase::Read(_) => None,
        })
    }

    /// Length of the read phase, if any
    pub fn read_len(&self) -> Option<usize> {
        self.phases.iter().find_map(|p| match p {
            Phase::Read(len) => Some(*len),
            Phase::Write(_) => None,
        })
    }
}

#[cfg(feature = "alloc")]
/// What a read phase returns, set by the preceding write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Hw(u32),
    FrameBuffer(u16),
    FifoOne,
    FifoAll,
}

/// Emulated touch controller
#[cfg(feature = "alloc")]
pub struct DummyController {
    config: DummyConfig,
    hw: Vec<u8>,
    frame_buffer: Vec<u8>,
    page: u16,
    target: Option<Target>,
    events: VecDeque<[u8; FIFO_EVENT_SIZE]>,
    fw_commands: Vec<Vec<u8>>,
    transfers: Vec<Transfer>,
    delays: Vec<u32>,
    fail_next: usize,
    fault: TransportFault,
    drop_echoes: usize,
    reject: Option<u8>,
}

#[cfg(feature = "alloc")]
impl DummyController {
    /// Create a controller with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let hw = vec![0; config.hw_size];
        let frame_buffer = (0..config.frame_buffer_size).map(|i| i as u8).collect();
        Self {
            config,
            hw,
            frame_buffer,
            page: 0,
            target: None,
            events: VecDeque::new(),
            fw_commands: Vec::new(),
            transfers: Vec::new(),
            delays: Vec::new(),
            fail_next: 0,
            fault: TransportFault::Nack,
            drop_echoes: 0,
            reject: None,
        }
    }

    /// Create a controller with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Hardware register space, starting at `hw_base`
    pub fn hw(&self) -> &[u8] {
        &self.hw
    }

    /// Hardware register space, mutably
    pub fn hw_mut(&mut self) -> &mut [u8] {
        &mut self.hw
    }

    /// Frame buffer contents (a byte ramp unless changed)
    pub fn frame_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.frame_buffer
    }

    /// Every transfer seen so far, failed ones included
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Every delay requested so far, in milliseconds
    pub fn delays(&self) -> &[u32] {
        &self.delays
    }

    /// Firmware commands received, in order
    pub fn fw_commands(&self) -> &[Vec<u8>] {
        &self.fw_commands
    }

    /// Forget recorded transfers and delays
    pub fn clear_log(&mut self) {
        self.transfers.clear();
        self.delays.clear();
    }

    /// Fail the next `count` transfers with `fault`
    pub fn fail_next(&mut self, count: usize, fault: TransportFault) {
        self.fail_next = count;
        self.fault = fault;
    }

    /// Do not echo the next `count` firmware commands
    pub fn drop_echoes(&mut self, count: usize) {
        self.drop_echoes = count;
    }

    /// Answer firmware commands with an error event of type `kind`
    pub fn reject_commands(&mut self, kind: Option<u8>) {
        self.reject = kind;
    }

    /// Queue an event in the FIFO; missing bytes are zero
    pub fn push_event(&mut self, bytes: &[u8]) {
        let mut event = [0u8; FIFO_EVENT_SIZE];
        let len = core::cmp::min(bytes.len(), FIFO_EVENT_SIZE);
        event[..len].copy_from_slice(&bytes[..len]);
        self.events.push_back(event);
    }

    /// Events still waiting in the FIFO
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn dummy_bytes(&self) -> usize {
        if self.config.features.contains(TransportFeatures::READ_DUMMY_BYTE) {
            1
        } else {
            0
        }
    }

    fn hw_range(&mut self, address: u32, len: usize) -> Result<&mut [u8], TransportFault> {
        let start = address
            .checked_sub(self.config.hw_base)
            .map(|offset| offset as usize)
            .filter(|offset| offset + len <= self.hw.len());
        match start {
            Some(start) => Ok(&mut self.hw[start..start + len]),
            None => {
                log::warn!(
                    "dummy: access {:08X}+{} outside register space",
                    address,
                    len
                );
                Err(TransportFault::Nack)
            }
        }
    }

    fn handle_write(&mut self, data: &[u8]) -> Result<(), TransportFault> {
        let Some(&opcode) = data.first() else {
            return Err(TransportFault::Other);
        };
        match opcode {
            HW_REG => {
                let address = be_address(data, 4)? as u32;
                let payload = &data[5..];
                if !payload.is_empty() {
                    self.hw_range(address, payload.len())?.copy_from_slice(payload);
                }
                self.target = Some(Target::Hw(address));
            }
            FRAMEBUFFER_R => {
                let address = be_address(data, 2)? as u16;
                self.target = Some(Target::FrameBuffer(address));
            }
            PAGE_LATCH => {
                self.page = be_address(data, 2)? as u16;
                self.target = None;
            }
            PAGE_DATA => {
                let low = be_address(data, 2)? as u32;
                let address = (u32::from(self.page) << 16) | low;
                let payload = &data[3..];
                if !payload.is_empty() {
                    self.hw_range(address, payload.len())?.copy_from_slice(payload);
                }
                self.target = Some(Target::Hw(address));
            }
            SYSTEM | SCAN_MODE | FEATURE => {
                self.fw_commands.push(data.to_vec());
                if let Some(kind) = self.reject {
                    log::debug!("dummy: rejecting {:02X?}", data);
                    self.events.push_back([EVT_ID_ERROR, kind, opcode, 0, 0, 0, 0, 0]);
                } else if self.drop_echoes > 0 {
                    self.drop_echoes -= 1;
                    log::debug!("dummy: dropping echo of {:02X?}", data);
                } else {
                    let mut echo = [EVT_ID_STATUS_UPDATE, EVT_TYPE_STATUS_ECHO, 0, 0, 0, 0, 0, 0];
                    let len = core::cmp::min(data.len(), FIFO_EVENT_SIZE - 2);
                    echo[2..2 + len].copy_from_slice(&data[..len]);
                    self.events.push_back(echo);
                }
                self.target = None;
            }
            FIFO_READ_ONE => self.target = Some(Target::FifoOne),
            FIFO_READ_ALL => self.target = Some(Target::FifoAll),
            _ => {
                log::warn!("dummy: unsupported op code {:02X}", opcode);
                return Err(TransportFault::Nack);
            }
        }
        Ok(())
    }

    fn handle_read(&mut self, buf: &mut [u8]) -> Result<(), TransportFault> {
        let Some(target) = self.target else {
            log::warn!("dummy: read without a preceding command");
            return Err(TransportFault::Other);
        };

        let skip = match target {
            Target::FrameBuffer(_) => 1,
            _ => self.dummy_bytes(),
        };
        if buf.len() < skip {
            return Err(TransportFault::Other);
        }
        let (dummy, data) = buf.split_at_mut(skip);
        dummy.fill(DUMMY_VALUE);

        match target {
            Target::Hw(address) => data.copy_from_slice(self.hw_range(address, data.len())?),
            Target::FrameBuffer(address) => {
                let start = address as usize;
                let end = start + data.len();
                if end > self.frame_buffer.len() {
                    return Err(TransportFault::Nack);
                }
                data.copy_from_slice(&self.frame_buffer[start..end]);
            }
            Target::FifoOne => {
                let event = self.events.pop_front().unwrap_or([0; FIFO_EVENT_SIZE]);
                let len = core::cmp::min(data.len(), FIFO_EVENT_SIZE);
                data[..len].copy_from_slice(&event[..len]);
            }
            Target::FifoAll => {
                data.fill(0);
                for slot in data.chunks_exact_mut(FIFO_EVENT_SIZE) {
                    match self.events.pop_front() {
                        Some(event) => slot.copy_from_slice(&event),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
}

/// Decode the `width`-byte big-endian address following the op code
fn be_address(data: &[u8], width: usize) -> Result<u64, TransportFault> {
    if data.len() < 1 + width {
        log::warn!("dummy: command {:02X?} too short for its address", data);
        return Err(TransportFault::Other);
    }
    Ok(data[1..1 + width]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

#[cfg(feature = "alloc")]
impl Transport for DummyController {
    fn features(&self) -> TransportFeatures {
        self.config.features
    }

    fn transfer(&mut self, segments: &mut [Segment<'_>]) -> Result<(), TransportFault> {
        let phases = segments
            .iter()
            .map(|s| match s {
                Segment::Write(data) => Phase::Write(data.to_vec()),
                Segment::Read(buf) => Phase::Read(buf.len()),
            })
            .collect();

        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.transfers.push(Transfer {
                phases,
                failed: true,
            });
            return Err(self.fault);
        }

        let mut result = Ok(());
        for segment in segments.iter_mut() {
            result = match segment {
                Segment::Write(data) => self.handle_write(data),
                Segment::Read(buf) => self.handle_read(buf),
            };
            if result.is_err() {
                break;
            }
        }
        self.transfers.push(Transfer {
            phases,
            failed: result.is_err(),
        });
        result
    }

    fn delay_ms(&mut self, ms: u32) {
        // Nothing to wait for in memory
        self.delays.push(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fts_io_core::echo::FifoEchoVerifier;
    use fts_io_core::scratch::{READ_BUF_LEN, WRITE_BUF_LEN};
    use fts_io_core::{
        AddrSize, AlwaysAccept, BufferMode, EchoFailure, Error, FtsIo, IoConfig, RegCmd,
    };

    const HW_BASE: u64 = 0x2000_0000;

    fn init_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .is_test(true)
            .try_init();
    }

    fn open(config: IoConfig, controller: DummyController) -> FtsIo<DummyController> {
        init_logger();
        let mut io = FtsIo::new(config).unwrap();
        io.open_channel(controller);
        io
    }

    fn dummy(io: &FtsIo<DummyController>) -> &DummyController {
        io.transport().unwrap()
    }

    fn hw_cmd() -> RegCmd {
        RegCmd::new(HW_REG, AddrSize::BITS_32)
    }

    #[test]
    fn test_chunk_continuity() {
        let config = IoConfig::default().with_chunks(5, 7);
        let mut io = open(config, DummyController::new_default());
        let data: Vec<u8> = (1..=23).collect();

        io.write_at(hw_cmd(), HW_BASE + 0x40, &data).unwrap();
        let writes = dummy(&io).transfers().to_vec();
        assert_eq!(writes.len(), 4);

        let mut next = HW_BASE + 0x40;
        let mut total = 0;
        for t in &writes {
            let frame = t.header().unwrap();
            let address =
                u64::from(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]));
            assert_eq!(address, next);
            let len = frame.len() - 5;
            next += len as u64;
            total += len;
        }
        assert_eq!(total, data.len());
        assert_eq!(&dummy(&io).hw()[0x40..0x40 + 23], &data[..]);

        io.transport_mut().unwrap().clear_log();
        let mut back = [0u8; 23];
        io.read_at(hw_cmd(), HW_BASE + 0x40, &mut back, BufferMode::Direct)
            .unwrap();
        assert_eq!(back[..], data[..]);
        let lens: Vec<_> = dummy(&io)
            .transfers()
            .iter()
            .map(|t| t.read_len().unwrap())
            .collect();
        assert_eq!(lens, [5, 5, 5, 5, 3]);
    }

    #[test]
    fn test_single_chunk_equals_single_shot() {
        let mut controller = DummyController::new_default();
        controller.hw_mut()[..4].copy_from_slice(&[0x36, 0x39, 0x00, 0x01]);
        let mut io = open(IoConfig::default(), controller);

        let mut chunked = [0u8; 4];
        io.read_at(hw_cmd(), HW_BASE, &mut chunked, BufferMode::Scratch)
            .unwrap();
        let mut single = [0u8; 4];
        io.write_read(
            &[HW_REG, 0x20, 0x00, 0x00, 0x00],
            &mut single,
            BufferMode::Direct,
        )
        .unwrap();

        assert_eq!(chunked, [0x36, 0x39, 0x00, 0x01]);
        assert_eq!(chunked, single);
        let t = dummy(&io).transfers();
        assert_eq!(t[0], t[1]);
    }

    #[test]
    fn test_frame_buffer_dummy_byte_is_stripped() {
        let mut io = open(IoConfig::default(), DummyController::new_default());
        let cmd = RegCmd::new(FRAMEBUFFER_R, AddrSize::BITS_16).with_dummy_byte();
        let mut buf = [0u8; 4];
        io.read_at(cmd, 0x0010, &mut buf, BufferMode::Scratch).unwrap();

        assert_eq!(buf, [0x10, 0x11, 0x12, 0x13]);
        let t = &dummy(&io).transfers()[0];
        assert_eq!(t.header(), Some(&[FRAMEBUFFER_R, 0x00, 0x10][..]));
        assert_eq!(t.read_len(), Some(5));
    }

    #[test]
    fn test_dummy_byte_on_every_chunk() {
        let config = IoConfig::default().with_chunks(3, 16);
        let mut io = open(config, DummyController::new_default());
        let cmd = RegCmd::new(FRAMEBUFFER_R, AddrSize::BITS_16).with_dummy_byte();
        let mut buf = [0u8; 7];
        io.read_at(cmd, 0x0100, &mut buf, BufferMode::Direct).unwrap();

        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6]);
        let lens: Vec<_> = dummy(&io)
            .transfers()
            .iter()
            .map(|t| t.read_len().unwrap())
            .collect();
        assert_eq!(lens, [4, 4, 2]);
    }

    #[test]
    fn test_spi_register_reads_skip_dummy() {
        let mut controller = DummyController::new(DummyConfig::spi());
        controller.hw_mut()[8..12].copy_from_slice(&[1, 2, 3, 4]);
        let mut io = open(IoConfig::default(), controller);

        let mut buf = [0u8; 4];
        let cmd = hw_cmd().with_dummy_byte();
        io.read_at(cmd, HW_BASE + 8, &mut buf, BufferMode::Scratch)
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_split_address_round_trip() {
        let config = IoConfig::default().with_chunks(4, 4);
        let mut io = open(config, DummyController::new_default());
        let first = RegCmd::new(PAGE_LATCH, AddrSize::BITS_16);
        let second = RegCmd::new(PAGE_DATA, AddrSize::BITS_16);
        let data = [0xC0, 0xFF, 0xEE, 0x00, 0x11, 0x22];

        io.write_at_split(first, second, HW_BASE + 0x100, &data).unwrap();
        let t = dummy(&io).transfers();
        assert_eq!(t.len(), 4);
        assert_eq!(t[0].header(), Some(&[PAGE_LATCH, 0x20, 0x00][..]));
        assert_eq!(
            t[1].header(),
            Some(&[PAGE_DATA, 0x01, 0x00, 0xC0, 0xFF, 0xEE, 0x00][..])
        );
        assert_eq!(
            t[3].header(),
            Some(&[PAGE_DATA, 0x01, 0x04, 0x11, 0x22][..])
        );

        let mut back = [0u8; 6];
        io.read_at_split(
            first,
            second,
            HW_BASE + 0x100,
            &mut back,
            BufferMode::Direct,
        )
        .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_three_phase_read_chained_and_fallback() {
        let mut controller = DummyController::new_default();
        controller.hw_mut()[0x10..0x12].copy_from_slice(&[0xAB, 0xCD]);
        let mut io = open(IoConfig::default(), controller);

        let mut buf = [0u8; 2];
        io.write_then_write_read(
            &[PAGE_LATCH, 0x20, 0x00],
            &[PAGE_DATA, 0x00, 0x10],
            &mut buf,
            BufferMode::Scratch,
        )
        .unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);
        assert_eq!(dummy(&io).transfers().len(), 1);
        assert_eq!(dummy(&io).transfers()[0].phases.len(), 3);

        let mut controller = DummyController::new(DummyConfig::i2c());
        controller.hw_mut()[0x10..0x12].copy_from_slice(&[0xAB, 0xCD]);
        io.open_channel(controller);
        let mut buf = [0u8; 2];
        io.write_then_write_read(
            &[PAGE_LATCH, 0x20, 0x00],
            &[PAGE_DATA, 0x00, 0x10],
            &mut buf,
            BufferMode::Scratch,
        )
        .unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);
        let t = dummy(&io).transfers();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].phases, [Phase::Write(vec![PAGE_LATCH, 0x20, 0x00])]);
    }

    #[test]
    fn test_retry_exhaustion() {
        let config = IoConfig::default().with_retries(5, 7);
        let mut controller = DummyController::new_default();
        controller.fail_next(usize::MAX, TransportFault::Bus);
        let mut io = open(config, controller);

        let result = io.write_at(hw_cmd(), HW_BASE, &[1, 2, 3]);
        assert_eq!(result, Err(Error::WriteFailed));
        assert_eq!(dummy(&io).transfers().len(), 5);
        assert!(dummy(&io).transfers().iter().all(|t| t.failed));
        assert_eq!(dummy(&io).delays(), [7, 7, 7, 7]);
    }

    #[test]
    fn test_transient_failure_recovers() {
        let mut controller = DummyController::new_default();
        controller.hw_mut()[0] = 0x5A;
        controller.fail_next(2, TransportFault::ArbitrationLoss);
        let mut io = open(IoConfig::default(), controller);

        let mut buf = [0u8; 1];
        io.read_at(hw_cmd(), HW_BASE, &mut buf, BufferMode::Scratch)
            .unwrap();
        assert_eq!(buf, [0x5A]);
        assert_eq!(dummy(&io).transfers().len(), 3);
        assert_eq!(dummy(&io).delays(), [2, 2]);
    }

    #[test]
    fn test_failed_chunk_aborts_the_rest() {
        let config = IoConfig::default().with_chunks(16, 2).with_retries(1, 0);
        let mut io = open(config, DummyController::new_default());
        // Third chunk runs past the register space
        let end = HW_BASE + 64 * 1024 - 4;
        let result = io.write_at(hw_cmd(), end, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(result, Err(Error::WriteFailed));
        assert_eq!(dummy(&io).transfers().len(), 3);
        assert_eq!(&dummy(&io).hw()[64 * 1024 - 4..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_fw_cmd_echo() {
        let config = IoConfig::default();
        let mut io = open(config, DummyController::new_default());
        let mut verifier = FifoEchoVerifier::new(&config);

        io.write_fw_cmd(&[SYSTEM, 0x00, 0x02], BufferMode::Scratch, &mut verifier)
            .unwrap();
        assert_eq!(dummy(&io).fw_commands(), [vec![SYSTEM, 0x00, 0x02]]);
        assert_eq!(dummy(&io).pending_events(), 0);
    }

    #[test]
    fn test_fw_cmd_echo_over_spi() {
        let config = IoConfig::default();
        let mut io = open(config, DummyController::new(DummyConfig::spi()));
        let mut verifier = FifoEchoVerifier::new(&config);

        io.write_fw_cmd(&[SCAN_MODE, 0x00, 0x01], BufferMode::Direct, &mut verifier)
            .unwrap();
        let poll = dummy(&io).transfers().last().unwrap();
        assert_eq!(poll.header(), Some(&[FIFO_READ_ONE][..]));
        assert_eq!(poll.read_len(), Some(FIFO_EVENT_SIZE + 1));
    }

    #[test]
    fn test_echo_mismatch_vs_write_failure() {
        let config = IoConfig::default().with_echo_timing(3, 1);
        let mut verifier = FifoEchoVerifier::new(&config);

        let mut controller = DummyController::new_default();
        controller.drop_echoes(usize::MAX);
        let mut io = open(config, controller);
        let result = io.write_fw_cmd(&[SYSTEM, 0x01], BufferMode::Scratch, &mut verifier);
        assert_eq!(result, Err(Error::EchoMismatch(EchoFailure::NoEcho)));
        assert_eq!(dummy(&io).fw_commands().len(), 3);

        let mut controller = DummyController::new_default();
        controller.fail_next(usize::MAX, TransportFault::Nack);
        io.open_channel(controller);
        let result = io.write_fw_cmd(&[SYSTEM, 0x01], BufferMode::Scratch, &mut verifier);
        assert_eq!(result, Err(Error::WriteFailed));
        // Failed FIFO drain, then three write attempts
        assert_eq!(dummy(&io).transfers().len(), 4);
        assert!(dummy(&io).fw_commands().is_empty());
    }

    #[test]
    fn test_echo_recovers_on_retry() {
        let config = IoConfig::default().with_echo_timing(2, 1);
        let mut controller = DummyController::new_default();
        controller.drop_echoes(1);
        let mut io = open(config, controller);

        let mut verifier = FifoEchoVerifier::new(&config);
        io.write_fw_cmd(&[FEATURE, 0x04], BufferMode::Scratch, &mut verifier)
            .unwrap();
        assert_eq!(dummy(&io).fw_commands().len(), 2);
    }

    #[test]
    fn test_error_event_fails_the_echo() {
        let config = IoConfig::default().with_retries(1, 0);
        let mut controller = DummyController::new_default();
        controller.reject_commands(Some(0x0A));
        let mut io = open(config, controller);

        let mut verifier = FifoEchoVerifier::new(&config);
        let result = io.write_fw_cmd(&[SYSTEM, 0x00], BufferMode::Scratch, &mut verifier);
        let failure = EchoFailure::ErrorEvent {
            id: EVT_ID_ERROR,
            kind: 0x0A,
        };
        assert_eq!(result, Err(Error::EchoMismatch(failure)));
        assert_eq!(verifier.errors().events().len(), 1);
        assert_eq!(result.unwrap_err().code(), failure.code());
    }

    #[test]
    fn test_stale_echo_is_drained() {
        let config = IoConfig::default().with_echo_timing(2, 1);
        let mut controller = DummyController::new_default();
        controller.push_event(&[EVT_ID_STATUS_UPDATE, EVT_TYPE_STATUS_ECHO, SYSTEM, 0x02]);
        controller.drop_echoes(usize::MAX);
        let mut io = open(config, controller);

        let mut verifier = FifoEchoVerifier::new(&config);
        let result = io.write_fw_cmd(&[SYSTEM, 0x02], BufferMode::Scratch, &mut verifier);
        assert_eq!(result, Err(Error::EchoMismatch(EchoFailure::NoEcho)));
        assert_eq!(dummy(&io).pending_events(), 0);
        assert_eq!(dummy(&io).fw_commands().len(), 3);
    }

    #[test]
    fn test_fifo_read_all() {
        let mut controller = DummyController::new_default();
        controller.push_event(&[0x13, 0x01]);
        controller.push_event(&[0x23, 0x02]);
        let mut io = open(IoConfig::default(), controller);

        let mut events = [0xFFu8; 3 * FIFO_EVENT_SIZE];
        io.write_read(&[FIFO_READ_ALL], &mut events, BufferMode::Scratch)
            .unwrap();
        assert_eq!(events[0], 0x13);
        assert_eq!(events[FIFO_EVENT_SIZE], 0x23);
        assert_eq!(events[2 * FIFO_EVENT_SIZE], 0x00);
    }

    #[test]
    fn test_unbound_bus_never_reaches_controller() {
        let mut io = open(IoConfig::default(), DummyController::new_default());
        let controller = io.close_channel().unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(
            io.read_at(hw_cmd(), HW_BASE, &mut buf, BufferMode::Scratch),
            Err(Error::BusNotOpen)
        );
        assert_eq!(io.write_at(hw_cmd(), HW_BASE, &[1]), Err(Error::BusNotOpen));
        assert_eq!(
            io.write_fw_cmd(&[SYSTEM], BufferMode::Direct, &mut AlwaysAccept),
            Err(Error::BusNotOpen)
        );
        assert_eq!(
            io.read(&mut buf, BufferMode::Scratch),
            Err(Error::BusNotOpen)
        );

        io.open_channel(controller);
        assert!(dummy(&io).transfers().is_empty());
    }

    #[test]
    fn test_scratch_capacity_vs_direct() {
        let mut io = open(IoConfig::default(), DummyController::new_default());

        let mut big = vec![0u8; READ_BUF_LEN + 16];
        let header = [HW_REG, 0x20, 0x00, 0x00, 0x00];
        assert_eq!(
            io.write_read(&header, &mut big, BufferMode::Scratch),
            Err(Error::AllocationTooSmall {
                requested: READ_BUF_LEN + 16,
                capacity: READ_BUF_LEN,
            })
        );
        assert!(dummy(&io).transfers().is_empty());

        io.write_read(&header, &mut big, BufferMode::Direct).unwrap();
        assert_eq!(
            dummy(&io).transfers()[0].read_len(),
            Some(READ_BUF_LEN + 16)
        );

        let cmd = vec![HW_REG; WRITE_BUF_LEN + 1];
        assert!(matches!(
            io.write(&cmd, BufferMode::Scratch),
            Err(Error::AllocationTooSmall { .. })
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let config = IoConfig::from_toml_str("retry_attempts = 2\nretry_delay_ms = 9\n").unwrap();
        let mut controller = DummyController::new_default();
        controller.fail_next(usize::MAX, TransportFault::Nack);
        let mut io = open(config, controller);

        assert_eq!(
            io.write(&[HW_REG], BufferMode::Scratch),
            Err(Error::WriteFailed)
        );
        assert_eq!(dummy(&io).delays(), [9]);
    }
}
