//! Firmware command echo verification
//!
//! The controller acknowledges a firmware command by pushing a status
//! update event into its event FIFO that repeats the command bytes:
//!
//! ```text
//! +------+------+--------+--------+-----+
//! | 0x43 | 0x01 | cmd[0] | cmd[1] | ... |
//! +------+------+--------+--------+-----+
//! ```
//!
//! A firmware write only counts as successful once the raw write went
//! through *and* the echo was seen. Both checks share one retry budget, see
//! [`write_with_echo`].

use crate::config::IoConfig;
use crate::error::{EchoFailure, Error, Result, TransportFault, ERROR_OP_NOT_ALLOW};
use crate::opcodes::{
    DUMMY_BYTE, EVT_ID_ERROR, EVT_ID_NO_EVENT, EVT_ID_STATUS_UPDATE, EVT_TYPE_STATUS_ECHO,
    FIFO_EVENT_SIZE, FIFO_READ_ONE,
};
use crate::retry::{retry, Attempt, RetryPolicy};
use crate::transport::{Segment, Transport, TransportFeatures};
use maybe_async::maybe_async;

/// Maximum command bytes compared against an echo event
pub const ECHO_CMD_BYTES: usize = FIFO_EVENT_SIZE - 3;

/// Number of error events kept by [`ErrorLog`]
pub const ERROR_LOG_LEN: usize = 8;

/// Confirms that the controller accepted a firmware command
#[maybe_async(AFIT)]
pub trait EchoVerifier<T: Transport + ?Sized> {
    /// Forget any event state left over from earlier commands
    async fn reset(&mut self, bus: &mut T);

    /// Check the controller's echo of `cmd`
    async fn check_echo(
        &mut self,
        bus: &mut T,
        cmd: &[u8],
    ) -> core::result::Result<(), EchoFailure>;
}

/// Verifier that accepts every command without reading anything
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAccept;

#[maybe_async(AFIT)]
impl<T: Transport + ?Sized> EchoVerifier<T> for AlwaysAccept {
    async fn reset(&mut self, _bus: &mut T) {}

    async fn check_echo(
        &mut self,
        _bus: &mut T,
        _cmd: &[u8],
    ) -> core::result::Result<(), EchoFailure> {
        Ok(())
    }
}

/// Error events reported by the controller while waiting for echoes
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    events: heapless::Vec<[u8; FIFO_EVENT_SIZE], ERROR_LOG_LEN>,
    dropped: usize,
}

impl ErrorLog {
    /// Create an empty log
    pub const fn new() -> Self {
        Self {
            events: heapless::Vec::new(),
            dropped: 0,
        }
    }

    /// Record an error event; once full, further events are only counted
    pub fn record(&mut self, event: [u8; FIFO_EVENT_SIZE]) {
        if self.events.push(event).is_err() {
            self.dropped += 1;
        }
    }

    /// Remove every recorded event
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> &[[u8; FIFO_EVENT_SIZE]] {
        &self.events
    }

    /// Events seen after the log was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.dropped == 0
    }
}

/// Echo verifier that polls the controller's event FIFO
///
/// Reads one event at a time with [`FIFO_READ_ONE`] until the echo of the
/// command shows up or the polling budget from [`IoConfig`] is used up.
/// Error events abort the wait and are kept in [`FifoEchoVerifier::errors`].
///
/// Resetting the verifier drains whatever is already queued in the FIFO,
/// so an old echo of the same command is never taken as the new one.
#[derive(Debug, Clone)]
pub struct FifoEchoVerifier {
    polls: u32,
    poll_ms: u32,
    errors: ErrorLog,
}

impl FifoEchoVerifier {
    /// Create a verifier with the echo timing of `config`
    pub fn new(config: &IoConfig) -> Self {
        Self {
            polls: config.echo_polls(),
            poll_ms: config.echo_poll_ms,
            errors: ErrorLog::new(),
        }
    }

    /// Error events seen since the last reset
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Default for FifoEchoVerifier {
    fn default() -> Self {
        Self::new(&IoConfig::default())
    }
}

/// Build the event an echo of `cmd` must start with; returns its length
fn expected_echo(cmd: &[u8], event: &mut [u8; FIFO_EVENT_SIZE]) -> usize {
    let compared = core::cmp::min(cmd.len(), ECHO_CMD_BYTES);
    event[0] = EVT_ID_STATUS_UPDATE;
    event[1] = EVT_TYPE_STATUS_ECHO;
    event[2..2 + compared].copy_from_slice(&cmd[..compared]);
    2 + compared
}

/// Read one event with [`FIFO_READ_ONE`], dropping the dummy byte if any
#[maybe_async]
async fn read_event<T: Transport + ?Sized>(
    bus: &mut T,
) -> core::result::Result<[u8; FIFO_EVENT_SIZE], TransportFault> {
    let dummy = if bus.features().contains(TransportFeatures::READ_DUMMY_BYTE) {
        DUMMY_BYTE
    } else {
        0
    };
    let opcode = [FIFO_READ_ONE];
    let mut raw = [0u8; FIFO_EVENT_SIZE + DUMMY_BYTE];
    bus.transfer(&mut [
        Segment::Write(&opcode),
        Segment::Read(&mut raw[..FIFO_EVENT_SIZE + dummy]),
    ])
    .await?;

    let mut event = [0u8; FIFO_EVENT_SIZE];
    event.copy_from_slice(&raw[dummy..dummy + FIFO_EVENT_SIZE]);
    Ok(event)
}

#[maybe_async(AFIT)]
impl<T: Transport + ?Sized> EchoVerifier<T> for FifoEchoVerifier {
    async fn reset(&mut self, bus: &mut T) {
        self.errors.clear();

        // Bounded by the polling budget
        for _ in 0..self.polls {
            match read_event(bus).await {
                Ok(event) if event[0] == EVT_ID_NO_EVENT => return,
                Ok(event) => log::debug!("discarding stale event {:02X?}", event),
                Err(fault) => {
                    log::debug!("event read failed while draining the FIFO: {}", fault);
                    return;
                }
            }
        }
    }

    async fn check_echo(
        &mut self,
        bus: &mut T,
        cmd: &[u8],
    ) -> core::result::Result<(), EchoFailure> {
        if cmd.is_empty() {
            return Err(EchoFailure::Code(ERROR_OP_NOT_ALLOW));
        }

        let mut expected = [0u8; FIFO_EVENT_SIZE];
        let expected_len = expected_echo(cmd, &mut expected);

        for poll in 0..self.polls {
            let event = read_event(bus).await.map_err(|fault| {
                log::debug!("event read failed while waiting for echo: {}", fault);
                EchoFailure::EventReadFailed
            })?;

            match event[0] {
                EVT_ID_NO_EVENT => {}
                EVT_ID_ERROR => {
                    log::debug!("error event while waiting for echo: {:02X?}", event);
                    self.errors.record(event);
                    return Err(EchoFailure::ErrorEvent {
                        id: event[0],
                        kind: event[1],
                    });
                }
                _ if event[..expected_len] == expected[..expected_len] => {
                    log::trace!("echo of {:02X?} received after {} polls", cmd, poll + 1);
                    return Ok(());
                }
                _ => log::trace!("skipping event {:02X?}", event),
            }

            if poll + 1 < self.polls {
                bus.delay_ms(self.poll_ms).await;
            }
        }

        log::debug!("no echo of {:02X?} after {} polls", cmd, self.polls);
        Err(EchoFailure::NoEcho)
    }
}

/// One firmware write attempt: raw write, then echo check
struct EchoedWrite<'a, V: ?Sized> {
    cmd: &'a [u8],
    verifier: &'a mut V,
}

#[maybe_async(AFIT)]
impl<T, V> Attempt<T> for EchoedWrite<'_, V>
where
    T: Transport + ?Sized,
    V: EchoVerifier<T> + ?Sized,
{
    async fn attempt(&mut self, bus: &mut T) -> Result<()> {
        bus.transfer(&mut [Segment::Write(self.cmd)])
            .await
            .map_err(|fault| {
                log::trace!("firmware command write failed: {}", fault);
                Error::WriteFailed
            })?;
        self.verifier
            .check_echo(bus, self.cmd)
            .await
            .map_err(Error::EchoMismatch)
    }
}

/// Write a firmware command and wait for its echo, retrying both together
///
/// The verifier is reset against the bus before the first attempt. When the
/// budget runs out the last attempt decides the error: `WriteFailed` if its
/// raw write failed, otherwise `EchoMismatch` with the verifier's failure.
#[maybe_async]
pub async fn write_with_echo<T, V>(
    bus: &mut T,
    policy: RetryPolicy,
    cmd: &[u8],
    verifier: &mut V,
) -> Result<()>
where
    T: Transport + ?Sized,
    V: EchoVerifier<T> + ?Sized,
{
    verifier.reset(bus).await;
    retry(bus, policy, &mut EchoedWrite { cmd, verifier }).await
}
