//! Bounded retry around raw transfers
//!
//! Every bus operation the engine issues goes through [`retry`]: the
//! operation is attempted up to `attempts` times, with a fixed delay
//! between failed attempts. The loop stops at the first success; when the
//! budget runs out the last attempt's error is returned.
//!
//! What one attempt does is described by the [`Attempt`] trait, so the
//! plain raw transfer and the echo-checked firmware write share the same
//! loop.

use crate::config::IoConfig;
use crate::error::{Error, Result, TransportFault};
use crate::transport::{Segment, Transport};
use maybe_async::maybe_async;

/// Retry budget for one bus operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one is always made)
    pub attempts: u8,
    /// Delay between failed attempts, in milliseconds
    pub delay_ms: u32,
}

impl RetryPolicy {
    /// Create a policy
    pub const fn new(attempts: u8, delay_ms: u32) -> Self {
        Self { attempts, delay_ms }
    }
}

impl From<&IoConfig> for RetryPolicy {
    fn from(config: &IoConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay_ms)
    }
}

/// Shape of a raw transfer, used to classify its failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    /// Read-only
    Read,
    /// Write-only
    Write,
    /// Write followed by read (or write, write, read)
    WriteRead,
    /// Header-only write opening a split-address operation
    FirstWrite,
    /// Header + payload write completing a split-address operation
    SecondWrite,
}

impl TransferKind {
    /// Error reported when this transfer exhausts its retry budget
    pub const fn failure(&self) -> Error {
        match self {
            Self::Read => Error::ReadFailed,
            Self::Write => Error::WriteFailed,
            Self::WriteRead => Error::WriteReadFailed,
            Self::FirstWrite => Error::FirstWriteFailed,
            Self::SecondWrite => Error::SecondWriteFailed,
        }
    }

    /// Short name for log messages
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::WriteRead => "write-read",
            Self::FirstWrite => "first write",
            Self::SecondWrite => "second write",
        }
    }
}

/// One attempt of a retried bus operation
#[maybe_async(AFIT)]
pub trait Attempt<T: Transport + ?Sized> {
    /// Perform the operation once
    async fn attempt(&mut self, bus: &mut T) -> Result<()>;
}

/// A prepared raw transfer: the same phase list is replayed on every attempt
pub struct RawTransfer<'s, 'b> {
    segments: &'s mut [Segment<'b>],
    kind: TransferKind,
}

impl<'s, 'b> RawTransfer<'s, 'b> {
    /// Wrap a phase list
    pub fn new(kind: TransferKind, segments: &'s mut [Segment<'b>]) -> Self {
        Self { segments, kind }
    }
}

#[maybe_async(AFIT)]
impl<T: Transport + ?Sized> Attempt<T> for RawTransfer<'_, '_> {
    async fn attempt(&mut self, bus: &mut T) -> Result<()> {
        let kind = self.kind;
        bus.transfer(self.segments)
            .await
            .map_err(|fault: TransportFault| {
                log::trace!("{} transfer failed: {}", kind.name(), fault);
                kind.failure()
            })
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up
///
/// The delay is applied between attempts, never after the last one.
/// The final failure is logged here, once.
#[maybe_async]
pub async fn retry<T, A>(bus: &mut T, policy: RetryPolicy, op: &mut A) -> Result<()>
where
    T: Transport + ?Sized,
    A: Attempt<T> + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut last = Ok(());

    for attempt in 1..=attempts {
        match op.attempt(bus).await {
            Ok(()) => {
                if attempt > 1 {
                    log::debug!("succeeded on attempt {}/{}", attempt, attempts);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt < attempts {
                    log::warn!("{} (attempt {}/{}), retrying...", e, attempt, attempts);
                    bus.delay_ms(policy.delay_ms).await;
                }
                last = Err(e);
            }
        }
    }

    if let Err(e) = last {
        log::error!(
            "giving up after {} attempts: {} ({:08X})",
            attempts,
            e,
            e.code()
        );
    }
    last
}

/// Retry a raw transfer described by `segments`
#[maybe_async]
pub async fn transfer<T: Transport + ?Sized>(
    bus: &mut T,
    policy: RetryPolicy,
    kind: TransferKind,
    segments: &mut [Segment<'_>],
) -> Result<()> {
    retry(bus, policy, &mut RawTransfer::new(kind, segments)).await
}
