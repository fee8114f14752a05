//! Device context and single-shot bus operations
//!
//! [`FtsIo`] owns everything one controller needs: the bound transport,
//! the engine configuration and the scratch arena. All operations take
//! `&mut self`, so a context can only ever run one transaction at a time.

use crate::config::IoConfig;
use crate::echo::{write_with_echo, EchoVerifier};
use crate::error::{Error, Result};
use crate::retry::{self, RetryPolicy, TransferKind};
use crate::scratch::{
    ensure_fits, stage, BufferMode, ScratchBuffers, READ_BUF_LEN, WRITE_BUF_LEN,
};
use crate::transport::{Segment, Transport, TransportFeatures};
use maybe_async::maybe_async;

/// Register-access context for one controller
///
/// # Example
///
/// ```ignore
/// let mut io = FtsIo::new(IoConfig::default())?;
/// io.open_channel(bus);
///
/// let mut id = [0u8; 8];
/// io.write_read(&[0xFA, 0x20, 0x00, 0x00, 0x00], &mut id, BufferMode::Scratch)?;
/// ```
pub struct FtsIo<T> {
    bus: Option<T>,
    config: IoConfig,
    scratch: ScratchBuffers,
}

impl<T> Default for FtsIo<T> {
    fn default() -> Self {
        Self {
            bus: None,
            config: IoConfig::default(),
            scratch: ScratchBuffers::new(),
        }
    }
}

impl<T> FtsIo<T> {
    /// Create an unbound context
    ///
    /// # Errors
    /// * `InvalidConfig` - If `config` does not fit the scratch arena
    pub fn new(config: IoConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Bind the bus endpoint used for every following transaction
    ///
    /// Returns the previously bound transport, if any.
    pub fn open_channel(&mut self, bus: T) -> Option<T> {
        log::debug!(
            "openChannel: retries={} delay={}ms read_chunk={} write_chunk={}",
            self.config.retry_attempts,
            self.config.retry_delay_ms,
            self.config.read_chunk,
            self.config.write_chunk
        );
        self.bus.replace(bus)
    }

    /// Unbind and return the transport
    pub fn close_channel(&mut self) -> Option<T> {
        log::debug!("closeChannel");
        self.bus.take()
    }

    /// Returns true if a transport is bound
    pub fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    /// The bound transport
    pub fn transport(&self) -> Option<&T> {
        self.bus.as_ref()
    }

    /// The bound transport, mutably (e.g. to change its slave address)
    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.bus.as_mut()
    }

    /// The active configuration
    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Replace the configuration
    ///
    /// # Errors
    /// * `InvalidConfig` - The old configuration is kept
    pub fn set_config(&mut self, config: IoConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub(crate) fn policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config)
    }

    /// Split the context into the pieces one transaction needs
    ///
    /// Fails with `BusNotOpen` before anything touches the bus.
    pub(crate) fn parts(&mut self) -> Result<(&mut T, &mut ScratchBuffers)> {
        match self.bus.as_mut() {
            Some(bus) => Ok((bus, &mut self.scratch)),
            None => {
                log::error!("bus channel not open");
                Err(Error::BusNotOpen)
            }
        }
    }
}

#[maybe_async]
impl<T: Transport> FtsIo<T> {
    /// Read `buf.len()` bytes without sending anything first
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AllocationTooSmall` - `Scratch` mode and `buf` exceeds the read buffer
    /// * `ReadFailed` - Every attempt failed
    pub async fn read(&mut self, buf: &mut [u8], mode: BufferMode) -> Result<()> {
        let policy = self.policy();
        let (bus, scratch) = self.parts()?;

        match mode {
            BufferMode::Scratch => {
                ensure_fits(buf.len(), READ_BUF_LEN)?;
                let len = buf.len();
                retry::transfer(
                    bus,
                    policy,
                    TransferKind::Read,
                    &mut [Segment::Read(&mut scratch.read[..len])],
                )
                .await?;
                buf.copy_from_slice(&scratch.read[..len]);
            }
            BufferMode::Direct => {
                retry::transfer(bus, policy, TransferKind::Read, &mut [Segment::Read(buf)])
                    .await?;
            }
        }
        Ok(())
    }

    /// Write `cmd` in one transfer
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AllocationTooSmall` - `Scratch` mode and `cmd` exceeds the write buffer
    /// * `WriteFailed` - Every attempt failed
    pub async fn write(&mut self, cmd: &[u8], mode: BufferMode) -> Result<()> {
        let policy = self.policy();
        let (bus, scratch) = self.parts()?;

        let cmd = match mode {
            BufferMode::Scratch => {
                ensure_fits(cmd.len(), WRITE_BUF_LEN)?;
                stage(&mut scratch.write, cmd)
            }
            BufferMode::Direct => cmd,
        };
        retry::transfer(bus, policy, TransferKind::Write, &mut [Segment::Write(cmd)]).await
    }

    /// Write `cmd`, then read `buf.len()` bytes without a stop in between
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AllocationTooSmall` - `Scratch` mode and a buffer is too large
    /// * `WriteReadFailed` - Every attempt failed
    pub async fn write_read(
        &mut self,
        cmd: &[u8],
        buf: &mut [u8],
        mode: BufferMode,
    ) -> Result<()> {
        let policy = self.policy();
        let (bus, scratch) = self.parts()?;

        match mode {
            BufferMode::Scratch => {
                ensure_fits(cmd.len(), WRITE_BUF_LEN)?;
                ensure_fits(buf.len(), READ_BUF_LEN)?;
                let len = buf.len();
                let cmd = stage(&mut scratch.write, cmd);
                retry::transfer(
                    bus,
                    policy,
                    TransferKind::WriteRead,
                    &mut [Segment::Write(cmd), Segment::Read(&mut scratch.read[..len])],
                )
                .await?;
                buf.copy_from_slice(&scratch.read[..len]);
            }
            BufferMode::Direct => {
                retry::transfer(
                    bus,
                    policy,
                    TransferKind::WriteRead,
                    &mut [Segment::Write(cmd), Segment::Read(buf)],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Write a firmware command and confirm it through `verifier`
    ///
    /// The raw write and the echo check are retried together.
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AllocationTooSmall` - `Scratch` mode and `cmd` exceeds the write buffer
    /// * `WriteFailed` - The last attempt's raw write failed
    /// * `EchoMismatch` - The write went through but the echo never matched
    pub async fn write_fw_cmd<V>(
        &mut self,
        cmd: &[u8],
        mode: BufferMode,
        verifier: &mut V,
    ) -> Result<()>
    where
        V: EchoVerifier<T> + ?Sized,
    {
        let policy = self.policy();
        let (bus, scratch) = self.parts()?;

        let cmd = match mode {
            BufferMode::Scratch => {
                ensure_fits(cmd.len(), WRITE_BUF_LEN)?;
                stage(&mut scratch.write, cmd)
            }
            BufferMode::Direct => cmd,
        };
        write_with_echo(bus, policy, cmd, verifier).await
    }

    /// Write `cmd1`, write `cmd2`, then read `buf.len()` bytes
    ///
    /// Transports that can chain all three phases get one bus operation.
    /// Otherwise `cmd1` is sent as its own write, followed by a
    /// write-then-read of `cmd2`.
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AllocationTooSmall` - `Scratch` mode and a buffer is too large
    /// * `WriteFailed` - The separate first write failed (fallback path)
    /// * `WriteReadFailed` - Every attempt failed
    pub async fn write_then_write_read(
        &mut self,
        cmd1: &[u8],
        cmd2: &[u8],
        buf: &mut [u8],
        mode: BufferMode,
    ) -> Result<()> {
        let policy = self.policy();
        let (bus, scratch) = self.parts()?;
        let chained = bus.features().contains(TransportFeatures::WRITE_WRITE_READ);

        match mode {
            BufferMode::Scratch => {
                ensure_fits(cmd1.len(), WRITE_BUF_LEN)?;
                ensure_fits(cmd2.len(), WRITE_BUF_LEN)?;
                ensure_fits(buf.len(), READ_BUF_LEN)?;
                let len = buf.len();
                let cmd1 = stage(&mut scratch.write, cmd1);
                let cmd2 = stage(&mut scratch.extra_write, cmd2);
                let staging = &mut scratch.read[..len];
                if chained {
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::WriteRead,
                        &mut [
                            Segment::Write(cmd1),
                            Segment::Write(cmd2),
                            Segment::Read(staging),
                        ],
                    )
                    .await?;
                } else {
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::Write,
                        &mut [Segment::Write(cmd1)],
                    )
                    .await?;
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::WriteRead,
                        &mut [Segment::Write(cmd2), Segment::Read(staging)],
                    )
                    .await?;
                }
                buf.copy_from_slice(&scratch.read[..len]);
            }
            BufferMode::Direct => {
                if chained {
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::WriteRead,
                        &mut [
                            Segment::Write(cmd1),
                            Segment::Write(cmd2),
                            Segment::Read(buf),
                        ],
                    )
                    .await?;
                } else {
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::Write,
                        &mut [Segment::Write(cmd1)],
                    )
                    .await?;
                    retry::transfer(
                        bus,
                        policy,
                        TransferKind::WriteRead,
                        &mut [Segment::Write(cmd2), Segment::Read(buf)],
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}
