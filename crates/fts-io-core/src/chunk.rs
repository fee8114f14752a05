//! Chunked register access
//!
//! Payloads larger than one safe bus transfer are split into chunks of at
//! most `read_chunk`/`write_chunk` bytes. Each chunk is framed with a
//! header for the current address and sent through the retry loop; the
//! address and the caller's cursor then advance by the chunk length.
//!
//! The first failing chunk aborts the whole operation. Chunks already
//! transferred are not rolled back.
//!
//! Writes are always framed in the context's scratch arena, since the
//! header has to sit right in front of the payload. Reads take a
//! [`BufferMode`]: `Scratch` stages every chunk in the arena, `Direct`
//! reads straight into the caller's buffer unless a dummy byte has to be
//! dropped first.

use crate::error::Result;
use crate::frame::{check_split, Header, RegCmd};
use crate::io::FtsIo;
use crate::retry::{self, RetryPolicy, TransferKind};
use crate::scratch::BufferMode;
use crate::transport::{Segment, Transport};
use maybe_async::maybe_async;

/// Put `header` and `payload` back to back at the front of `buf`
fn frame<'a>(buf: &'a mut [u8], header: &Header, payload: &[u8]) -> &'a [u8] {
    let len = header.len() + payload.len();
    buf[..header.len()].copy_from_slice(header.as_bytes());
    buf[header.len()..len].copy_from_slice(payload);
    &buf[..len]
}

/// Send `header` and read into `chunk`, going through `staging` if needed
#[maybe_async]
async fn read_chunk<T: Transport>(
    bus: &mut T,
    policy: RetryPolicy,
    header: &[u8],
    chunk: &mut [u8],
    skip: usize,
    mode: BufferMode,
    staging: &mut [u8],
) -> Result<()> {
    if mode == BufferMode::Direct && skip == 0 {
        return retry::transfer(
            bus,
            policy,
            TransferKind::WriteRead,
            &mut [Segment::Write(header), Segment::Read(chunk)],
        )
        .await;
    }

    let raw_len = chunk.len() + skip;
    retry::transfer(
        bus,
        policy,
        TransferKind::WriteRead,
        &mut [Segment::Write(header), Segment::Read(&mut staging[..raw_len])],
    )
    .await?;
    chunk.copy_from_slice(&staging[skip..raw_len]);
    Ok(())
}

#[maybe_async]
impl<T: Transport> FtsIo<T> {
    /// Write `data` starting at `address`
    ///
    /// Each chunk goes out as a single write of header followed by payload.
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AddressWidthUnsupported` - `cmd` has an address wider than 8 bytes
    /// * `WriteFailed` - A chunk exhausted its retries
    pub async fn write_at(&mut self, cmd: RegCmd, address: u64, data: &[u8]) -> Result<()> {
        let policy = self.policy();
        let cap = self.config().write_chunk;
        let (bus, scratch) = self.parts()?;
        cmd.addr_size.check()?;

        let mut address = address;
        for chunk in data.chunks(cap) {
            let header = cmd.header(address)?;
            log::debug!("write chunk {:?} + {} bytes", header, chunk.len());

            let out = frame(&mut scratch.write, &header, chunk);
            retry::transfer(bus, policy, TransferKind::Write, &mut [Segment::Write(out)])
                .await?;

            address = address.wrapping_add(chunk.len() as u64);
        }
        Ok(())
    }

    /// Fill `buf` with the bytes starting at `address`
    ///
    /// Each chunk is a write of the header followed by a read. If `cmd`
    /// has a dummy byte, one extra byte is read per chunk and dropped.
    /// With `BufferMode::Direct` and no dummy byte, chunks are received
    /// in place.
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AddressWidthUnsupported` - `cmd` has an address wider than 8 bytes
    /// * `WriteReadFailed` - A chunk exhausted its retries
    pub async fn read_at(
        &mut self,
        cmd: RegCmd,
        address: u64,
        buf: &mut [u8],
        mode: BufferMode,
    ) -> Result<()> {
        let policy = self.policy();
        let cap = self.config().read_chunk;
        let (bus, scratch) = self.parts()?;
        cmd.addr_size.check()?;

        let skip = cmd.read_skip();
        let mut address = address;
        for chunk in buf.chunks_mut(cap) {
            let header = cmd.header(address)?;
            log::debug!("read chunk {:?} -> {} bytes", header, chunk.len() + skip);

            read_chunk(
                bus,
                policy,
                header.as_bytes(),
                chunk,
                skip,
                mode,
                &mut scratch.read,
            )
            .await?;

            address = address.wrapping_add(chunk.len() as u64);
        }
        Ok(())
    }

    /// Write `data` through a split-address command pair
    ///
    /// For every chunk, `first` is sent alone with the upper part of the
    /// address, then `second` with the lower part followed by the payload.
    /// The second write is never attempted if the first one failed.
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AddressWidthUnsupported` - A width, or both widths combined, exceed 8 bytes
    /// * `FirstWriteFailed` - The address-latch write exhausted its retries
    /// * `SecondWriteFailed` - The payload write exhausted its retries
    pub async fn write_at_split(
        &mut self,
        first: RegCmd,
        second: RegCmd,
        address: u64,
        data: &[u8],
    ) -> Result<()> {
        let policy = self.policy();
        let cap = self.config().write_chunk;
        let (bus, scratch) = self.parts()?;
        check_split(&first, &second)?;

        let mut address = address;
        for chunk in data.chunks(cap) {
            let (upper, lower) = Header::split(first, second, address)?;
            log::debug!(
                "split write chunk {:?} {:?} + {} bytes",
                upper,
                lower,
                chunk.len()
            );

            retry::transfer(
                bus,
                policy,
                TransferKind::FirstWrite,
                &mut [Segment::Write(upper.as_bytes())],
            )
            .await?;

            let out = frame(&mut scratch.extra_write, &lower, chunk);
            retry::transfer(
                bus,
                policy,
                TransferKind::SecondWrite,
                &mut [Segment::Write(out)],
            )
            .await?;

            address = address.wrapping_add(chunk.len() as u64);
        }
        Ok(())
    }

    /// Fill `buf` through a split-address command pair
    ///
    /// For every chunk, `first` is sent alone with the upper part of the
    /// address, then `second` with the lower part is followed by a read.
    /// The dummy byte setting of `second` applies to the read, and `mode`
    /// works as for [`FtsIo::read_at`].
    ///
    /// # Errors
    /// * `BusNotOpen` - No transport bound
    /// * `AddressWidthUnsupported` - A width, or both widths combined, exceed 8 bytes
    /// * `FirstWriteFailed` - The address-latch write exhausted its retries
    /// * `WriteReadFailed` - The read exhausted its retries
    pub async fn read_at_split(
        &mut self,
        first: RegCmd,
        second: RegCmd,
        address: u64,
        buf: &mut [u8],
        mode: BufferMode,
    ) -> Result<()> {
        let policy = self.policy();
        let cap = self.config().read_chunk;
        let (bus, scratch) = self.parts()?;
        check_split(&first, &second)?;

        let skip = second.read_skip();
        let mut address = address;
        for chunk in buf.chunks_mut(cap) {
            let (upper, lower) = Header::split(first, second, address)?;
            log::debug!(
                "split read chunk {:?} {:?} -> {} bytes",
                upper,
                lower,
                chunk.len() + skip
            );

            retry::transfer(
                bus,
                policy,
                TransferKind::FirstWrite,
                &mut [Segment::Write(upper.as_bytes())],
            )
            .await?;
            read_chunk(
                bus,
                policy,
                lower.as_bytes(),
                chunk,
                skip,
                mode,
                &mut scratch.read,
            )
            .await?;

            address = address.wrapping_add(chunk.len() as u64);
        }
        Ok(())
    }
}
