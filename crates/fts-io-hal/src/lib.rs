//! fts-io-hal - embedded-hal transports for fts-io
//!
//! Wraps an I2C or SPI device together with a delay provider into a
//! [`fts_io_core::Transport`], so the register-access engine can drive a
//! controller on any platform with an `embedded-hal` 1.0 implementation.
//!
//! With the default `is_sync` feature the blocking `embedded-hal` traits
//! are used. Without it the transports are built on `embedded-hal-async`
//! and every engine call becomes `async`.
//!
//! # Example
//!
//! ```ignore
//! use fts_io_core::{AddrSize, BufferMode, FtsIo, IoConfig, RegCmd};
//! use fts_io_hal::I2cTransport;
//!
//! let mut io = FtsIo::new(IoConfig::default())?;
//! io.open_channel(I2cTransport::new(i2c, delay, fts_io_hal::DEFAULT_I2C_ADDRESS));
//!
//! let mut chip_id = [0u8; 2];
//! let cmd = RegCmd::new(0xFA, AddrSize::BITS_32);
//! io.read_at(cmd, 0x2000_0000, &mut chip_id, BufferMode::Scratch)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(async_fn_in_trait)]

#[cfg(test)]
extern crate std;

mod i2c;
mod spi;

pub use i2c::{I2cTransport, DEFAULT_I2C_ADDRESS};
pub use spi::{SpiTransport, DEFAULT_CS_DELAY_NS};

/// Most segments a single transfer can carry (write, write, read)
pub(crate) const MAX_SEGMENTS: usize = 3;
