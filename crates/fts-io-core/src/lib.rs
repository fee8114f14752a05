//! fts-io-core - Register-access engine for I2C/SPI touch controllers
//!
//! The controller exposes a flat address space that can only be reached
//! through short, op-code-prefixed bus transactions. This crate turns
//! logical operations ("read N bytes at address A") into bounded sequences
//! of raw transfers: it frames op code + address headers, splits payloads
//! into chunks, retries every raw transfer a bounded number of times and
//! verifies firmware commands against the controller's echo event.
//!
//! It is designed to be `no_std` compatible. The bus itself is supplied by
//! the caller through the [`transport::Transport`] trait.
//!
//! # Features
//!
//! - `is_sync` (default) - Compile the engine as blocking code. Without it
//!   every transport-facing function is `async`.
//! - `std` - Enable standard library support (TOML configuration loading,
//!   `std::error::Error` impls)
//! - `alloc` - Enable heap allocation
//!
//! # Example
//!
//! ```ignore
//! use fts_io_core::{AddrSize, BufferMode, FtsIo, IoConfig, RegCmd};
//!
//! fn dump_registers<T: fts_io_core::Transport>(bus: T) -> fts_io_core::Result<()> {
//!     let mut io = FtsIo::new(IoConfig::default())?;
//!     io.open_channel(bus);
//!
//!     let mut regs = [0u8; 64];
//!     let cmd = RegCmd::new(fts_io_core::opcodes::HW_REG, AddrSize::BITS_32);
//!     io.read_at(cmd, 0x2000_0000, &mut regs, BufferMode::Direct)?;
//!     Ok(())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod chunk;
pub mod config;
pub mod echo;
pub mod error;
pub mod frame;
mod io;
pub mod opcodes;
pub mod retry;
pub mod scratch;
pub mod transport;

pub use config::IoConfig;
pub use echo::{AlwaysAccept, EchoVerifier, FifoEchoVerifier};
pub use error::{EchoFailure, Error, Result, TransportFault};
pub use frame::{AddrSize, Header, RegCmd};
pub use io::FtsIo;
pub use scratch::BufferMode;
pub use transport::{Segment, Transport, TransportFeatures};
