//! I/O engine configuration
//!
//! Retry budget, retry delay, chunk sizes and echo polling parameters.
//! Defaults match the controller's reference driver. With the `std`
//! feature a configuration can be loaded from TOML:
//!
//! ```toml
//! retry_attempts = 5
//! retry_delay_ms = 2
//! read_chunk = 512
//! ```
//!
//! Keys that are left out keep their default value.

use crate::error::{Error, Result};
use crate::frame::MAX_HEADER_LEN;
use crate::opcodes::{DUMMY_BYTE, READ_CHUNK, WRITE_CHUNK};
use crate::scratch::{READ_BUF_LEN, WRITE_BUF_LEN};

/// Default number of attempts for every raw transfer
pub const DEFAULT_RETRY_ATTEMPTS: u8 = 3;
/// Default delay between failed attempts, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u32 = 2;
/// Default time to wait for a firmware command echo, in milliseconds
pub const DEFAULT_ECHO_TIMEOUT_MS: u32 = 100;
/// Default delay between event FIFO polls, in milliseconds
pub const DEFAULT_ECHO_POLL_MS: u32 = 1;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct IoConfig {
    /// Attempts per raw transfer (the retry budget)
    pub retry_attempts: u8,
    /// Delay between failed attempts, in milliseconds
    pub retry_delay_ms: u32,
    /// Maximum payload bytes per read chunk
    pub read_chunk: usize,
    /// Maximum payload bytes per write chunk
    pub write_chunk: usize,
    /// How long the FIFO echo verifier waits for the echo, in milliseconds
    pub echo_timeout_ms: u32,
    /// Delay between event FIFO polls, in milliseconds
    pub echo_poll_ms: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            read_chunk: READ_CHUNK,
            write_chunk: WRITE_CHUNK,
            echo_timeout_ms: DEFAULT_ECHO_TIMEOUT_MS,
            echo_poll_ms: DEFAULT_ECHO_POLL_MS,
        }
    }
}

impl IoConfig {
    /// Set the retry budget
    pub fn with_retries(mut self, attempts: u8, delay_ms: u32) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Set the read and write chunk sizes
    pub fn with_chunks(mut self, read_chunk: usize, write_chunk: usize) -> Self {
        self.read_chunk = read_chunk;
        self.write_chunk = write_chunk;
        self
    }

    /// Set the echo polling parameters
    pub fn with_echo_timing(mut self, timeout_ms: u32, poll_ms: u32) -> Self {
        self.echo_timeout_ms = timeout_ms;
        self.echo_poll_ms = poll_ms;
        self
    }

    /// Check that the values are usable with the fixed scratch arena
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            log::error!("I/O config: retry budget must be at least one attempt");
            return Err(Error::InvalidConfig);
        }
        if self.read_chunk == 0 || self.read_chunk + DUMMY_BYTE > READ_BUF_LEN {
            log::error!(
                "I/O config: read chunk {} outside 1..={}",
                self.read_chunk,
                READ_BUF_LEN - DUMMY_BYTE
            );
            return Err(Error::InvalidConfig);
        }
        if self.write_chunk == 0 || self.write_chunk + MAX_HEADER_LEN > WRITE_BUF_LEN {
            log::error!(
                "I/O config: write chunk {} outside 1..={}",
                self.write_chunk,
                WRITE_BUF_LEN - MAX_HEADER_LEN
            );
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Number of FIFO polls the echo verifier performs before giving up
    pub fn echo_polls(&self) -> u32 {
        if self.echo_poll_ms > 0 {
            (self.echo_timeout_ms / self.echo_poll_ms).max(1)
        } else {
            // Fall back to polling once per millisecond
            self.echo_timeout_ms.max(1)
        }
    }
}

/// Errors from loading a configuration file
#[cfg(feature = "std")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML text could not be parsed
    #[error("failed to parse I/O config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parsed but are out of range
    #[error("I/O config rejected: {0}")]
    Invalid(Error),
}

#[cfg(feature = "std")]
impl IoConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml_str(text: &str) -> core::result::Result<Self, ConfigError> {
        let config: IoConfig = toml::from_str(text)?;
        config.validate().map_err(ConfigError::Invalid)?;
        log::debug!("Loaded I/O config: {:?}", config);
        Ok(config)
    }
}
