//! Controller op codes, event identifiers and buffer sizes
//!
//! The engine itself only needs the FIFO and event definitions (for echo
//! checking) and the chunk sizes; the remaining op codes are the common
//! register-access commands the framing is used with.

// ============================================================================
// Register access
// ============================================================================

/// Hardware register read/write (4-byte address)
pub const HW_REG: u8 = 0xFA;
/// Frame buffer read (2-byte address, leading dummy byte)
pub const FRAMEBUFFER_R: u8 = 0xA6;
/// Config memory read (2-byte address)
pub const CONFIG_R: u8 = 0xA8;
/// Config memory write (2-byte address)
pub const CONFIG_W: u8 = 0xA8;

// ============================================================================
// Firmware commands (echoed through the event FIFO)
// ============================================================================

/// Scan mode command
pub const SCAN_MODE: u8 = 0xA0;
/// Feature enable command
pub const FEATURE: u8 = 0xA2;
/// System command (save config, clear FIFO, ...)
pub const SYSTEM: u8 = 0xA4;

// ============================================================================
// Event FIFO
// ============================================================================

/// Read all pending events
pub const FIFO_READ_ALL: u8 = 0x86;
/// Read one event
pub const FIFO_READ_ONE: u8 = 0x87;
/// Size of one event in bytes
pub const FIFO_EVENT_SIZE: usize = 8;

/// Event id: FIFO empty
pub const EVT_ID_NO_EVENT: u8 = 0x00;
/// Event id: status update
pub const EVT_ID_STATUS_UPDATE: u8 = 0x43;
/// Event id: error report
pub const EVT_ID_ERROR: u8 = 0xF3;

/// Status update type: firmware command echo
pub const EVT_TYPE_STATUS_ECHO: u8 = 0x01;

// ============================================================================
// Transfer sizes
// ============================================================================

/// Maximum payload bytes read in one chunk
pub const READ_CHUNK: usize = 1024;
/// Maximum payload bytes written in one chunk
pub const WRITE_CHUNK: usize = 1024;
/// Size of the placeholder byte some read commands return first
pub const DUMMY_BYTE: usize = 1;
