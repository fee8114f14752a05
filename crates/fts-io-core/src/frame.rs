//! Command header framing
//!
//! A register-access command starts with a header: one op code byte
//! followed by the address, big-endian, in a configurable number of bytes.
//!
//! ```text
//! +--------+---------+---------+-----+---------+
//! | opcode | addr[n] | addr[n-1] ... | addr[0] |
//! +--------+---------+---------+-----+---------+
//! ```
//!
//! Only the low `width * 8` bits of the address are framed. Higher bits
//! are dropped without error; the controller's address map is assumed to
//! fit the chosen width.

use crate::error::{Error, Result};
use crate::opcodes::DUMMY_BYTE;

/// Maximum address width in bytes (a 64-bit address)
pub const MAX_ADDR_SIZE: usize = 8;

/// Maximum header length: op code plus the widest address
pub const MAX_HEADER_LEN: usize = 1 + MAX_ADDR_SIZE;

/// Address width in bytes
///
/// Any value can be constructed; widths above [`MAX_ADDR_SIZE`] are
/// rejected when a header is framed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddrSize(pub u8);

impl AddrSize {
    /// No address phase (op code only)
    pub const NONE: Self = Self(0);
    /// 1-byte address
    pub const BITS_8: Self = Self(1);
    /// 2-byte address
    pub const BITS_16: Self = Self(2);
    /// 3-byte address
    pub const BITS_24: Self = Self(3);
    /// 4-byte address
    pub const BITS_32: Self = Self(4);
    /// 5-byte address
    pub const BITS_40: Self = Self(5);
    /// 6-byte address
    pub const BITS_48: Self = Self(6);
    /// 8-byte address
    pub const BITS_64: Self = Self(8);

    /// Returns the number of address bytes
    pub const fn bytes(&self) -> usize {
        self.0 as usize
    }

    /// Returns the header length for this width (op code included)
    pub const fn header_len(&self) -> usize {
        1 + self.0 as usize
    }

    /// Check that the width fits a 64-bit address
    pub fn check(&self) -> Result<()> {
        if self.bytes() > MAX_ADDR_SIZE {
            log::error!(
                "address size bigger than max allowed {}: {}",
                MAX_ADDR_SIZE,
                self.0
            );
            return Err(Error::AddressWidthUnsupported(self.0));
        }
        Ok(())
    }
}

/// An addressed command: op code plus the address width it expects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegCmd {
    /// The op code byte
    pub opcode: u8,
    /// Address width in bytes
    pub addr_size: AddrSize,
    /// Reads with this command return one leading byte without data
    pub dummy_byte: bool,
}

impl RegCmd {
    /// Create a new addressed command
    pub const fn new(opcode: u8, addr_size: AddrSize) -> Self {
        Self {
            opcode,
            addr_size,
            dummy_byte: false,
        }
    }

    /// Mark reads with this command as starting with a dummy byte
    pub const fn with_dummy_byte(mut self) -> Self {
        self.dummy_byte = true;
        self
    }

    /// Number of leading bytes to discard from a read
    pub const fn read_skip(&self) -> usize {
        if self.dummy_byte {
            DUMMY_BYTE
        } else {
            0
        }
    }

    /// Create a command that carries no address
    pub const fn bare(opcode: u8) -> Self {
        Self::new(opcode, AddrSize::NONE)
    }

    /// Frame this command for `address`
    pub fn header(&self, address: u64) -> Result<Header> {
        Header::new(self.opcode, address, self.addr_size)
    }
}

/// A framed command header
///
/// Fixed-size storage, no allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    bytes: [u8; MAX_HEADER_LEN],
    len: u8,
}

impl Header {
    /// Frame `opcode` followed by the low `width` bytes of `address`,
    /// most significant byte first
    pub fn new(opcode: u8, address: u64, width: AddrSize) -> Result<Self> {
        width.check()?;
        let mut header = Self {
            bytes: [0; MAX_HEADER_LEN],
            len: width.header_len() as u8,
        };
        header.bytes[0] = opcode;
        encode_be(
            address,
            width.bytes(),
            width.bytes(),
            &mut header.bytes[1..],
        );
        Ok(header)
    }

    /// Frame the two headers of a split-address command
    ///
    /// `address` is treated as one `(w1 + w2)`-byte big-endian value: the
    /// first header carries its top `w1` bytes and the second header the
    /// following `w2` bytes.
    pub fn split(first: RegCmd, second: RegCmd, address: u64) -> Result<(Self, Self)> {
        let combined = check_split(&first, &second)?;
        let w1 = first.addr_size.bytes();
        let w2 = second.addr_size.bytes();

        let mut upper = Self {
            bytes: [0; MAX_HEADER_LEN],
            len: first.addr_size.header_len() as u8,
        };
        upper.bytes[0] = first.opcode;
        encode_be(address, combined, w1, &mut upper.bytes[1..]);

        let mut lower = Self {
            bytes: [0; MAX_HEADER_LEN],
            len: second.addr_size.header_len() as u8,
        };
        lower.bytes[0] = second.opcode;
        encode_be(address, w2, w2, &mut lower.bytes[1..]);

        Ok((upper, lower))
    }

    /// The op code byte
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// The framed bytes (op code and address)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Header length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false: a header holds at least the op code
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl core::fmt::Debug for Header {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Header({:02X?})", self.as_bytes())
    }
}

/// Check both widths of a split-address command; returns the combined width
pub fn check_split(first: &RegCmd, second: &RegCmd) -> Result<usize> {
    first.addr_size.check()?;
    second.addr_size.check()?;

    let w1 = first.addr_size.bytes();
    let w2 = second.addr_size.bytes();
    let combined = w1 + w2;
    if combined > MAX_ADDR_SIZE {
        log::error!(
            "combined address size {} + {} bigger than max allowed {}",
            w1,
            w2,
            MAX_ADDR_SIZE
        );
        return Err(Error::AddressWidthUnsupported(combined as u8));
    }
    Ok(combined)
}

/// Write the first `count` bytes of the `total`-byte big-endian
/// representation of `address` into `buf`
///
/// Byte `i` is `address >> ((total - 1 - i) * 8)`, so bits above
/// `total * 8` never reach the output.
fn encode_be(address: u64, total: usize, count: usize, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().take(count).enumerate() {
        let shift = (total - 1 - i) * 8;
        *byte = (address >> shift) as u8;
    }
}
