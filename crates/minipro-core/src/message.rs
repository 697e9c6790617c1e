//! Fixed-capacity command frames
//!
//! Every command and reply exchanged with the programmer is a small byte
//! buffer with fields at fixed offsets. Instead of poking offsets by hand,
//! frame layouts are declared once as [`Field`] constants (see
//! [`crate::protocol`]) and read or written through [`Message::set`] and
//! [`Message::get`].

/// Byte order of a multi-byte field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

/// A named field inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Byte offset from the start of the frame
    pub offset: usize,
    /// Width in bytes (1..=8)
    pub width: usize,
    /// Byte order for multi-byte fields
    pub endian: Endian,
}

impl Field {
    /// Single byte at `offset`
    pub const fn byte(offset: usize) -> Self {
        Self {
            offset,
            width: 1,
            endian: Endian::Little,
        }
    }

    /// Little-endian integer of `width` bytes at `offset`
    pub const fn le(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            endian: Endian::Little,
        }
    }

    /// Big-endian integer of `width` bytes at `offset`
    pub const fn be(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            endian: Endian::Big,
        }
    }

    /// Same position and width with a different byte order
    pub const fn with_endian(self, endian: Endian) -> Self {
        Self { endian, ..self }
    }

    /// Same position and byte order, narrower width
    pub const fn with_width(self, width: usize) -> Self {
        Self { width, ..self }
    }

    /// Offset one past the last byte of the field
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Store `value` into `bytes` according to `field`, truncating to its width
pub fn store(bytes: &mut [u8], field: Field, value: u64) {
    let slot = &mut bytes[field.offset..field.end()];
    for (i, byte) in slot.iter_mut().enumerate() {
        let shift = match field.endian {
            Endian::Little => i,
            Endian::Big => field.width - 1 - i,
        };
        *byte = (value >> (8 * shift)) as u8;
    }
}

/// Load an integer from `bytes` according to `field`
pub fn load(bytes: &[u8], field: Field) -> u64 {
    bytes[field.offset..field.end()]
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &byte)| {
            let shift = match field.endian {
                Endian::Little => i,
                Endian::Big => field.width - 1 - i,
            };
            acc | (u64::from(byte) << (8 * shift))
        })
}

/// A command or reply frame of `N` bytes
///
/// Only a prefix of the buffer is sent for most commands (see
/// [`Message::frame`]); the remainder stays zero (or the fill byte).
#[derive(Clone, PartialEq, Eq)]
pub struct Message<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> Message<N> {
    /// All-zero frame with `opcode` in byte 0
    pub fn new(opcode: u8) -> Self {
        Self::filled(opcode, 0x00)
    }

    /// Frame filled with `fill`, `opcode` in byte 0
    pub fn filled(opcode: u8, fill: u8) -> Self {
        let mut buf = [fill; N];
        buf[0] = opcode;
        Self { buf }
    }

    /// All-zero buffer, used to receive replies
    pub fn zeroed() -> Self {
        Self { buf: [0; N] }
    }

    /// Write a field
    pub fn set(&mut self, field: Field, value: u64) -> &mut Self {
        store(&mut self.buf, field, value);
        self
    }

    /// Builder form of [`Message::set`]
    pub fn with(mut self, field: Field, value: u64) -> Self {
        self.set(field, value);
        self
    }

    /// Read a field
    pub fn get(&self, field: Field) -> u64 {
        load(&self.buf, field)
    }

    /// Read a single byte
    pub fn byte(&self, offset: usize) -> u8 {
        self.buf[offset]
    }

    /// Copy `data` into the frame starting at `offset`
    pub fn put_bytes(&mut self, offset: usize, data: &[u8]) -> &mut Self {
        self.buf[offset..offset + data.len()].copy_from_slice(data);
        self
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.buf[offset..offset + len]
    }

    /// First `len` bytes, i.e. what actually goes on the wire
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.buf[..len]
    }

    /// Whole buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whole buffer, mutable (receive target)
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl<const N: usize> core::fmt::Debug for Message<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Message<{}>({})", N, hex_dump(&self.buf))
    }
}

/// Space-separated hex rendering used in trace logs
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}
