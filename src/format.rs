//! FLK container layout.
//!
//! ```text
//! offset  size        field
//! 0       4           magic            "FLK\0"
//! 4       1           version          1
//! 5       2           reserved         0xABCD
//! 7       4           salt_len         0 when unencrypted
//! 11      4           content_version  caller-defined, opaque
//! 15      4           entry_count      0..=256
//! 19      256 * 152   entries          fixed table, always fully present
//! 38931   salt_len    global salt
//! ...                 blobs, in entry order
//! ```
//!
//! Entry (152 bytes): `path[128]` (NUL-terminated), `offset`, `base_size`,
//! `packed_size` (u64 each).  All integers are little-endian; there is no
//! padding between fields.
//!
//! Unused slots carry a fixed sentinel (0xCC everywhere, path terminated at
//! its last byte) so archives are byte-reproducible and compress well.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{FlkError, FlkResult};

pub const MAGIC: &[u8; 4] = b"FLK\0";
pub const VERSION: u8 = 1;
pub const RESERVED: u16 = 0xABCD;

/// Capacity of the entry table.
pub const MAX_ENTRIES: usize = 256;
/// Path field capacity, terminator included.
pub const MAX_PATH_LEN: usize = 128;
/// Largest file accepted for packing (1 GiB).
pub const MAX_FILE_SIZE: u64 = 1 << 30;

pub const PADDING_BYTE: u8 = 0xCC;
pub const PADDING_U64: u64 = 0xCCCC_CCCC_CCCC_CCCC;

pub const ENTRY_SIZE: usize = MAX_PATH_LEN + 3 * 8;
pub const HEADER_FIXED_SIZE: usize = 4 + 1 + 2 + 4 + 4 + 4;
/// Serialized header size.  Constant for every archive.
pub const HEADER_SIZE: usize = HEADER_FIXED_SIZE + MAX_ENTRIES * ENTRY_SIZE;

// ── Entry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path:        [u8; MAX_PATH_LEN],
    pub offset:      u64,
    pub base_size:   u64,
    pub packed_size: u64,
}

impl Entry {
    /// Filler for an unused slot.
    pub fn sentinel() -> Self {
        let mut path = [PADDING_BYTE; MAX_PATH_LEN];
        path[MAX_PATH_LEN - 1] = 0;
        Self {
            path,
            offset:      PADDING_U64,
            base_size:   PADDING_U64,
            packed_size: PADDING_U64,
        }
    }

    /// A used entry.  `offset` is assigned later by [`Header::assign_offsets`].
    pub fn new(stored_path: &[u8], base_size: u64, packed_size: u64) -> Self {
        Self {
            path: pad_path(stored_path),
            offset: 0,
            base_size,
            packed_size,
        }
    }

    /// Stored path bytes, up to the terminator.
    pub fn path_bytes(&self) -> &[u8] {
        let end = self.path.iter().position(|&b| b == 0).unwrap_or(MAX_PATH_LEN);
        &self.path[..end]
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.path)?;
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u64::<LittleEndian>(self.base_size)?;
        writer.write_u64::<LittleEndian>(self.packed_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut path = [0u8; MAX_PATH_LEN];
        reader.read_exact(&mut path)?;
        Ok(Self {
            path,
            offset:      reader.read_u64::<LittleEndian>()?,
            base_size:   reader.read_u64::<LittleEndian>()?,
            packed_size: reader.read_u64::<LittleEndian>()?,
        })
    }
}

/// Lay `stored` into a path field: bytes, terminator, then a decreasing
/// `0xCC - (i % 8)` pattern to the end of the field.  Input longer than 127
/// bytes is truncated; callers validate length first.
pub fn pad_path(stored: &[u8]) -> [u8; MAX_PATH_LEN] {
    let mut field = [PADDING_BYTE; MAX_PATH_LEN];
    let len = stored.len().min(MAX_PATH_LEN - 1);
    field[..len].copy_from_slice(&stored[..len]);
    field[len] = 0;
    for (i, b) in field.iter_mut().enumerate().skip(len + 1) {
        *b = PADDING_BYTE - (i % 8) as u8;
    }
    field
}

// ── EntryTable ────────────────────────────────────────────────────────────────

/// Fixed-capacity table of [`MAX_ENTRIES`] slots.  Every slot starts as a
/// sentinel; `len` is the number of slots in use.
#[derive(Debug, Clone)]
pub struct EntryTable {
    slots: Box<[Entry]>,
    len:   usize,
}

impl Default for EntryTable {
    fn default() -> Self { Self::new() }
}

impl EntryTable {
    pub fn new() -> Self {
        Self {
            slots: vec![Entry::sentinel(); MAX_ENTRIES].into_boxed_slice(),
            len:   0,
        }
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
    pub fn is_full(&self) -> bool { self.len == MAX_ENTRIES }

    /// Fill the next free slot.
    pub fn push(&mut self, entry: Entry) -> FlkResult<()> {
        if self.is_full() {
            return Err(FlkError::TooManyFiles { found: self.len + 1, max: MAX_ENTRIES });
        }
        self.slots[self.len] = entry;
        self.len += 1;
        Ok(())
    }

    /// Slots in use.
    pub fn used(&self) -> &[Entry] { &self.slots[..self.len] }
    pub fn used_mut(&mut self) -> &mut [Entry] { &mut self.slots[..self.len] }
    /// Slots past `len`.
    pub fn unused(&self) -> &[Entry] { &self.slots[self.len..] }
    /// All [`MAX_ENTRIES`] slots.
    pub fn slots(&self) -> &[Entry] { &self.slots }

    pub fn get(&self, index: usize) -> Option<&Entry> { self.used().get(index) }

    /// Reset every slot past `len` to the sentinel.
    pub fn fill_unused(&mut self) {
        for slot in &mut self.slots[self.len..] {
            *slot = Entry::sentinel();
        }
    }

    fn from_slots(slots: Vec<Entry>, len: usize) -> Self {
        Self { slots: slots.into_boxed_slice(), len }
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Header {
    pub magic:           [u8; 4],
    pub version:         u8,
    pub reserved:        u16,
    pub salt_len:        u32,
    pub content_version: u32,
    pub entries:         EntryTable,
}

impl Default for Header {
    fn default() -> Self { Self::new(0) }
}

impl Header {
    pub fn new(content_version: u32) -> Self {
        Self {
            magic:    *MAGIC,
            version:  VERSION,
            reserved: RESERVED,
            salt_len: 0,
            content_version,
            entries:  EntryTable::new(),
        }
    }

    pub fn entry_count(&self) -> u32 { self.entries.len() as u32 }

    /// Offset of the first blob: header plus global salt.
    pub fn data_start(&self) -> u64 {
        HEADER_SIZE as u64 + self.salt_len as u64
    }

    /// Lay blobs back to back after the header and salt, in entry order.
    /// Returns the total archive length.
    pub fn assign_offsets(&mut self) -> u64 {
        let mut offset = self.data_start();
        for entry in self.entries.used_mut() {
            entry.offset = offset;
            offset += entry.packed_size;
        }
        offset
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u8(self.version)?;
        writer.write_u16::<LittleEndian>(self.reserved)?;
        writer.write_u32::<LittleEndian>(self.salt_len)?;
        writer.write_u32::<LittleEndian>(self.content_version)?;
        writer.write_u32::<LittleEndian>(self.entry_count())?;
        for entry in self.entries.slots() {
            entry.write(&mut writer)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> FlkResult<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FlkError::InvalidMagic { found: magic });
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(FlkError::UnsupportedVersion(version));
        }
        let reserved        = reader.read_u16::<LittleEndian>()?;
        let salt_len        = reader.read_u32::<LittleEndian>()?;
        let content_version = reader.read_u32::<LittleEndian>()?;
        let entry_count     = reader.read_u32::<LittleEndian>()? as usize;
        if entry_count > MAX_ENTRIES {
            return Err(FlkError::CorruptHeader(format!(
                "entry count {entry_count} exceeds table capacity {MAX_ENTRIES}"
            )));
        }
        if reserved != RESERVED {
            tracing::warn!("unexpected reserved field 0x{reserved:04x}");
        }

        let mut slots = Vec::with_capacity(MAX_ENTRIES);
        for _ in 0..MAX_ENTRIES {
            slots.push(Entry::read(&mut reader)?);
        }

        Ok(Self {
            magic,
            version,
            reserved,
            salt_len,
            content_version,
            entries: EntryTable::from_slots(slots, entry_count),
        })
    }
}
