//! Entry table records and their device I/O.

use bitflags::bitflags;

use crate::device::{debug_assert_aligned, BlockDevice};
use crate::layout::entry_addr;

bitflags! {
    /// The metadata bitfield of an entry record (byte 0 of the 4-byte
    /// record), LSB first: `ACTIVE`, `OPEN`, `KEY_MULTIPAGE`,
    /// `VALUE_MULTIPAGE`, then a 2-bit `KEY_FORMAT` field (only
    /// `STRING = 0` is defined) and two reserved bits.
    pub(crate) struct EntryFlags: u8 {
        const ACTIVE = 1 << 0;
        const OPEN = 1 << 1;
        const KEY_MULTIPAGE = 1 << 2;
        const VALUE_MULTIPAGE = 1 << 3;
        const KEY_FORMAT_MASK = 0b0011_0000;
    }
}

/// A 4-byte entry table record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub flags: EntryFlags,
    pub key_start: u8,
    pub value_start: u8,
    pub remains: u8,
}

impl Default for Entry {
    /// The `FREE` state: an all-zero record.
    fn default() -> Entry {
        Entry {
            flags: EntryFlags::empty(),
            key_start: 0,
            value_start: 0,
            remains: 0,
        }
    }
}

impl Entry {
    pub(crate) fn to_bytes(self) -> [u8; 4] {
        [self.flags.bits(), self.key_start, self.value_start, self.remains]
    }

    pub(crate) fn from_bytes(buf: [u8; 4]) -> Entry {
        Entry {
            flags: EntryFlags::from_bits_truncate(buf[0]),
            key_start: buf[1],
            value_start: buf[2],
            remains: buf[3],
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags.contains(EntryFlags::ACTIVE)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.flags.contains(EntryFlags::OPEN)
    }

    /// Neither active nor open: a truly empty slot available for a new
    /// entry.
    pub(crate) fn is_free(&self) -> bool {
        !self.is_active() && !self.is_open()
    }
}

/// Read the entry at table slot `index`. Always hits the device directly
/// (no caching), so post-crash state is observable.
pub(crate) fn read_entry<D: BlockDevice>(device: &D, index: u8) -> Entry {
    let mut buf = [0u8; 4];
    let addr = entry_addr(index);
    debug_assert_aligned(addr, buf.len());
    device.read(addr, &mut buf);
    Entry::from_bytes(buf)
}

/// Write the entry at table slot `index`.
pub(crate) fn write_entry<D: BlockDevice>(
    device: &mut D,
    index: u8,
    entry: Entry,
) -> Result<(), D::Error> {
    let addr = entry_addr(index);
    let bytes = entry.to_bytes();
    debug_assert_aligned(addr, bytes.len());
    device.program(addr, &bytes)
}
