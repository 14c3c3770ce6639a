//! Key lookup: scanning the entry table for a matching key.

use alloc::vec::Vec;

use crate::chain::read_chain_alloc;
use crate::device::BlockDevice;
use crate::entry::{read_entry, Entry};
use crate::error::KvatError;
use crate::layout::Header;

/// Keys up to this length are compared without a heap allocation.
const STRING_KEY_STDLEN: usize = 16;

/// Compare an entry's on-media key chain against `needle`, without
/// allocating unless the stored key overflows [`STRING_KEY_STDLEN`].
fn key_matches<D: BlockDevice>(
    device: &D,
    header: &Header,
    entry: &Entry,
    needle: &[u8],
) -> Result<bool, KvatError> {
    use crate::entry::EntryFlags;

    if !entry.is_active() {
        return Ok(false);
    }
    let is_multi = entry.flags.contains(EntryFlags::KEY_MULTIPAGE);

    if !is_multi && needle.len() <= STRING_KEY_STDLEN {
        let mut stack = [0u8; STRING_KEY_STDLEN];
        let effective_len = (header.page_size as usize).saturating_sub(entry.remains as usize);
        if effective_len != needle.len() {
            return Ok(false);
        }
        let page_size = header.page_size as usize;
        let mut scratch = [0u8; crate::layout::MAX_PAGE_SIZE];
        device.read(
            crate::layout::page_addr(header, entry.key_start),
            &mut scratch[..page_size],
        );
        stack[..effective_len].copy_from_slice(&scratch[..effective_len]);
        return Ok(&stack[..effective_len] == needle);
    }

    let stored = read_chain_alloc(device, header, entry.key_start, is_multi, entry.remains)?;
    Ok(stored == needle)
}

/// Prefix match used by `search`: does the entry's key start with
/// `prefix`?
fn key_starts_with<D: BlockDevice>(
    device: &D,
    header: &Header,
    entry: &Entry,
    prefix: &[u8],
) -> Result<bool, KvatError> {
    use crate::entry::EntryFlags;

    if !entry.is_active() {
        return Ok(false);
    }
    let is_multi = entry.flags.contains(EntryFlags::KEY_MULTIPAGE);
    let stored = read_chain_alloc(device, header, entry.key_start, is_multi, entry.remains)?;
    Ok(stored.len() >= prefix.len() && &stored[..prefix.len()] == prefix)
}

/// Linear scan of the table from slot `start` (inclusive) up to slot
/// `page_count - 1`, looking for an exact key match. Slot 0 is always
/// skipped even if `start` is 0.
pub(crate) fn find_exact<D: BlockDevice>(
    device: &D,
    header: &Header,
    start: u8,
    key: &[u8],
) -> Result<Option<u8>, KvatError> {
    let start = start.max(1);
    for index in start..header.page_count {
        let entry = read_entry(device, index);
        if key_matches(device, header, &entry, key)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Linear scan for the first free (neither active nor open) slot, from
/// slot `start` (inclusive) up to slot `page_count - 1`.
pub(crate) fn find_free<D: BlockDevice>(device: &D, header: &Header, start: u8) -> Option<u8> {
    let start = start.max(1);
    for index in start..header.page_count {
        let entry = read_entry(device, index);
        if entry.is_free() {
            return Some(index);
        }
    }
    None
}

/// First slot from `start` (inclusive) whose key starts with `prefix`,
/// used by the resumable prefix search.
pub(crate) fn find_prefix_from<D: BlockDevice>(
    device: &D,
    header: &Header,
    start: u8,
    prefix: &[u8],
) -> Result<Option<u8>, KvatError> {
    let start = start.max(1);
    for index in start..header.page_count {
        let entry = read_entry(device, index);
        if key_starts_with(device, header, &entry, prefix)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Collect every slot (1..page_count) whose key starts with `prefix`.
pub(crate) fn find_all_with_prefix<D: BlockDevice>(
    device: &D,
    header: &Header,
    prefix: &[u8],
) -> Result<Vec<u8>, KvatError> {
    let mut hits = Vec::new();
    for index in 1..header.page_count {
        let entry = read_entry(device, index);
        if key_starts_with(device, header, &entry, prefix)? {
            hits.try_reserve(1).map_err(|_| KvatError::HeapError)?;
            hits.push(index);
        }
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::write_chain;
    use crate::device::mock::RamDevice;
    use crate::entry::{write_entry, EntryFlags};
    use crate::layout::FORMAT_ID;
    use crate::bitmap::Bitmap;

    fn header(page_size: u32, page_count: u8) -> Header {
        Header {
            format_id: FORMAT_ID,
            page_size,
            page_count,
            page_begin_address: 16 + 4 * page_count as u32,
        }
    }

    fn put(dev: &mut RamDevice, bitmap: &mut Bitmap, header: &Header, slot: u8, key: &[u8]) {
        let out = write_chain(dev, header, bitmap, key, None).unwrap();
        let mut flags = EntryFlags::ACTIVE;
        if out.is_multi {
            flags |= EntryFlags::KEY_MULTIPAGE;
        }
        write_entry(
            dev,
            slot,
            Entry {
                flags,
                key_start: out.start_page,
                value_start: 0,
                remains: out.remains,
            },
        )
        .unwrap();
    }

    #[test]
    fn find_exact_locates_short_key_without_allocating_chain() {
        let header = header(12, 16);
        let mut dev = RamDevice::new(4096);
        let mut bitmap = Bitmap::new(16).unwrap();
        put(&mut dev, &mut bitmap, &header, 3, b"hello");

        let found = find_exact(&dev, &header, 1, b"hello").unwrap();
        assert_eq!(found, Some(3));
        let missing = find_exact(&dev, &header, 1, b"nope").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn find_exact_locates_long_key_via_chain_compare() {
        let header = header(12, 16);
        let mut dev = RamDevice::new(4096);
        let mut bitmap = Bitmap::new(16).unwrap();
        let long_key = b"a key longer than sixteen bytes for sure";
        put(&mut dev, &mut bitmap, &header, 2, long_key);

        let found = find_exact(&dev, &header, 1, long_key).unwrap();
        assert_eq!(found, Some(2));
    }

    #[test]
    fn find_free_skips_slot_zero_and_active_slots() {
        let header = header(12, 4);
        let mut dev = RamDevice::new(4096);
        let mut bitmap = Bitmap::new(4).unwrap();
        put(&mut dev, &mut bitmap, &header, 1, b"k");

        let free = find_free(&dev, &header, 1);
        assert_eq!(free, Some(2));
    }

    #[test]
    fn find_all_with_prefix_collects_matches() {
        let header = header(12, 8);
        let mut dev = RamDevice::new(4096);
        let mut bitmap = Bitmap::new(8).unwrap();
        put(&mut dev, &mut bitmap, &header, 1, b"user.name");
        put(&mut dev, &mut bitmap, &header, 2, b"user.age");
        put(&mut dev, &mut bitmap, &header, 3, b"device.id");

        let mut hits = find_all_with_prefix(&dev, &header, b"user.").unwrap();
        hits.sort();
        assert_eq!(hits, alloc::vec![1, 2]);
    }
}
