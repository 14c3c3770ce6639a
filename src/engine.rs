//! Public operations: `Engine<D>`, the single entry point applications
//! use to open, save, retrieve, rename, delete, and search a KVAT store.

use alloc::string::String;
use alloc::vec::Vec;

use crate::bitmap::{build_from_entries, Bitmap};
use crate::chain::{read_chain_alloc, read_chain_into, write_chain};
use crate::device::BlockDevice;
use crate::entry::{read_entry, write_entry, Entry, EntryFlags};
use crate::error::KvatError;
use crate::layout::{natural_page0_addr, Header, FORMAT_ID, HEADER_SIZE};
use crate::lookup::{find_exact, find_free, find_prefix_from};

/// First slot a resumable `search` should use when the caller has no
/// prior state.
pub const SEARCH_INITIAL: u8 = 1;

/// The result of a buffer-form `retrieve`: how much of the value was
/// copied, and whether the caller's buffer was too small to hold it all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retrieved {
    /// The value's true length, regardless of truncation.
    pub len: usize,
    /// Set when `len` exceeds the destination buffer's capacity, so only
    /// the first `dest.len()` bytes were written.
    pub truncated: bool,
}

fn str_with_nul(key: &str) -> Result<Vec<u8>, KvatError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(key.len() + 1)
        .map_err(|_| KvatError::HeapError)?;
    bytes.extend_from_slice(key.as_bytes());
    bytes.push(0);
    Ok(bytes)
}

/// The KVAT storage engine over a word-aligned [`BlockDevice`].
///
/// Owns the header copy, the in-RAM occupancy bitmap, and the
/// initialized flag that the original design kept as process-wide
/// globals (see the re-architecture notes this crate was built from).
pub struct Engine<D: BlockDevice> {
    device: D,
    header: Header,
    bitmap: Bitmap,
    initialized: bool,
}

impl<D: BlockDevice> Engine<D> {
    /// Bring the device up and make the store ready for use.
    ///
    /// If the on-media header's `format_id` does not match, the device
    /// is formatted from scratch with `page_size`/`page_count`;
    /// otherwise the existing on-media geometry is trusted and
    /// `page_size`/`page_count` are ignored. Either way, the occupancy
    /// bitmap is rebuilt from scratch by walking every active entry.
    pub fn open(mut device: D, page_size: u32, page_count: u8) -> Result<Engine<D>, KvatError> {
        debug_assert!(page_size % 4 == 0);
        debug_assert!(page_size as usize <= crate::layout::MAX_PAGE_SIZE);

        device.init().map_err(|_| KvatError::StorageFault)?;

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        crate::device::debug_assert_aligned(0, header_buf.len());
        device.read(0, &mut header_buf);
        let mut header = Header::from_bytes(&header_buf);

        if header.format_id != FORMAT_ID {
            header = Header {
                format_id: FORMAT_ID,
                page_size,
                page_count,
                page_begin_address: natural_page0_addr(page_count),
            };
            format(&mut device, &header)?;
        }

        let bitmap = build_from_entries(
            &device,
            &header,
            (1..header.page_count).map(|i| {
                let e = read_entry(&device, i);
                (i, e.flags, e.key_start, e.value_start)
            }),
        )
        .map_err(|_| KvatError::RecordFault)?;

        kvat_debug!(
            "kvat opened: page_size={} page_count={}",
            header.page_size,
            header.page_count
        );

        Ok(Engine {
            device,
            header,
            bitmap,
            initialized: true,
        })
    }

    fn require_initialized(&self) -> Result<(), KvatError> {
        if self.initialized {
            Ok(())
        } else {
            Err(KvatError::InvalidAccess)
        }
    }

    /// Clear the initialized flag after a fatal, unrecoverable fault.
    /// Subsequent calls fail fast with `InvalidAccess`.
    fn deinit(&mut self) {
        kvat_error!("kvat deinitializing after a fatal fault");
        self.initialized = false;
    }

    /// Save `value` under `key`, overwriting any existing entry with the
    /// same key.
    pub fn save(&mut self, key: &str, value: &[u8]) -> Result<(), KvatError> {
        self.require_initialized()?;
        let key_bytes = str_with_nul(key)?;

        let existing = find_exact(&self.device, &self.header, 1, &key_bytes)?;
        let (slot, overwrite) = match existing {
            Some(slot) => (slot, true),
            None => {
                let slot = find_free(&self.device, &self.header, 1)
                    .ok_or(KvatError::InsufficientSpace)?;
                (slot, false)
            }
        };

        let prior = read_entry(&self.device, slot);

        // Commit "an edit is in progress" before touching any chains.
        let opening = Entry {
            flags: (if overwrite { prior.flags } else { EntryFlags::empty() }) | EntryFlags::OPEN,
            key_start: prior.key_start,
            value_start: prior.value_start,
            remains: prior.remains,
        };
        write_entry(&mut self.device, slot, opening).map_err(|_| KvatError::TableError)?;

        let (key_start, key_multi) = if overwrite {
            (prior.key_start, prior.flags.contains(EntryFlags::KEY_MULTIPAGE))
        } else {
            let out = write_chain(&mut self.device, &self.header, &mut self.bitmap, &key_bytes, None)?;
            (out.start_page, out.is_multi)
        };

        let value_reuse = if overwrite {
            Some((prior.value_start, prior.flags.contains(EntryFlags::VALUE_MULTIPAGE)))
        } else {
            None
        };
        let value_out = write_chain(
            &mut self.device,
            &self.header,
            &mut self.bitmap,
            value,
            value_reuse,
        )
        .map_err(|_| KvatError::InsufficientSpace)?;

        let mut flags = EntryFlags::ACTIVE;
        if key_multi {
            flags |= EntryFlags::KEY_MULTIPAGE;
        }
        if value_out.is_multi {
            flags |= EntryFlags::VALUE_MULTIPAGE;
        }
        let final_entry = Entry {
            flags,
            key_start,
            value_start: value_out.start_page,
            remains: value_out.remains,
        };

        if write_entry(&mut self.device, slot, final_entry).is_err() {
            self.deinit();
            return Err(KvatError::TableError);
        }

        kvat_trace!("saved key at slot {}", slot);
        Ok(())
    }

    /// Convenience for string values: stores `value` with its trailing
    /// NUL included, matching how keys are stored (I6).
    pub fn save_str(&mut self, key: &str, value: &str) -> Result<(), KvatError> {
        let value_bytes = str_with_nul(value)?;
        self.save(key, &value_bytes)
    }

    /// Fill `dest` with the value stored under `key`, truncating if
    /// `dest` is too small. Reports the value's true length either way.
    pub fn retrieve(&self, key: &str, dest: &mut [u8]) -> Result<Retrieved, KvatError> {
        self.require_initialized()?;
        let key_bytes = str_with_nul(key)?;
        let slot = find_exact(&self.device, &self.header, 1, &key_bytes)?
            .ok_or(KvatError::NotFound)?;
        let entry = read_entry(&self.device, slot);
        let is_multi = entry.flags.contains(EntryFlags::VALUE_MULTIPAGE);
        let fetched = read_chain_into(
            &self.device,
            &self.header,
            entry.value_start,
            is_multi,
            entry.remains,
            dest,
        )
        .map_err(|_| KvatError::FetchFault)?;
        Ok(Retrieved {
            len: fetched.len,
            truncated: fetched.truncated,
        })
    }

    /// Retrieve the value stored under `key` into a freshly allocated
    /// buffer.
    pub fn retrieve_alloc(&self, key: &str) -> Result<Vec<u8>, KvatError> {
        self.require_initialized()?;
        let key_bytes = str_with_nul(key)?;
        let slot = find_exact(&self.device, &self.header, 1, &key_bytes)?
            .ok_or(KvatError::NotFound)?;
        let entry = read_entry(&self.device, slot);
        let is_multi = entry.flags.contains(EntryFlags::VALUE_MULTIPAGE);
        read_chain_alloc(&self.device, &self.header, entry.value_start, is_multi, entry.remains)
            .map_err(|_| KvatError::FetchFault)
    }

    /// Retrieve the value stored under `key` as an owned `String`, with
    /// the trailing NUL that `save_str` wrote stripped off. Invalid
    /// UTF-8 is replaced per `String::from_utf8_lossy` — the error
    /// taxonomy has no UTF-8-specific variant.
    pub fn retrieve_string_alloc(&self, key: &str) -> Result<String, KvatError> {
        let mut bytes = self.retrieve_alloc(key)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Rename an entry's key in place, reusing its existing key chain's
    /// pages.
    ///
    /// On an allocation failure partway through the new key's chain, an
    /// attempt is made to restore `old_key` into the same chain pages
    /// (`InsufficientSpace` is returned on success of the restore). If
    /// even the restore fails, the entry's binding is lost: its metadata
    /// is cleared and the engine is deinitialized (`Unknown`).
    pub fn rename(&mut self, old_key: &str, new_key: &str) -> Result<(), KvatError> {
        self.require_initialized()?;
        let old_bytes = str_with_nul(old_key)?;
        let new_bytes = str_with_nul(new_key)?;

        let slot =
            find_exact(&self.device, &self.header, 1, &old_bytes)?.ok_or(KvatError::NotFound)?;

        match find_exact(&self.device, &self.header, 1, &new_bytes)? {
            Some(other) if other != slot => return Err(KvatError::KeyDuplicate),
            _ => {}
        }

        let entry = read_entry(&self.device, slot);
        let old_multi = entry.flags.contains(EntryFlags::KEY_MULTIPAGE);

        match write_chain(
            &mut self.device,
            &self.header,
            &mut self.bitmap,
            &new_bytes,
            Some((entry.key_start, old_multi)),
        ) {
            Ok(out) => {
                let mut flags = entry.flags & !(EntryFlags::KEY_MULTIPAGE);
                if out.is_multi {
                    flags |= EntryFlags::KEY_MULTIPAGE;
                }
                let updated = Entry {
                    flags,
                    key_start: out.start_page,
                    value_start: entry.value_start,
                    remains: entry.remains,
                };
                write_entry(&mut self.device, slot, updated).map_err(|_| KvatError::TableError)
            }
            Err(_) => {
                match write_chain(
                    &mut self.device,
                    &self.header,
                    &mut self.bitmap,
                    &old_bytes,
                    Some((entry.key_start, old_multi)),
                ) {
                    Ok(restored) => {
                        let updated = Entry {
                            key_start: restored.start_page,
                            ..entry
                        };
                        let _ = write_entry(&mut self.device, slot, updated);
                        Err(KvatError::InsufficientSpace)
                    }
                    Err(_) => {
                        let cleared = Entry::default();
                        let _ = write_entry(&mut self.device, slot, cleared);
                        self.deinit();
                        Err(KvatError::Unknown)
                    }
                }
            }
        }
    }

    /// Remove the entry matching `key`, freeing its key and value
    /// chains.
    pub fn delete(&mut self, key: &str) -> Result<(), KvatError> {
        self.require_initialized()?;
        let key_bytes = str_with_nul(key)?;
        let slot =
            find_exact(&self.device, &self.header, 1, &key_bytes)?.ok_or(KvatError::NotFound)?;
        let entry = read_entry(&self.device, slot);

        self.bitmap.mark_chain(
            &self.device,
            &self.header,
            entry.key_start,
            false,
            entry.flags.contains(EntryFlags::KEY_MULTIPAGE),
        );
        self.bitmap.mark_chain(
            &self.device,
            &self.header,
            entry.value_start,
            false,
            entry.flags.contains(EntryFlags::VALUE_MULTIPAGE),
        );

        write_entry(&mut self.device, slot, Entry::default()).map_err(|_| KvatError::TableError)
    }

    /// Resume a prefix search from `state` (use [`SEARCH_INITIAL`] for
    /// the first call), writing the matching key into `dest`. Returns
    /// the next `state` to pass on the following call.
    pub fn search(
        &self,
        prefix: &str,
        state: u8,
        dest: &mut [u8],
    ) -> Result<(u8, Retrieved), KvatError> {
        self.require_initialized()?;
        let hit = find_prefix_from(&self.device, &self.header, state, prefix.as_bytes())?
            .ok_or(KvatError::NotFound)?;
        let entry = read_entry(&self.device, hit);
        let is_multi = entry.flags.contains(EntryFlags::KEY_MULTIPAGE);
        let fetched = read_chain_into(
            &self.device,
            &self.header,
            entry.key_start,
            is_multi,
            entry.remains,
            dest,
        )
        .map_err(|_| KvatError::FetchFault)?;
        Ok((
            hit.wrapping_add(1),
            Retrieved {
                len: fetched.len,
                truncated: fetched.truncated,
            },
        ))
    }

    /// Resume a prefix search from `state`, returning the matching key
    /// as an owned `String` (supplemental convenience mirroring
    /// `retrieve_alloc`).
    pub fn search_alloc(&self, prefix: &str, state: u8) -> Result<(u8, String), KvatError> {
        self.require_initialized()?;
        let hit = find_prefix_from(&self.device, &self.header, state, prefix.as_bytes())?
            .ok_or(KvatError::NotFound)?;
        let entry = read_entry(&self.device, hit);
        let is_multi = entry.flags.contains(EntryFlags::KEY_MULTIPAGE);
        let mut bytes =
            read_chain_alloc(&self.device, &self.header, entry.key_start, is_multi, entry.remains)
                .map_err(|_| KvatError::FetchFault)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        Ok((hit.wrapping_add(1), String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Write a blank header and an all-zero entry table (including slot 0).
fn format<D: BlockDevice>(device: &mut D, header: &Header) -> Result<(), KvatError> {
    let header_bytes = header.to_bytes();
    crate::device::debug_assert_aligned(0, header_bytes.len());
    device
        .program(0, &header_bytes)
        .map_err(|_| KvatError::TableError)?;
    for index in 0..header.page_count {
        write_entry(device, index, Entry::default()).map_err(|_| KvatError::TableError)?;
    }
    Ok(())
}
