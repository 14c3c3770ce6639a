//! Chain I/O: reading an entire chain into a buffer, and writing a buffer
//! as a chain (optionally reusing an existing chain's pages).

use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::device::{debug_assert_aligned, BlockDevice};
use crate::error::KvatError;
use crate::layout::{page_addr, Header, MAX_PAGE_SIZE};

fn read_next_pointer<D: BlockDevice>(device: &D, header: &Header, page: u8) -> u8 {
    let mut buf = [0u8; 4];
    let addr = page_addr(header, page);
    debug_assert_aligned(addr, buf.len());
    device.read(addr, &mut buf);
    buf[0]
}

fn write_next_pointer<D: BlockDevice>(
    device: &mut D,
    header: &Header,
    page: u8,
    next: u8,
) -> Result<(), D::Error> {
    let mut buf = [0u8; 4];
    let addr = page_addr(header, page);
    debug_assert_aligned(addr, buf.len());
    device.read(addr, &mut buf);
    buf[0] = next;
    device.program(addr, &buf)
}

fn try_reserve(buf: &mut Vec<u8>, additional: usize) -> Result<(), KvatError> {
    buf.try_reserve(additional).map_err(|_| KvatError::HeapError)
}

/// The outcome of reading a chain into a caller-supplied buffer.
pub(crate) struct FetchInto {
    /// The chain's full logical length (`max_size - remains`), regardless
    /// of whether `dest` was large enough to hold it.
    pub len: usize,
    /// Whether `dest` was too small, so only the first `dest.len()` bytes
    /// were actually written.
    pub truncated: bool,
}

/// Read a chain, writing at most `dest.len()` payload bytes into `dest`
/// and reporting the chain's true logical length regardless of
/// truncation (Open Question 4 resolved towards visibility).
pub(crate) fn read_chain_into<D: BlockDevice>(
    device: &D,
    header: &Header,
    start_page: u8,
    is_multi: bool,
    remains: u8,
    dest: &mut [u8],
) -> Result<FetchInto, KvatError> {
    let mut page_scratch = [0u8; MAX_PAGE_SIZE];
    let page_size = header.page_size as usize;

    let mut page = start_page;
    let mut written = 0usize;
    let mut pages_seen = 0u32;
    loop {
        if pages_seen >= header.page_count as u32 {
            break;
        }
        pages_seen += 1;
        let addr = page_addr(header, page);
        debug_assert_aligned(addr, page_size);
        device.read(addr, &mut page_scratch[..page_size]);
        let (payload_start, next) = if is_multi {
            (1usize, page_scratch[0])
        } else {
            (0usize, 0u8)
        };
        let payload = &page_scratch[payload_start..page_size];
        let copy_len = payload.len().min(dest.len().saturating_sub(written));
        if copy_len > 0 {
            dest[written..written + copy_len].copy_from_slice(&payload[..copy_len]);
        }
        written += payload.len();
        if !is_multi || next == 0 {
            break;
        }
        page = next;
    }

    let max_size = written as u32;
    let len = (max_size - remains as u32) as usize;
    let truncated = len > dest.len();
    Ok(FetchInto { len, truncated })
}

/// Read a chain into a freshly allocated, exactly-sized `Vec<u8>`
/// (effective length only — padding bytes are trimmed off).
pub(crate) fn read_chain_alloc<D: BlockDevice>(
    device: &D,
    header: &Header,
    start_page: u8,
    is_multi: bool,
    remains: u8,
) -> Result<Vec<u8>, KvatError> {
    let mut page_scratch = [0u8; MAX_PAGE_SIZE];
    let page_size = header.page_size as usize;
    let page_data_size = header.page_data_size(is_multi) as usize;

    let mut out = Vec::new();
    let mut page = start_page;
    let mut pages_seen = 0u32;
    loop {
        if pages_seen >= header.page_count as u32 {
            break;
        }
        pages_seen += 1;
        let addr = page_addr(header, page);
        debug_assert_aligned(addr, page_size);
        device.read(addr, &mut page_scratch[..page_size]);
        let (payload_start, next) = if is_multi {
            (1usize, page_scratch[0])
        } else {
            (0usize, 0u8)
        };
        let payload = &page_scratch[payload_start..page_size];
        try_reserve(&mut out, payload.len())?;
        out.extend_from_slice(payload);
        if !is_multi || next == 0 {
            break;
        }
        page = next;
    }

    let effective_len = out.len().saturating_sub(remains as usize);
    out.truncate(effective_len);
    debug_assert!(page_data_size > 0 || out.is_empty());
    Ok(out)
}

/// The outcome of a successful chain write.
pub(crate) struct WriteOutcome {
    pub start_page: u8,
    pub is_multi: bool,
    pub remains: u8,
}

/// Free every freshly-allocated page from a failed write, and if the
/// reused chain was multi-page, patch the last-reused page's
/// next-pointer back to 0 so the (now-truncated) old chain stays
/// well-formed.
fn rollback<D: BlockDevice>(
    device: &mut D,
    header: &Header,
    bitmap: &mut Bitmap,
    fresh: &[u8],
    reuse_is_multi: bool,
    last_reused_page: Option<u8>,
) {
    for &p in fresh {
        bitmap.mark(p, false);
    }
    if reuse_is_multi {
        if let Some(last) = last_reused_page {
            let _ = write_next_pointer(device, header, last, 0);
        }
    }
}

/// Write `data` as a chain, optionally reusing the pages of an existing
/// chain (`reuse = Some((start_page, is_multi))`) to minimize churn.
///
/// On any failure — allocator exhaustion or a device program fault — the
/// bitmap is restored (every page freshly allocated during this call is
/// freed) and, if applicable, the old reused chain is left as a
/// well-formed, merely-truncated chain. The caller's entry metadata is
/// never touched here; callers write it only after success.
pub(crate) fn write_chain<D: BlockDevice>(
    device: &mut D,
    header: &Header,
    bitmap: &mut Bitmap,
    data: &[u8],
    reuse: Option<(u8, bool)>,
) -> Result<WriteOutcome, KvatError> {
    let is_multi = data.len() > header.page_size as usize;
    let page_data_size = header.page_data_size(is_multi) as usize;
    let pages_needed = if is_multi {
        (data.len() + page_data_size - 1) / page_data_size
    } else {
        1
    };
    if pages_needed > header.page_count as usize {
        return Err(KvatError::InsufficientSpace);
    }

    let reuse_is_multi = reuse.map(|(_, m)| m).unwrap_or(false);
    let mut reuse_cursor = reuse.map(|(p, _)| p);
    let mut last_reused_page: Option<u8> = None;
    let mut pages: Vec<u8> = Vec::new();
    try_reserve(&mut pages, pages_needed)?;
    let mut fresh: Vec<u8> = Vec::new();

    for _ in 0..pages_needed {
        if let Some(p) = reuse_cursor {
            pages.push(p);
            last_reused_page = Some(p);
            reuse_cursor = if reuse_is_multi {
                let next = read_next_pointer(device, header, p);
                if next == 0 {
                    None
                } else {
                    Some(next)
                }
            } else {
                None
            };
        } else {
            match bitmap.alloc_lowest() {
                Some(p) => {
                    pages.push(p);
                    if let Err(e) = try_reserve(&mut fresh, 1) {
                        bitmap.mark(p, false);
                        rollback(device, header, bitmap, &fresh, reuse_is_multi, last_reused_page);
                        return Err(e);
                    }
                    fresh.push(p);
                }
                None => {
                    rollback(device, header, bitmap, &fresh, reuse_is_multi, last_reused_page);
                    return Err(KvatError::InsufficientSpace);
                }
            }
        }
    }

    // Second pass: now that every page number is decided, write contents.
    let page_size = header.page_size as usize;
    for (i, &page) in pages.iter().enumerate() {
        let next = pages.get(i + 1).copied().unwrap_or(0);
        let mut scratch = [0u8; MAX_PAGE_SIZE];
        let header_bytes = if is_multi { 1 } else { 0 };
        if is_multi {
            scratch[0] = next;
        }
        let start_off = i * page_data_size;
        let end_off = (start_off + page_data_size).min(data.len());
        if start_off < data.len() {
            let chunk = &data[start_off..end_off];
            scratch[header_bytes..header_bytes + chunk.len()].copy_from_slice(chunk);
        }
        let addr = page_addr(header, page);
        debug_assert_aligned(addr, page_size);
        if device.program(addr, &scratch[..page_size]).is_err() {
            rollback(device, header, bitmap, &fresh, reuse_is_multi, last_reused_page);
            return Err(KvatError::StorageFault);
        }
    }

    // Success: free any surplus tail of a longer old reuse chain.
    if let Some(leftover_start) = reuse_cursor {
        bitmap.mark_chain(device, header, leftover_start, false, reuse_is_multi);
    }

    let overflow = data.len() % page_data_size.max(1);
    let remains = if overflow == 0 {
        0
    } else {
        (page_data_size - overflow) as u8
    };

    Ok(WriteOutcome {
        start_page: pages[0],
        is_multi,
        remains,
    })
}
