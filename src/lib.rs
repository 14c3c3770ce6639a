//! KVAT: a tiny key-value store for block-addressable, word-aligned
//! non-volatile memory.
//!
//! KVAT persists variable-length string-keyed byte values onto a flat,
//! word-aligned storage device (originally an on-chip EEPROM of a few
//! tens of KiB) that exposes only `read`/`program` at 4-byte-aligned
//! addresses. It layers dictionary semantics — save, retrieve, rename,
//! delete, prefix search — on top of a paged, chained on-media
//! representation: a fixed header, a fixed-size entry table, and a data
//! region of fixed-size pages linked by a one-byte next-pointer.
//!
//! This crate implements the storage engine only. The device driver
//! itself, and any transport of keys/values into or out of application
//! code, are left to the caller: implement [`BlockDevice`] for your
//! hardware and hand it to [`Engine::open`].
//!
//! ## Example
//!
//! ```ignore
//! let mut engine = kvat::Engine::open(my_device, 32, 64)?;
//! engine.save_str("greeting", "hello")?;
//! assert_eq!(engine.retrieve_string_alloc("greeting")?, "hello");
//! ```
//!
//! ## On-media layout
//!
//! | offset | field | bytes |
//! |--------|-------|-------|
//! | 0 | `format_id` | 2 |
//! | 4 | `page_size` | 4 |
//! | 8 | `page_count` | 1 |
//! | 12 | `page_begin_address` | 4 |
//! | 16.. | entry table, 4 bytes per slot, slot 0 unused | |
//! | `page_begin_address`.. | data pages | |
//!
//! Within a multi-page chain, byte 0 of each page is the next page
//! number (0 terminates); the remainder is payload. A single-page chain
//! has no next-pointer byte — the full page is payload.
//!
//! ## Non-goals
//!
//! Transactional multi-entry atomicity, crash-consistent journaling,
//! wear leveling, concurrent access from multiple contexts, and ordered
//! iteration/range scans are all out of scope, as is anything this
//! crate cannot see from the flat [`BlockDevice`] contract: board
//! bring-up, interrupt wiring, and transport of keys/values from
//! application code are the caller's responsibility.
#![no_std]
#![warn(
    bare_trait_objects,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications
)]

extern crate alloc;

#[macro_use]
mod macros;

mod bitmap;
mod chain;
mod device;
mod engine;
mod entry;
mod error;
mod layout;
mod lookup;

pub use device::BlockDevice;
pub use engine::{Engine, Retrieved, SEARCH_INITIAL};
pub use error::KvatError;
pub use layout::MAX_PAGE_SIZE;
