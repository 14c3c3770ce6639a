//! Error taxonomy for the KVAT storage engine.

use core::fmt;

/// Every way a KVAT operation can fail.
///
/// Successful operations return `Ok`, so there is no `None`/success
/// variant here (unlike the taxonomy this is derived from, which needed
/// one because it returned error codes rather than a sum type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KvatError {
    /// Preconditions violated: engine not initialized, or `format` called
    /// on an already-initialized engine.
    InvalidAccess,
    /// No entry matches the requested key.
    NotFound,
    /// The entry table or page allocator is exhausted, or a value would
    /// need more pages than exist on the device.
    InsufficientSpace,
    /// The underlying device failed to initialize or a program call
    /// faulted where no other, more specific error applies.
    StorageFault,
    /// A fallible heap allocation failed.
    HeapError,
    /// An entry table read or write faulted.
    TableError,
    /// A chain read could not be satisfied.
    FetchFault,
    /// The occupancy bitmap could not be built from media.
    RecordFault,
    /// A fatal mid-operation failure left an entry in a degraded state;
    /// the engine has deinitialized itself.
    Unknown,
    /// `rename`'s target key already names a different active entry.
    KeyDuplicate,
}

impl fmt::Display for KvatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KvatError::InvalidAccess => "invalid access",
            KvatError::NotFound => "key not found",
            KvatError::InsufficientSpace => "insufficient space",
            KvatError::StorageFault => "storage fault",
            KvatError::HeapError => "heap allocation failed",
            KvatError::TableError => "entry table fault",
            KvatError::FetchFault => "chain fetch fault",
            KvatError::RecordFault => "occupancy bitmap build fault",
            KvatError::Unknown => "unknown fatal error, engine deinitialized",
            KvatError::KeyDuplicate => "key already exists",
        };
        f.write_str(msg)
    }
}
