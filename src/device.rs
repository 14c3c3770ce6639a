//! The block device contract KVAT is built on.
//!
//! Everything above this trait treats storage as a flat byte array, word
//! aligned: every `addr` and `len` passed to [`BlockDevice::read`] or
//! [`BlockDevice::program`] is a multiple of 4.

/// A word-aligned block device.
///
/// `read` is assumed infallible for a formatted device (mirroring the
/// original hardware, where reads from on-chip EEPROM cannot themselves
/// fault). `program` may fault — device busy, write-protected, or a
/// verify mismatch — and is never retried by the engine.
pub trait BlockDevice {
    /// The device's own error type, surfaced through [`crate::KvatError`].
    type Error: core::fmt::Debug;

    /// Bring the device up. May fail with a device-specific error; the
    /// engine maps any failure here to [`crate::KvatError::StorageFault`].
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Read `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// `addr` and `buf.len()` are always multiples of 4.
    fn read(&self, addr: u32, buf: &mut [u8]);

    /// Program `data` at `addr`.
    ///
    /// `addr` and `data.len()` are always multiples of 4.
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;
}

/// Assert the word-alignment contract every `read`/`program` call must
/// uphold. Called from inside the engine at each call site, never from a
/// `BlockDevice` implementation itself, so the contract is enforced
/// uniformly regardless of the concrete device.
#[inline]
pub(crate) fn debug_assert_aligned(addr: u32, len: usize) {
    debug_assert_eq!(addr % 4, 0, "device address must be 4-byte aligned");
    debug_assert_eq!(len % 4, 0, "device access length must be 4-byte aligned");
}

#[cfg(test)]
pub(crate) mod mock {
    //! A RAM-backed [`BlockDevice`] double used by unit tests throughout
    //! the crate.

    use super::BlockDevice;
    use alloc::vec;
    use alloc::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Fault;

    /// A fully in-memory device. Optionally refuses to `program` past a
    /// configured byte budget, for exercising allocation/program-fault
    /// rollback paths.
    pub(crate) struct RamDevice {
        bytes: Vec<u8>,
        programs_remaining: Option<usize>,
    }

    impl RamDevice {
        pub(crate) fn new(size: usize) -> Self {
            RamDevice {
                bytes: vec![0u8; size],
                programs_remaining: None,
            }
        }

        /// Make the next `n` `program` calls succeed, then fault forever
        /// after.
        pub(crate) fn fail_after(&mut self, n: usize) {
            self.programs_remaining = Some(n);
        }
    }

    impl BlockDevice for RamDevice {
        type Error = Fault;

        fn init(&mut self) -> Result<(), Fault> {
            Ok(())
        }

        fn read(&self, addr: u32, buf: &mut [u8]) {
            let start = addr as usize;
            buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        }

        fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), Fault> {
            if let Some(remaining) = self.programs_remaining {
                if remaining == 0 {
                    return Err(Fault);
                }
                self.programs_remaining = Some(remaining - 1);
            }
            let start = addr as usize;
            self.bytes[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }
    }
}
