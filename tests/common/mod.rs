//! Shared RAM-backed `BlockDevice` used by the integration tests.

use kvat::BlockDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

pub struct RamDevice {
    bytes: Vec<u8>,
}

impl RamDevice {
    pub fn new(size: usize) -> Self {
        RamDevice { bytes: vec![0u8; size] }
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
        let start = addr as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

pub fn device_for(page_size: u32, page_count: u8) -> RamDevice {
    let size = 16 + 4 * page_count as usize + page_size as usize * page_count as usize;
    RamDevice::new(size + 64)
}
