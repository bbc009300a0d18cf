use std::collections::{HashMap, HashSet};

use super::TargetMemory;
use crate::error::TransportError;

/// Sparse in-process copy of target memory.
///
/// Unwritten bytes read back as zero. Addresses marked with
/// [`fault_at`](Self::fault_at) make any read that touches them fail, the
/// way a bus fault on a real probe would.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    bytes: HashMap<u32, u8>,
    faults: HashSet<u32>,
}

impl MemoryImage {
    /// Create an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes at `address`. Bytes past the end of the 32-bit
    /// address space are dropped.
    pub fn write_bytes(&mut self, address: u32, data: &[u8]) {
        let mut addr = Some(address);
        for &byte in data {
            let Some(at) = addr else { break };
            self.bytes.insert(at, byte);
            addr = at.checked_add(1);
        }
    }

    /// Store a byte.
    pub fn write_u8(&mut self, address: u32, value: u8) {
        self.write_bytes(address, &[value]);
    }

    /// Store a little-endian 16-bit word.
    pub fn write_u16(&mut self, address: u32, value: u16) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Store a little-endian 32-bit word.
    pub fn write_u32(&mut self, address: u32, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Make reads covering `address` fail.
    pub fn fault_at(&mut self, address: u32) {
        self.faults.insert(address);
    }
}

impl TargetMemory for MemoryImage {
    fn read_bytes(&mut self, address: u32, data: &mut [u8]) -> Result<(), TransportError> {
        for (offset, byte) in data.iter_mut().enumerate() {
            let addr = u32::try_from(offset)
                .ok()
                .and_then(|o| address.checked_add(o))
                .ok_or("read wraps past the end of the address space")?;
            if self.faults.contains(&addr) {
                return Err(format!("bus fault at 0x{addr:08X}").into());
            }
            *byte = self.bytes.get(&addr).copied().unwrap_or(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_at_top_of_address_space() {
        let mut mem = MemoryImage::new();
        mem.write_u32(0xFFFF_FFFE, 0xAABB_CCDD);
        assert_eq!(mem.read_u16(0xFFFF_FFFE).unwrap(), 0xCCDD);
        assert!(mem.read_u32(0xFFFF_FFFE).is_err());

        mem.write_u8(0xFFFF_FFFF, 0x7F);
        assert_eq!(mem.read_u8(0xFFFF_FFFF).unwrap(), 0x7F);
    }

    #[test]
    fn test_fault_covers_any_overlapping_read() {
        let mut mem = MemoryImage::new();
        mem.write_u32(0x100, 1);
        mem.fault_at(0x102);
        assert!(mem.read_u8(0x100).is_ok());
        assert!(mem.read_u32(0x100).is_err());
    }
}
