//! Target memory access.
//!
//! The engine never talks to a probe directly. Everything goes through
//! [`TargetMemory`], which is implemented for a probe-rs [`Core`] (with the
//! `hardware` feature) and for the in-process [`MemoryImage`].
//!
//! [`Core`]: probe_rs::Core

mod image;

pub use image::MemoryImage;

use crate::error::{Result, RtosError, TransportError};

/// Raw byte access to a halted target. All scalars are little-endian.
pub trait TargetMemory {
    /// Fill `data` with the bytes starting at `address`.
    fn read_bytes(
        &mut self,
        address: u32,
        data: &mut [u8],
    ) -> std::result::Result<(), TransportError>;

    /// Read a block of memory.
    fn read_block(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; length];
        self.read_bytes(address, &mut data)
            .map_err(|source| RtosError::MemoryReadFailed { address, length, source })?;
        Ok(data)
    }

    /// Read a single byte.
    fn read_u8(&mut self, address: u32) -> Result<u8> {
        let mut b = [0u8; 1];
        read_exact(self, address, &mut b)?;
        Ok(b[0])
    }

    /// Read a 16-bit word.
    fn read_u16(&mut self, address: u32) -> Result<u16> {
        let mut b = [0u8; 2];
        read_exact(self, address, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Read a 32-bit word.
    fn read_u32(&mut self, address: u32) -> Result<u32> {
        let mut b = [0u8; 4];
        read_exact(self, address, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    /// Read a NUL-terminated string from a buffer of `capacity` bytes.
    ///
    /// Exactly `capacity` bytes are read. The last byte is always treated as
    /// the terminator, so the result holds at most `capacity - 1` bytes no
    /// matter what the target stored there.
    fn read_c_string(&mut self, address: u32, capacity: usize) -> Result<String> {
        if capacity == 0 {
            return Ok(String::new());
        }
        let mut buf = self.read_block(address, capacity)?;
        buf[capacity - 1] = 0;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(capacity - 1);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

fn read_exact<M: TargetMemory + ?Sized>(mem: &mut M, address: u32, data: &mut [u8]) -> Result<()> {
    mem.read_bytes(address, data).map_err(|source| RtosError::MemoryReadFailed {
        address,
        length: data.len(),
        source,
    })
}

#[cfg(feature = "hardware")]
impl TargetMemory for probe_rs::Core<'_> {
    fn read_bytes(
        &mut self,
        address: u32,
        data: &mut [u8],
    ) -> std::result::Result<(), TransportError> {
        use probe_rs::MemoryInterface;
        self.read_8(u64::from(address), data).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_reads_are_little_endian() {
        let mut mem = MemoryImage::new();
        mem.write_bytes(0x100, &[0x78, 0x56, 0x34, 0x12]);

        assert_eq!(mem.read_u8(0x100).unwrap(), 0x78);
        assert_eq!(mem.read_u16(0x100).unwrap(), 0x5678);
        assert_eq!(mem.read_u32(0x100).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_failed_read_reports_address_and_length() {
        let mut mem = MemoryImage::new();
        mem.fault_at(0x2002);

        let err = mem.read_u32(0x2000).unwrap_err();
        match err {
            RtosError::MemoryReadFailed { address, length, .. } => {
                assert_eq!(address, 0x2000);
                assert_eq!(length, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_c_string_stops_at_terminator() {
        let mut mem = MemoryImage::new();
        mem.write_bytes(0x400, b"idle\0garbage");

        assert_eq!(mem.read_c_string(0x400, 32).unwrap(), "idle");
    }

    #[test]
    fn test_c_string_unterminated_is_truncated() {
        let mut mem = MemoryImage::new();
        mem.write_bytes(0x400, &[b'A'; 64]);

        let name = mem.read_c_string(0x400, 32).unwrap();
        assert_eq!(name.len(), 31);
        assert!(name.bytes().all(|b| b == b'A'));
    }

    #[test]
    fn test_c_string_zero_capacity() {
        let mut mem = MemoryImage::new();
        assert_eq!(mem.read_c_string(0x400, 0).unwrap(), "");
    }
}
