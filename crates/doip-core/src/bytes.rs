//! Byte buffer and endian helpers.
//!
//! DoIP is entirely big-endian on the wire. These helpers append/read
//! `u16`/`u32` values and provide borrowed slice views without copying.

use alloc::vec::Vec;

/// Appends a big-endian `u16` to `buf`.
pub fn push_u16_be(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Appends a big-endian `u32` to `buf`.
pub fn push_u32_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Reads a big-endian `u16` at `offset`. Panics-free: returns `None` if the
/// slice is too short.
pub fn read_u16_be(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Reads a big-endian `u32` at `offset`. Returns `None` if the slice is too short.
pub fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16() {
        let mut buf = Vec::new();
        push_u16_be(&mut buf, 0xE080);
        assert_eq!(read_u16_be(&buf, 0), Some(0xE080));
    }

    #[test]
    fn round_trips_u32() {
        let mut buf = Vec::new();
        push_u32_be(&mut buf, 0x0001_2345);
        assert_eq!(read_u32_be(&buf, 0), Some(0x0001_2345));
    }

    #[test]
    fn read_out_of_bounds_is_none() {
        let buf = [0u8; 1];
        assert_eq!(read_u16_be(&buf, 0), None);
        assert_eq!(read_u32_be(&buf, 0), None);
    }
}
