//! Little-endian integer and double encoding.
//!
//! All xBase formats store binary integers and doubles little-endian
//! regardless of host byte order. Offsets are in bytes from the start of
//! `buf`; callers guarantee the slice is long enough.

/// Reads a `u16` at `at`.
#[must_use]
pub fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

/// Reads an `i16` at `at`.
#[must_use]
pub fn get_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([buf[at], buf[at + 1]])
}

/// Reads a `u32` at `at`.
#[must_use]
pub fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Reads an `f64` at `at`.
#[must_use]
pub fn get_f64(buf: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(raw)
}

/// Writes a `u16` at `at`.
pub fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

/// Writes an `i16` at `at`.
pub fn put_i16(buf: &mut [u8], at: usize, value: i16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

/// Writes a `u32` at `at`.
pub fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Writes an `f64` at `at`.
pub fn put_f64(buf: &mut [u8], at: usize, value: f64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
