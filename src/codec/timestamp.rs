//! Canonical mapping between a unix-seconds timestamp and the fixed
//! big-endian `u64` of nanoseconds used as the key in the `timestamps`
//! table. `pack` rounds to the nearest nanosecond; `unpack` truncates back
//! down, which is exact for any timestamp this system will see (alert
//! exposure times, not sub-nanosecond physics).

use super::fixed;
use crate::error::Result;

pub fn pack(unix_seconds: f64) -> [u8; fixed::ENCODED_LEN] {
    let nanos = (unix_seconds * 1e9).round() as u64;
    fixed::pack(nanos)
}

pub fn unpack(buf: &[u8]) -> Result<f64> {
    let nanos = fixed::unpack(buf)?;
    Ok(nanos as f64 / 1e9)
}

pub fn nanos_from_unix_seconds(unix_seconds: f64) -> u64 {
    (unix_seconds * 1e9).round() as u64
}
