//! Fixed-width big-endian `u64` codec.
//!
//! Big-endian byte order is what makes lexicographic byte comparison of
//! encoded keys match numeric comparison of the underlying integers, which
//! the `healpixels` and `timestamps` tables rely on for range scans.

use crate::error::{AlertbaseError, Result};

pub const ENCODED_LEN: usize = 8;

pub fn pack(value: u64) -> [u8; ENCODED_LEN] {
    value.to_be_bytes()
}

pub fn unpack(buf: &[u8]) -> Result<u64> {
    let arr: [u8; ENCODED_LEN] = buf
        .get(0..ENCODED_LEN)
        .ok_or(AlertbaseError::DecodeTruncated { offset: 0 })?
        .try_into()
        .map_err(|_| AlertbaseError::DecodeTruncated { offset: 0 })?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_zero_and_max() {
        for n in [0u64, 1, 255, 256, u64::MAX / 2, u64::MAX] {
            let packed = pack(n);
            assert_eq!(unpack(&packed).unwrap(), n);
        }
    }

    #[test]
    fn orders_bytes_the_same_as_integers() {
        let a = pack(10);
        let b = pack(300);
        assert!(a < b);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        assert!(unpack(&[1, 2, 3]).is_err());
    }
}
