//! Typed key wrappers, one per index table, binding the right codec
//! (varint for `candidates`, UTF-8 text for `objects`, big-endian fixed
//! `u64` for `healpixels` and `timestamps`) to the `Codec` trait the
//! generic `Table` works against.

use crate::codec::{fixed, text, varint};
use crate::error::{AlertbaseError, Result};
use crate::kvtable::Codec;

/// `candidates` table key: zig-zag varint of the candidate id. Never
/// range-scanned, only point-looked-up, so byte order need not match
/// numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CandidateIdKey(pub u64);

impl Codec for CandidateIdKey {
    fn encode(&self) -> Vec<u8> {
        varint::pack(self.0 as i64)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let n = varint::unpack(bytes)?;
        if n < 0 {
            return Err(AlertbaseError::DecodeSchemaMismatch {
                offset: 0,
                detail: "candidate id must be non-negative".to_string(),
            });
        }
        Ok(Self(n as u64))
    }
}

/// `objects` table key: the raw UTF-8 object id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectIdKey(pub String);

impl Codec for ObjectIdKey {
    fn encode(&self) -> Vec<u8> {
        text::pack(&self.0)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self(text::unpack(bytes)?))
    }
}

/// `healpixels` table key: big-endian fixed `u64` pixel id, so
/// lexicographic byte order matches numeric order for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PixelKey(pub u64);

impl Codec for PixelKey {
    fn encode(&self) -> Vec<u8> {
        fixed::pack(self.0).to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self(fixed::unpack(bytes)?))
    }
}

/// `timestamps` table key: big-endian fixed `u64` unix nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampKey(pub u64);

impl Codec for TimestampKey {
    fn encode(&self) -> Vec<u8> {
        fixed::pack(self.0).to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self(fixed::unpack(bytes)?))
    }
}
