//! UTF-8 string codec. Packing is an identity over the encoded bytes;
//! unpacking rejects anything that isn't valid UTF-8.

use crate::error::{AlertbaseError, Result};

pub fn pack(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

pub fn unpack(buf: &[u8]) -> Result<String> {
    std::str::from_utf8(buf)
        .map(str::to_owned)
        .map_err(|_| AlertbaseError::DecodeUtf8 { offset: 0 })
}
