//! The four ordered-key secondary-index tables and the typed key/value
//! wrappers bound to their codecs. See `crate::kvtable` for the generic
//! table machinery this module specializes.

mod keys;

use std::path::Path;

use crate::codec::varint;
use crate::error::{AlertbaseError, Result};
use crate::kvtable::{Codec, Table};

pub use keys::{CandidateIdKey, ObjectIdKey, PixelKey, TimestampKey};

/// The value stored for every one-to-many table: a list of candidate ids,
/// encoded as concatenated zig-zag varints with no separator. Decoding
/// relies entirely on each varint's self-delimiting continuation bit --
/// no other codec may ever be interleaved into one of these values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateIdList(pub Vec<u64>);

impl Codec for CandidateIdList {
    fn encode(&self) -> Vec<u8> {
        varint::pack_seq(self.0.iter().map(|&id| id as i64))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let ids: Result<Vec<u64>> = varint::unpack_seq(bytes)
            .map(|res| res.map(|v| v as u64))
            .collect();
        Ok(Self(ids?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlValue(pub String);

impl Codec for UrlValue {
    fn encode(&self) -> Vec<u8> {
        crate::codec::text::pack(&self.0)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Self(crate::codec::text::unpack(bytes)?))
    }
}

pub struct IndexStore {
    pub candidates: Table<CandidateIdKey, UrlValue>,
    pub objects: Table<ObjectIdKey, CandidateIdList>,
    pub healpixels: Table<PixelKey, CandidateIdList>,
    pub timestamps: Table<TimestampKey, CandidateIdList>,
}

impl IndexStore {
    pub fn open(db_root: impl AsRef<Path>) -> Result<Self> {
        let root = db_root.as_ref();
        Ok(Self {
            candidates: Table::open(root.join("candidates"))?,
            objects: Table::open(root.join("objects"))?,
            healpixels: Table::open(root.join("healpixels"))?,
            timestamps: Table::open(root.join("timestamps"))?,
        })
    }

    /// Writes all four secondary-index entries for one alert. Not
    /// atomic across tables: a crash partway through can leave the
    /// candidate URL recorded without every secondary entry, or vice
    /// versa (see the pipeline module docs for the operator-driven
    /// recovery story via `skip_existing`).
    pub fn insert(
        &self,
        url: &str,
        candidate_id: u64,
        object_id: &str,
        pixel: u64,
        unix_nanos: u64,
    ) -> Result<()> {
        self.candidates
            .put(&CandidateIdKey(candidate_id), &UrlValue(url.to_string()))?;

        self.objects.append(
            &ObjectIdKey(object_id.to_string()),
            &varint::pack(candidate_id as i64),
        )?;

        self.healpixels
            .append(&PixelKey(pixel), &varint::pack(candidate_id as i64))?;

        self.timestamps
            .append(&TimestampKey(unix_nanos), &varint::pack(candidate_id as i64))?;

        Ok(())
    }

    pub fn get_url(&self, candidate_id: u64) -> Result<Option<String>> {
        Ok(self
            .candidates
            .get(&CandidateIdKey(candidate_id))?
            .map(|v| v.0))
    }

    pub fn object_candidate_ids(&self, object_id: &str) -> Result<Vec<u64>> {
        Ok(self
            .objects
            .get(&ObjectIdKey(object_id.to_string()))?
            .map(|v| v.0)
            .unwrap_or_default())
    }

    pub fn time_range_candidate_ids(&self, start_nanos: u64, end_nanos: u64) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        for entry in self
            .timestamps
            .range_scan(&TimestampKey(start_nanos), &TimestampKey(end_nanos))?
        {
            let (_, value) = entry?;
            out.extend(CandidateIdList::decode(&value)?.0);
        }
        Ok(out)
    }

    pub fn pixel_range_candidate_ids(&self, start_pixel: u64, end_pixel: u64) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        for entry in self
            .healpixels
            .range_scan(&PixelKey(start_pixel), &PixelKey(end_pixel))?
        {
            let (_, value) = entry?;
            out.extend(CandidateIdList::decode(&value)?.0);
        }
        Ok(out)
    }

    pub fn count_candidates(&self) -> u64 {
        self.candidates.count()
    }

    pub fn count_objects(&self) -> u64 {
        self.objects.count()
    }

    pub fn count_healpixels(&self) -> u64 {
        self.healpixels.count()
    }

    pub fn count_timestamps(&self) -> u64 {
        self.timestamps.count()
    }
}

/// Parses a stored `s3://bucket/key` URL into its bucket and key parts.
pub fn parse_s3_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| AlertbaseError::InvalidUrl(url.to_string()))?;
    let mut parts = rest.splitn(2, '/');
    let bucket = parts.next().ok_or_else(|| AlertbaseError::InvalidUrl(url.to_string()))?;
    let key = parts.next().ok_or_else(|| AlertbaseError::InvalidUrl(url.to_string()))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(AlertbaseError::InvalidUrl(url.to_string()));
    }
    Ok((bucket.to_string(), key.to_string()))
}
