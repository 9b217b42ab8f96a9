//! The `meta.json` sidecar: bucket/region configuration plus per-table
//! `(count, min, max)` statistics, recomputed on close if the session
//! wrote anything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableStats<T> {
    pub count: u64,
    pub min: T,
    pub max: T,
}

impl<T: Default> Default for TableStats<T> {
    fn default() -> Self {
        Self {
            count: 0,
            min: T::default(),
            max: T::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub s3_bucket: String,
    pub s3_region: String,
    pub candidates: TableStats<u64>,
    pub objects: TableStats<String>,
    pub healpixels: TableStats<u64>,
    /// Serialized as POSIX-epoch seconds, per the on-disk manifest schema.
    pub timestamps: TableStats<f64>,
    /// The fixed HEALPix order this database's `healpixels` table was
    /// built with. Promoted here from a hard-coded constant (see
    /// `SPEC_FULL.md`'s Open Question resolution) so a reader of the
    /// manifest alone knows how to interpret pixel ids.
    pub healpix_order: u8,
}

impl Manifest {
    pub fn new(s3_bucket: String, s3_region: String, healpix_order: u8) -> Self {
        Self {
            s3_bucket,
            s3_region,
            candidates: TableStats::default(),
            objects: TableStats::default(),
            healpixels: TableStats::default(),
            timestamps: TableStats {
                count: 0,
                min: 0.0,
                max: 0.0,
            },
            healpix_order,
        }
    }

    fn path(db_root: &Path) -> PathBuf {
        db_root.join("meta.json")
    }

    pub fn load(db_root: &Path) -> Result<Option<Self>> {
        let path = Self::path(db_root);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn write(&self, db_root: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(db_root), raw)?;
        Ok(())
    }

    /// Recomputes every table's `(count, min, max)` from a full scan, per
    /// spec: "recomputed on close if writes occurred."
    pub fn recompute(&mut self, index: &IndexStore) -> Result<()> {
        if let Some((count, min, max)) = index.candidates.key_range_stats()? {
            self.candidates = TableStats {
                count,
                min: min.0,
                max: max.0,
            };
        }
        if let Some((count, min, max)) = index.objects.key_range_stats()? {
            self.objects = TableStats {
                count,
                min: min.0,
                max: max.0,
            };
        }
        if let Some((count, min, max)) = index.healpixels.key_range_stats()? {
            self.healpixels = TableStats {
                count,
                min: min.0,
                max: max.0,
            };
        }
        if let Some((count, min, max)) = index.timestamps.key_range_stats()? {
            self.timestamps = TableStats {
                count,
                min: min.0 as f64 / 1e9,
                max: max.0 as f64 / 1e9,
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let manifest = Manifest::new("bucket".to_string(), "us-east-1".to_string(), 12);
        let raw = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.s3_bucket, "bucket");
        assert_eq!(back.healpix_order, 12);
    }

    #[test]
    fn absent_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::load(dir.path()).unwrap().is_none());
    }
}
