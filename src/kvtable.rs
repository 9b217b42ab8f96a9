//! A small generic wrapper binding a key codec and a value codec to an
//! embedded ordered-key storage engine instance.
//!
//! Each table owns its own `rocksdb::DB` instance, because the on-disk
//! layout fixes `candidates/`, `objects/`, `healpixels/`, and
//! `timestamps/` as independent directories rather than column families
//! of one shared directory.

use std::path::Path;

use rocksdb::{IteratorMode, Options, WriteBatch, DB};

use crate::error::Result;

/// Encodes and decodes a Rust value to and from the raw bytes stored in a
/// table's keys or values.
pub trait Codec: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// One ordered key-value table, backed by its own RocksDB directory.
pub struct Table<K, V> {
    db: DB,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V> Table<K, V>
where
    K: Codec + Ord + Clone,
    V: Codec,
{
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.db.get(key.encode())? {
            Some(raw) => Ok(Some(V::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.db.put(key.encode(), value.encode())?;
        Ok(())
    }

    /// Reads the current value at `key` (empty if absent), appends
    /// `extra_encoded` to it, and writes the result back. This is a
    /// read-modify-write: callers sharing a key across concurrent writers
    /// must serialize their calls (see the pipeline module's single
    /// index-writer design).
    pub fn append(&self, key: &K, extra_encoded: &[u8]) -> Result<()> {
        let key_raw = key.encode();
        let mut current = self.db.get(&key_raw)?.unwrap_or_default();
        current.extend_from_slice(extra_encoded);

        let mut batch = WriteBatch::default();
        batch.put(&key_raw, &current);
        self.db.write(batch)?;
        Ok(())
    }

    /// Scans `[start, end)` in ascending key order.
    pub fn range_scan<'a>(&'a self, start: &K, end: &K) -> Result<RangeScan<'a>> {
        let from = start.encode();
        let to = end.encode();
        let mode = IteratorMode::From(&from, rocksdb::Direction::Forward);
        let inner = self.db.iterator(mode);
        Ok(RangeScan {
            inner,
            end: to,
            done: false,
        })
    }

    pub fn count(&self) -> u64 {
        self.db.iterator(IteratorMode::Start).count() as u64
    }

    /// Scans the full table to compute `(count, min_key, max_key)` for the
    /// manifest. Returns `None` if the table is empty.
    pub fn key_range_stats(&self) -> Result<Option<(u64, K, K)>> {
        let mut count = 0u64;
        let mut min_key: Option<K> = None;
        let mut max_key: Option<K> = None;

        for item in self.db.iterator(IteratorMode::Start) {
            let (raw_key, _) = item?;
            let key = K::decode(&raw_key)?;
            count += 1;
            // Compare decoded keys directly rather than trusting RocksDB's
            // byte-lexicographic iteration order: `candidates` keys are
            // varint-encoded and are never expected to sort the same way
            // byte-wise as they do numerically.
            let is_new_min = match &min_key {
                Some(min) => &key < min,
                None => true,
            };
            if is_new_min {
                min_key = Some(key.clone());
            }
            let is_new_max = match &max_key {
                Some(max) => &key > max,
                None => true,
            };
            if is_new_max {
                max_key = Some(key.clone());
            }
        }

        match (min_key, max_key) {
            (Some(min), Some(max)) => Ok(Some((count, min, max))),
            _ => Ok(None),
        }
    }
}

pub struct RangeScan<'a> {
    inner: rocksdb::DBIteratorWithThreadMode<'a, DB>,
    end: Vec<u8>,
    done: bool,
}

impl<'a> Iterator for RangeScan<'a> {
    type Item = Result<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok((key, value))) => {
                if key.as_ref() >= self.end.as_slice() {
                    self.done = true;
                    return None;
                }
                Some(Ok((key, value)))
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e.into()))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
