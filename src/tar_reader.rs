//! Streams raw Avro object bytes out of a gzipped tar archive, one buffer
//! per regular-file entry, without ever materializing the whole archive in
//! memory.

use std::io::Read;

use tar::{Archive, Entries, EntryType};

use crate::error::Result;

/// Walks a gzip-compressed tar stream and yields the raw bytes of every
/// regular-file entry in archive order. Non-regular entries (directories,
/// symlinks, hardlinks, etc.) are skipped.
///
/// `tar::Archive::entries` can only be called once per archive -- a second
/// call after the cursor has advanced past the first member returns an
/// error -- so the `Entries` iterator is obtained exactly once, in `new`,
/// and kept for the reader's lifetime rather than re-created on every call
/// to `next_entry`. Since `Entries<'a, R>` borrows the `Archive<R>` it was
/// built from, the archive is heap-allocated via `Box` (whose address is
/// stable across moves of the `Box` value itself) and the borrow's
/// lifetime is asserted as `'static`, justified by that stable address and
/// by the field drop order below.
pub struct TarAlertReader<R: Read + 'static> {
    entries: Entries<'static, flate2::read::GzDecoder<R>>,
    // Dropped after `entries` (declaration order is drop order), so the
    // borrow `entries` holds on it stays valid for as long as it's used.
    _archive: Box<Archive<flate2::read::GzDecoder<R>>>,
}

impl<R: Read + 'static> TarAlertReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = Box::new(Archive::new(flate2::read::GzDecoder::new(reader)));
        let entries = archive.entries()?;

        // SAFETY: `entries` borrows `*archive` for the lifetime of that
        // borrow. `archive`'s heap allocation does not move when the `Box`
        // itself is moved into `Self` below, so the borrow stays valid; the
        // struct drops `entries` before `_archive` (declaration order),
        // so the borrow never outlives its referent.
        let entries: Entries<'static, flate2::read::GzDecoder<R>> =
            unsafe { std::mem::transmute(entries) };

        Ok(Self {
            entries,
            _archive: archive,
        })
    }

    /// Reads and returns the next regular-file entry's bytes, or `None`
    /// once the archive is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(entry) = self.entries.next() else {
                return Ok(None);
            };
            let mut entry = entry?;
            if entry.header().entry_type() != EntryType::Regular {
                continue;
            }
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
}
