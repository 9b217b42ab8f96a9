//! Extracts just the fields the secondary index needs from an alert
//! envelope, without materializing the rest of the (much larger, much more
//! complex) self-describing binary record.

mod cursor;

use std::collections::BTreeMap;

use crate::codec::jd_to_unix_seconds;
use crate::error::{AlertbaseError, Result};
use cursor::Cursor;

/// A position on the celestial sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl Position {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self { ra_deg, dec_deg }
    }

    /// The unit-sphere Cartesian coordinates for this position, computed on
    /// request rather than stored.
    pub fn to_cartesian(self) -> (f64, f64, f64) {
        let ra = self.ra_deg.to_radians();
        let dec = self.dec_deg.to_radians();
        let x = dec.cos() * ra.cos();
        let y = dec.cos() * ra.sin();
        let z = dec.sin();
        (x, y, z)
    }
}

/// A decoded scalar field captured by the full (non-minimal) decode path.
/// Deliberately narrow -- this is not a general-purpose Avro value type,
/// just enough to carry the handful of fields `decode_full` captures
/// beyond the minimal set.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Long(i64),
    Str(String),
    Double(f64),
}

pub type DecodedFields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub candidate_id: u64,
    pub object_id: String,
    pub position: Position,
    /// Exposure timestamp as a Julian date, the alert source's native unit.
    pub jd: f64,
    pub raw_payload: Vec<u8>,
    /// Present only when decoded via [`AlertRecord::decode_full`].
    pub decoded_fields: Option<DecodedFields>,
}

impl AlertRecord {
    pub fn unix_seconds(&self) -> f64 {
        jd_to_unix_seconds(self.jd)
    }

    /// Decodes only `candidate_id`, `object_id`, `ra`/`dec`, and `jd` from
    /// a raw alert envelope. This is the fast path used during ingest: it
    /// never materializes the many fields the index has no use for.
    pub fn decode_minimal(raw: &[u8]) -> Result<Self> {
        let mut record = Self::decode_common(raw, false)?;
        record.raw_payload = raw.to_vec();
        Ok(record)
    }

    /// Decodes the same fields as [`AlertRecord::decode_minimal`], plus a
    /// handful of auxiliary scalar fields collected into `decoded_fields`.
    /// Used when reading a record back from the blob store for inspection
    /// rather than for index maintenance.
    pub fn decode_full(raw: &[u8]) -> Result<Self> {
        let mut record = Self::decode_common(raw, true)?;
        record.raw_payload = raw.to_vec();
        Ok(record)
    }

    fn decode_common(raw: &[u8], capture_extra: bool) -> Result<Self> {
        let mut cur = Cursor::new(raw);

        cur.skip_object_container_header()?;

        let block_count = cur.read_long()?;
        if block_count != 1 {
            return Err(AlertbaseError::DecodeSchemaMismatch {
                offset: cur.offset(),
                detail: format!("expected a single-record block, found count {block_count}"),
            });
        }
        let _block_len = cur.read_long()?;

        let mut fields: DecodedFields = BTreeMap::new();

        let schemavsn = cur.read_utf8()?;
        let publisher = cur.read_utf8()?;
        if capture_extra {
            fields.insert("schemavsn".to_string(), FieldValue::Str(schemavsn));
            fields.insert("publisher".to_string(), FieldValue::Str(publisher));
        }

        let object_id = cur.read_utf8()?;
        let candid = cur.read_long()?;

        let jd = cur.read_double()?;

        let fid = cur.read_int()?;
        let pid = cur.read_long()?;
        cur.skip_optional(|c| c.skip_fixed(4))?; // diffmaglim: float
        cur.skip_optional(|c| c.skip_utf8())?; // pdiffimfilename: string
        cur.skip_optional(|c| c.skip_utf8())?; // programpi: string
        let programid = cur.read_int()?;
        let _nested_candid = cur.read_long()?; // candidate.candid, redundant with top-level candid
        let isdiffpos = cur.read_utf8()?;
        cur.skip_optional(|c| c.skip_long())?; // tblid: long
        cur.skip_optional(|c| c.skip_int())?; // nid: int
        cur.skip_optional(|c| c.skip_int())?; // rcid: int
        cur.skip_optional(|c| c.skip_int())?; // field: int
        cur.skip_optional(|c| c.skip_fixed(4))?; // xpos: float
        cur.skip_optional(|c| c.skip_fixed(4))?; // ypos: float

        if capture_extra {
            fields.insert("fid".to_string(), FieldValue::Long(fid as i64));
            fields.insert("pid".to_string(), FieldValue::Long(pid));
            fields.insert("programid".to_string(), FieldValue::Long(programid as i64));
            fields.insert("isdiffpos".to_string(), FieldValue::Str(isdiffpos));
        }

        let ra = cur.read_double()?;
        let dec = cur.read_double()?;

        if candid <= 0 {
            return Err(AlertbaseError::DecodeSchemaMismatch {
                offset: cur.offset(),
                detail: "candid must be positive".to_string(),
            });
        }

        Ok(AlertRecord {
            candidate_id: candid as u64,
            object_id,
            position: Position::new(ra, dec),
            jd,
            raw_payload: Vec::new(),
            decoded_fields: capture_extra.then_some(fields),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal, valid single-record container matching the
    /// layout `decode_common` expects, with the given scalar fields.
    fn build_fixture(object_id: &str, candid: i64, jd: f64, ra: f64, dec: f64) -> Vec<u8> {
        let mut buf = Vec::new();

        // Header: magic + empty metadata map + 16-byte sync marker.
        buf.extend_from_slice(b"Obj\x01");
        buf.push(0x00); // metadata map terminator (zero-length block)
        buf.extend_from_slice(&[0u8; 16]);

        fn push_long(buf: &mut Vec<u8>, n: i64) {
            let mut u = ((n << 1) ^ (n >> 63)) as u64;
            loop {
                let chunk = (u & 0x7f) as u8;
                u >>= 7;
                if u != 0 {
                    buf.push(chunk | 0x80);
                } else {
                    buf.push(chunk);
                    break;
                }
            }
        }
        fn push_string(buf: &mut Vec<u8>, s: &str) {
            push_long(buf, s.len() as i64);
            buf.extend_from_slice(s.as_bytes());
        }
        fn push_null(buf: &mut Vec<u8>) {
            push_long(buf, 0);
        }

        push_long(&mut buf, 1); // block count
        push_long(&mut buf, 0); // block length (unchecked by decoder)

        push_string(&mut buf, "4.02"); // schemavsn
        push_string(&mut buf, "ztf"); // publisher

        push_string(&mut buf, object_id);
        push_long(&mut buf, candid);

        buf.extend_from_slice(&jd.to_le_bytes()); // jd

        push_long(&mut buf, 1); // fid
        push_long(&mut buf, 123); // pid
        push_null(&mut buf); // diffmaglim
        push_null(&mut buf); // pdiffimfilename
        push_null(&mut buf); // programpi
        push_long(&mut buf, 1); // programid
        push_long(&mut buf, candid); // nested candid
        push_string(&mut buf, "t"); // isdiffpos
        push_null(&mut buf); // tblid
        push_null(&mut buf); // nid
        push_null(&mut buf); // rcid
        push_null(&mut buf); // field
        push_null(&mut buf); // xpos
        push_null(&mut buf); // ypos

        buf.extend_from_slice(&ra.to_le_bytes());
        buf.extend_from_slice(&dec.to_le_bytes());

        buf
    }

    #[test]
    fn decodes_reference_fixture_minimal() {
        let raw = build_fixture(
            "ZTF18aaylcqb",
            1311156250015010003,
            2459065.65625,
            234.1362886,
            16.6055949,
        );
        let record = AlertRecord::decode_minimal(&raw).unwrap();
        assert_eq!(record.candidate_id, 1311156250015010003);
        assert_eq!(record.object_id, "ZTF18aaylcqb");
        assert_eq!(record.position.ra_deg, 234.1362886);
        assert_eq!(record.position.dec_deg, 16.6055949);
        assert_eq!(record.jd, 2459065.65625);
        assert_eq!(record.raw_payload, raw);
        assert!(record.decoded_fields.is_none());
    }

    #[test]
    fn decodes_reference_fixture_full() {
        let raw = build_fixture(
            "ZTF18aaylcqb",
            1311156250015010003,
            2459065.65625,
            234.1362886,
            16.6055949,
        );
        let record = AlertRecord::decode_full(&raw).unwrap();
        assert_eq!(record.candidate_id, 1311156250015010003);
        let fields = record.decoded_fields.unwrap();
        assert_eq!(
            fields.get("isdiffpos"),
            Some(&FieldValue::Str("t".to_string()))
        );
    }

    #[test]
    fn rejects_multi_block_containers() {
        let mut raw = build_fixture("obj", 1, 0.0, 0.0, 0.0);
        // Corrupt the block-count byte (first byte right after the header).
        let header_len = 4 + 1 + 16;
        raw[header_len] = 2;
        let err = AlertRecord::decode_minimal(&raw).unwrap_err();
        assert!(matches!(err, AlertbaseError::DecodeSchemaMismatch { .. }));
    }

    #[test]
    fn truncated_fixture_is_truncation_error() {
        let raw = build_fixture("obj", 1, 0.0, 0.0, 0.0);
        let truncated = &raw[..raw.len() - 4];
        let err = AlertRecord::decode_minimal(truncated).unwrap_err();
        assert!(matches!(err, AlertbaseError::DecodeTruncated { .. }));
    }
}
