//! HEALPix nested-scheme spatial indexing.
//!
//! Maps a sky position to a pixel id at a fixed order, maps a disc on the
//! sphere to the set of pixel ids that might intersect it, and compacts a
//! sorted pixel-id set into contiguous `[start, end)` ranges so a cone
//! search becomes a handful of range scans instead of many point lookups.
//!
//! No HEALPix crate is used anywhere in this codebase's lineage, so the
//! nested-scheme math below is a direct, from-scratch translation of the
//! well-known reference algorithm (the same one `healpy`/HEALPix_cxx
//! implement as `ang2pix_nest`/`pix2ang_nest`), structured as small, unit
//! tested functions in the style of this crate's other codec modules.

use crate::record::Position;

const PI: f64 = std::f64::consts::PI;

pub fn nside(order: u8) -> u64 {
    1u64 << order
}

/// Spreads the bits of `v` (at most 32 significant bits) so there is a
/// zero between each original bit -- the building block for interleaving
/// two face-local coordinates into one nested pixel-in-face index.
fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0xFFFF_FFFF;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: extracts every other bit starting at bit 0.
fn compress_bits(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x
}

/// Maps a unit-sphere position to its nested-scheme HEALPix pixel id at
/// the given order.
pub fn position_to_pixel(order: u8, position: Position) -> u64 {
    let ns = nside(order);
    let fns = ns as f64;
    let (x, y, z) = position.to_cartesian();

    let za = z.abs();
    let tt = {
        let t = y.atan2(x) * 2.0 / PI; // in [-4, 4)
        if t < 0.0 {
            t + 4.0
        } else {
            t
        }
    };

    let (face_num, ix, iy): (u64, u64, u64);

    if za <= 2.0 / 3.0 {
        let temp1 = fns * (0.5 + tt);
        let temp2 = fns * z * 0.75;
        let jp = (temp1 - temp2).floor() as i64;
        let jm = (temp1 + temp2).floor() as i64;

        let ns_i = ns as i64;
        let ifp = jp >> order;
        let ifm = jm >> order;

        face_num = if ifp == ifm {
            (if ifp == 4 { 4 } else { ifp + 4 }) as u64
        } else if ifp < ifm {
            ifp as u64
        } else {
            (ifm + 8) as u64
        };

        ix = (jm & (ns_i - 1)) as u64;
        iy = (ns_i - (jp & (ns_i - 1)) - 1) as u64;
    } else {
        let mut ntt = tt.floor() as i64;
        if ntt >= 4 {
            ntt = 3;
        }
        let tp = tt - ntt as f64;
        let tmp = fns * (3.0 * (1.0 - za)).sqrt();

        let jp = ((tp * tmp).floor() as i64).min(ns as i64 - 1);
        let jm = (((1.0 - tp) * tmp).floor() as i64).min(ns as i64 - 1);

        if z >= 0.0 {
            face_num = ntt as u64;
            ix = (ns as i64 - jm - 1) as u64;
            iy = (ns as i64 - jp - 1) as u64;
        } else {
            face_num = (ntt + 8) as u64;
            ix = jp as u64;
            iy = jm as u64;
        }
    }

    let ipf = spread_bits(ix) | (spread_bits(iy) << 1);
    face_num * ns * ns + ipf
}

/// The center of a nested-scheme pixel, as a sky position. Inverse of
/// [`position_to_pixel`] at the resolution granularity of one pixel.
pub fn pixel_to_position(order: u8, pixel: u64) -> Position {
    const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
    const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

    let ns = nside(order) as i64;
    let npface = (ns * ns) as u64;
    let face_num = (pixel / npface) as usize;
    let ipf = (pixel % npface) as i64;

    let ix = compress_bits(ipf as u64) as i64;
    let iy = compress_bits((ipf as u64) >> 1) as i64;

    let jr = JRLL[face_num] * ns - ix - iy - 1;

    let fact1 = 1.0 / (6.0 * ns as f64);
    let fact2 = 1.0 / (3.0 * (ns * ns) as f64);

    let (z, nr, kshift): (f64, i64, i64);
    if jr < ns {
        nr = jr;
        z = 1.0 - (nr * nr) as f64 * fact2;
        kshift = 0;
    } else if jr > 3 * ns {
        nr = 4 * ns - jr;
        z = -1.0 + (nr * nr) as f64 * fact2;
        kshift = 0;
    } else {
        nr = ns;
        z = (2 * ns - jr) as f64 * fact1;
        kshift = (jr - ns) & 1;
    }

    let theta = z.clamp(-1.0, 1.0).acos();

    let mut jp = (JPLL[face_num] * nr + ix - iy + 1 + kshift) / 2;
    if jp > 4 * ns {
        jp -= 4 * ns;
    }
    if jp < 1 {
        jp += 4 * ns;
    }

    let phi = (jp as f64 - (kshift as f64 + 1.0) * 0.5) * (PI / 2.0) / nr as f64;

    let dec = PI / 2.0 - theta;
    Position::new(phi.to_degrees(), dec.to_degrees())
}

fn angular_distance(a: Position, b: Position) -> f64 {
    let (ax, ay, az) = a.to_cartesian();
    let (bx, by, bz) = b.to_cartesian();
    let dot = (ax * bx + ay * by + az * bz).clamp(-1.0, 1.0);
    dot.acos()
}

/// A conservative upper bound on the angular distance from a pixel's
/// center to its farthest corner at the given order. Deliberately
/// generous (about twice the equivalent-area circle radius) so the
/// recursive disc search in [`disc_to_pixels`] never prunes a pixel that
/// could genuinely overlap the search disc.
fn pixel_bound_radius(order: u8) -> f64 {
    let n = nside(order) as f64;
    2.0 / (n * 3f64.sqrt())
}

/// Returns every pixel id at `order` whose pixel might intersect the disc
/// centered at `center` with angular radius `radius_deg`. Over-inclusive
/// by design (see module docs): some returned pixels only partially
/// overlap the disc, or touch it only at the conservative bound.
pub fn disc_to_pixels(order: u8, center: Position, radius_deg: f64) -> Vec<u64> {
    let radius_rad = radius_deg.to_radians();
    let mut out = Vec::new();

    fn recurse(
        level: u8,
        pixel: u64,
        target_order: u8,
        center: Position,
        radius_rad: f64,
        out: &mut Vec<u64>,
    ) {
        let pixel_center = pixel_to_position(level, pixel);
        let dist = angular_distance(pixel_center, center);
        if dist > radius_rad + pixel_bound_radius(level) {
            return;
        }
        if level == target_order {
            out.push(pixel);
            return;
        }
        for child in 0..4u64 {
            recurse(level + 1, pixel * 4 + child, target_order, center, radius_rad, out);
        }
    }

    for base_pixel in 0..12u64 {
        recurse(0, base_pixel, order, center, radius_rad, &mut out);
    }

    out.sort_unstable();
    out.dedup();
    out
}

/// Collapses a sorted, deduplicated sequence of pixel ids into the
/// minimal set of disjoint, ascending, half-open `[start, end)` ranges
/// covering exactly the input set.
pub fn compact_ranges(sorted_unique: &[u64]) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut iter = sorted_unique.iter().copied();

    let Some(first) = iter.next() else {
        return ranges;
    };

    let mut start = first;
    let mut prev = first;

    for pixel in iter {
        if pixel == prev + 1 {
            prev = pixel;
            continue;
        }
        ranges.push((start, prev + 1));
        start = pixel;
        prev = pixel;
    }
    ranges.push((start, prev + 1));

    ranges
}
