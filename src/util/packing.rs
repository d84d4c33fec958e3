//! Packing of integer ids and depth values into 8-bit color channels.
//!
//! Pick buffers are plain RGBA8 targets: ids are spread over the RGB bytes
//! (24 bits) and depth over all four bytes with a `255/256` downscale so
//! that a depth of exactly 1.0 does not overflow.

/// Sentinel id written for geometry that must never resolve to a hit.
pub const NULL_ID: u32 = (1 << 24) - 2;

/// Largest id representable in a 24-bit RGB triplet. Pick targets are
/// cleared to white, which decodes to this value.
pub const MAX_ID: u32 = (1 << 24) - 1;

const PACK_UPSCALE: f64 = 256.0 / 255.0;
const UNPACK_DOWNSCALE: f64 = 255.0 / 256.0;
const PACK_FACTORS: [f64; 3] = [256.0 * 256.0 * 256.0, 256.0 * 256.0, 256.0];
const SHIFT_RIGHT_8: f64 = 1.0 / 256.0;

/// Pack an id into an RGB byte triplet, most significant byte first.
/// Values above [`MAX_ID`] are clamped.
#[must_use]
pub fn pack_int_to_rgb(value: u32) -> [u8; 3] {
    let v = value.min(MAX_ID);
    [(v >> 16) as u8, ((v >> 8) & 0xff) as u8, (v & 0xff) as u8]
}

/// Inverse of [`pack_int_to_rgb`].
#[must_use]
pub fn unpack_rgb_to_int(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Pack a depth in `[0, 1]` into RGBA bytes, matching the GPU-side
/// `packDepthToRGBA` encoding.
#[must_use]
pub fn pack_depth_to_rgba(depth: f32) -> [u8; 4] {
    let v = f64::from(depth.clamp(0.0, 1.0));
    let x = (v * PACK_FACTORS[0]).fract();
    let y = (v * PACK_FACTORS[1]).fract();
    let z = (v * PACK_FACTORS[2]).fract();
    let w = v;
    let r = [x, y - x * SHIFT_RIGHT_8, z - y * SHIFT_RIGHT_8, w - z * SHIFT_RIGHT_8];
    r.map(|c| (c * PACK_UPSCALE * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Decode a depth packed by [`pack_depth_to_rgba`] (or the equivalent
/// shader function). Bytes are normalized to `[0, 1]` before weighting.
#[must_use]
pub fn unpack_rgba_to_depth(r: u8, g: u8, b: u8, a: u8) -> f32 {
    let unpack = [
        UNPACK_DOWNSCALE / PACK_FACTORS[0],
        UNPACK_DOWNSCALE / PACK_FACTORS[1],
        UNPACK_DOWNSCALE / PACK_FACTORS[2],
        UNPACK_DOWNSCALE,
    ];
    let bytes = [r, g, b, a];
    let depth: f64 = bytes
        .iter()
        .zip(unpack)
        .map(|(&c, f)| f64::from(c) / 255.0 * f)
        .sum();
    depth as f32
}

/// Whether a decoded id means "nothing here".
#[must_use]
pub fn is_no_hit(id: u32) -> bool {
    id == NULL_ID || id == MAX_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip_covers_extremes() {
        for id in [0, 1, 255, 256, 65_535, 65_536, 1_000_000, NULL_ID - 1] {
            let [r, g, b] = pack_int_to_rgb(id);
            assert_eq!(unpack_rgb_to_int(r, g, b), id);
        }
    }

    #[test]
    fn cleared_white_is_no_hit() {
        assert_eq!(unpack_rgb_to_int(255, 255, 255), MAX_ID);
        assert!(is_no_hit(MAX_ID));
        assert!(is_no_hit(NULL_ID));
        assert!(!is_no_hit(42));
    }

    #[test]
    fn depth_round_trip_within_quantization() {
        let mut d = 0.0_f32;
        while d < 1.0 {
            let [r, g, b, a] = pack_depth_to_rgba(d);
            let back = unpack_rgba_to_depth(r, g, b, a);
            assert!((back - d).abs() <= 1.0 / 255.0, "{d} -> {back}");
            d += 0.013;
        }
    }

    #[test]
    fn depth_one_does_not_overflow() {
        let [r, g, b, a] = pack_depth_to_rgba(1.0);
        let back = unpack_rgba_to_depth(r, g, b, a);
        assert!(back <= 1.0);
        assert!(back > 0.99);
    }
}
