//! Outward square spiral of 2D integer offsets.

/// Offsets of a square spiral of the given `radius`, starting at `(0, 0)`
/// and winding outward. The result has `(2 * radius + 1)^2` entries, so a
/// radius of 0 yields only the origin.
#[must_use]
pub fn spiral2d(radius: u32) -> Vec<[i32; 2]> {
    let size = radius as i32 * 2 + 1;
    let half = size as f32 / 2.0;
    let mut out = Vec::with_capacity((size * size) as usize);
    let (mut x, mut y) = (0_i32, 0_i32);
    let (mut dx, mut dy) = (0_i32, -1_i32);
    for _ in 0..size * size {
        let (fx, fy) = (x as f32, y as f32);
        if -half < fx && fx <= half && -half < fy && fy <= half {
            out.push([x, y]);
        }
        // Turn at the corners of the current ring.
        if x == y || (x < 0 && x == -y) || (x > 0 && x == 1 - y) {
            (dx, dy) = (-dy, dx);
        }
        x += dx;
        y += dy;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_zero_is_origin_only() {
        assert_eq!(spiral2d(0), vec![[0, 0]]);
    }

    #[test]
    fn covers_the_full_square_once() {
        let radius = 3;
        let spiral = spiral2d(radius);
        assert_eq!(spiral.len(), 49);
        assert_eq!(spiral[0], [0, 0]);
        let mut seen = std::collections::HashSet::new();
        for p in &spiral {
            assert!(p[0].abs() <= 3 && p[1].abs() <= 3);
            assert!(seen.insert(*p));
        }
    }

    #[test]
    fn first_ring_precedes_second() {
        let spiral = spiral2d(2);
        let ring = |p: &[i32; 2]| p[0].abs().max(p[1].abs());
        let rings: Vec<i32> = spiral.iter().map(ring).collect();
        let mut sorted = rings.clone();
        sorted.sort_unstable();
        assert_eq!(rings, sorted);
    }
}
