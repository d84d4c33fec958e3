//! Easing curves for camera transitions.

use serde::{Deserialize, Serialize};

/// Easing function variants for camera transition curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingFunction {
    /// Linear interpolation (no easing).
    Linear,
    /// Quadratic ease-out (fast start, slow end).
    QuadraticOut,
    /// Cubic ease-in-out (slow start and end).
    CubicInOut,
    /// Cubic Hermite interpolation with configurable control points.
    /// Formula: c1·3t(1-t)² + c2·3(1-t)t² + t³
    CubicHermite {
        /// First control point.
        c1: f32,
        /// Second control point.
        c2: f32,
    },
}

impl EasingFunction {
    /// Default camera easing: cubic Hermite ease-out.
    pub const DEFAULT: EasingFunction =
        EasingFunction::CubicHermite { c1: 0.33, c2: 1.0 };

    /// Evaluate the curve at `t`, clamped to `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Self::Linear => t,
            Self::QuadraticOut => {
                let omt = 1.0 - t;
                1.0 - omt * omt
            }
            Self::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u * u / 2.0
                }
            }
            Self::CubicHermite { c1, c2 } => {
                let omt = 1.0 - t;
                c1 * 3.0 * t * omt * omt + c2 * 3.0 * omt * t * t + t * t * t
            }
        }
    }
}

impl Default for EasingFunction {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_fixed() {
        for f in [
            EasingFunction::Linear,
            EasingFunction::QuadraticOut,
            EasingFunction::CubicInOut,
            EasingFunction::DEFAULT,
        ] {
            assert!(f.evaluate(0.0).abs() < 1e-6);
            assert!((f.evaluate(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn input_is_clamped() {
        let f = EasingFunction::Linear;
        assert_eq!(f.evaluate(-1.0), 0.0);
        assert_eq!(f.evaluate(2.0), 1.0);
    }

    #[test]
    fn hermite_default_eases_out() {
        let f = EasingFunction::DEFAULT;
        assert!(f.evaluate(0.5) > 0.5);
    }
}
