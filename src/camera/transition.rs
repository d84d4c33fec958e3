//! Eased transitions between camera snapshots.

use glam::{Quat, Vec3};

use super::core::CameraSnapshot;
use crate::util::easing::EasingFunction;

/// Interpolates the camera from one snapshot to another over host time.
///
/// The start time is latched on the first [`tick`](Self::tick) after
/// [`start`](Self::start), so a transition requested between frames begins
/// on the next frame rather than partway through.
#[derive(Debug, Clone)]
pub struct CameraTransitionManager {
    easing: EasingFunction,
    source: CameraSnapshot,
    target: CameraSnapshot,
    duration_ms: f64,
    start_time: Option<f64>,
    active: bool,
}

impl Default for CameraTransitionManager {
    fn default() -> Self {
        Self::new(EasingFunction::DEFAULT)
    }
}

impl CameraTransitionManager {
    /// Idle manager using the given easing curve.
    #[must_use]
    pub fn new(easing: EasingFunction) -> Self {
        Self {
            easing,
            source: CameraSnapshot::default(),
            target: CameraSnapshot::default(),
            duration_ms: 0.0,
            start_time: None,
            active: false,
        }
    }

    /// Whether a transition is running.
    #[must_use]
    pub fn in_transition(&self) -> bool {
        self.active
    }

    /// Begin moving from `from` to `to` over `duration_ms`.
    pub fn start(&mut self, from: CameraSnapshot, to: CameraSnapshot, duration_ms: f64) {
        self.source = from;
        self.target = to;
        self.duration_ms = duration_ms.max(1.0);
        self.start_time = None;
        self.active = true;
    }

    /// Abort without reaching the target.
    pub fn cancel(&mut self) {
        self.active = false;
        self.start_time = None;
    }

    /// Interpolated snapshot at host time `t`, or `None` when idle. The
    /// final call of a transition returns exactly the target snapshot.
    pub fn tick(&mut self, t: f64) -> Option<CameraSnapshot> {
        if !self.active {
            return None;
        }
        let start = *self.start_time.get_or_insert(t);
        let progress = ((t - start) / self.duration_ms).clamp(0.0, 1.0) as f32;
        if progress >= 1.0 {
            self.active = false;
            self.start_time = None;
            return Some(self.target);
        }
        Some(interpolate(&self.source, &self.target, self.easing.evaluate(progress)))
    }
}

/// Blend two snapshots, rotating the view direction on the sphere and
/// lerping distance so the eye orbits instead of cutting through the target.
#[must_use]
pub fn interpolate(a: &CameraSnapshot, b: &CameraSnapshot, t: f32) -> CameraSnapshot {
    let lerp = |x: f32, y: f32| x + (y - x) * t;
    let dir_a = (a.position - a.target).normalize_or(Vec3::Z);
    let dir_b = (b.position - b.target).normalize_or(Vec3::Z);
    let rotation = Quat::IDENTITY.slerp(Quat::from_rotation_arc(dir_a, dir_b), t);
    let distance = lerp(a.position.distance(a.target), b.position.distance(b.target));
    let target = a.target.lerp(b.target, t);
    let up = a.up.lerp(b.up, t).normalize_or(b.up);
    CameraSnapshot {
        mode: b.mode,
        position: target + rotation * dir_a * distance,
        target,
        up,
        radius: lerp(a.radius, b.radius),
        radius_max: lerp(a.radius_max, b.radius_max),
        fov: lerp(a.fov, b.fov),
        fog: lerp(a.fog, b.fog),
        clip_far: b.clip_far,
        min_near: lerp(a.min_near, b.min_near),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(position: Vec3, radius: f32) -> CameraSnapshot {
        CameraSnapshot {
            position,
            radius,
            ..CameraSnapshot::default()
        }
    }

    #[test]
    fn transition_latches_start_and_finishes_on_target() {
        let a = snapshot(Vec3::new(0.0, 0.0, 10.0), 1.0);
        let b = snapshot(Vec3::new(10.0, 0.0, 0.0), 5.0);
        let mut manager = CameraTransitionManager::new(EasingFunction::Linear);
        manager.start(a, b, 100.0);
        assert!(manager.in_transition());

        let first = manager.tick(1000.0);
        assert_eq!(first, Some(interpolate(&a, &b, 0.0)));

        let mid = manager.tick(1050.0).map(|s| s.radius);
        assert!(mid.is_some_and(|r| (r - 3.0).abs() < 1e-5));

        assert_eq!(manager.tick(1100.0), Some(b));
        assert!(!manager.in_transition());
        assert_eq!(manager.tick(1200.0), None);
    }

    #[test]
    fn interpolation_orbits_at_constant_distance() {
        let a = snapshot(Vec3::new(0.0, 0.0, 10.0), 1.0);
        let b = snapshot(Vec3::new(10.0, 0.0, 0.0), 1.0);
        let mid = interpolate(&a, &b, 0.5);
        assert!((mid.position.length() - 10.0).abs() < 1e-4);
    }
}
