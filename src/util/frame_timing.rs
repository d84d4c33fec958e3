//! Frame-rate bookkeeping for the canvas loop.

/// Smoothed frame-rate tracking driven by host timestamps.
///
/// The host animation-frame callback supplies timestamps in milliseconds, so
/// timing is computed from those rather than from a wall clock.
#[derive(Debug, Clone)]
pub struct FrameTiming {
    /// Timestamp of the last rendered frame (ms), if any.
    last_frame: Option<f64>,
    /// Smoothed FPS using exponential moving average
    smoothed_fps: f32,
    /// Smoothing factor (lower = smoother, 0.0-1.0)
    smoothing: f32,
    frames: u64,
}

impl FrameTiming {
    /// Create a tracker with the given smoothing factor.
    #[must_use]
    pub fn new(smoothing: f32) -> Self {
        Self {
            last_frame: None,
            smoothed_fps: 60.0,
            smoothing: smoothing.clamp(0.0, 1.0),
            frames: 0,
        }
    }

    /// Record a rendered frame at timestamp `t` (ms). Returns the time since
    /// the previous rendered frame, if there was one.
    pub fn end_frame(&mut self, t: f64) -> Option<f64> {
        self.frames += 1;
        let delta = self.last_frame.map(|last| t - last);
        self.last_frame = Some(t);
        if let Some(dt) = delta.filter(|dt| *dt > 0.0) {
            let instant_fps = (1000.0 / dt) as f32;
            self.smoothed_fps = self.smoothed_fps * (1.0 - self.smoothing)
                + instant_fps * self.smoothing;
        }
        delta
    }

    /// Get the current FPS (smoothed)
    #[must_use]
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Number of frames recorded so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(0.05)
    }
}
