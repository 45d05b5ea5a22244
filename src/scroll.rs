//! # Scroll trigger
//!
//! Rate-limited gate between "the viewport is near the bottom" and the
//! paginator's load-more. The caller feeds it scroll measurements; it says
//! whether to fire. Detach it when the active view stops being a paginated
//! one so a stale view can never trigger loads.
use std::time::{Duration, Instant};

/// Minimum gap between two fires.
pub const SCROLL_COOLDOWN: Duration = Duration::from_millis(200);

/// Fire only within this many pixels of the document bottom.
pub const SCROLL_THRESHOLD_PX: f64 = 800.0;

pub struct ScrollTrigger {
    cooldown: Duration,
    threshold_px: f64,
    last_fired: Option<Instant>,
    attached: bool,
}

impl ScrollTrigger {
    pub fn new() -> Self {
        Self::with_limits(SCROLL_COOLDOWN, SCROLL_THRESHOLD_PX)
    }

    pub fn with_limits(cooldown: Duration, threshold_px: f64) -> Self {
        Self {
            cooldown,
            threshold_px,
            last_fired: None,
            attached: true,
        }
    }

    /// Detach when leaving the paginated view; clears any pending cooldown
    /// so nothing outlives the view transition.
    pub fn detach(&mut self) {
        self.attached = false;
        self.last_fired = None;
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Whether a load-more should fire for this scroll measurement.
    pub fn should_fire(&mut self, distance_to_bottom_px: f64, now: Instant) -> bool {
        if !self.attached {
            return false;
        }
        if distance_to_bottom_px > self.threshold_px {
            return false;
        }
        if let Some(last) = self.last_fired {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }

        self.last_fired = Some(now);
        true
    }
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_near_bottom() {
        let mut trigger = ScrollTrigger::new();
        assert!(trigger.should_fire(300.0, Instant::now()));
    }

    #[test]
    fn test_ignores_far_from_bottom() {
        let mut trigger = ScrollTrigger::new();
        assert!(!trigger.should_fire(2000.0, Instant::now()));
    }

    #[test]
    fn test_cooldown_window() {
        let mut trigger = ScrollTrigger::new();
        let start = Instant::now();

        assert!(trigger.should_fire(100.0, start));
        assert!(!trigger.should_fire(100.0, start + Duration::from_millis(50)));
        assert!(trigger.should_fire(100.0, start + Duration::from_millis(250)));
    }

    #[test]
    fn test_detached_never_fires() {
        let mut trigger = ScrollTrigger::new();
        trigger.detach();
        assert!(!trigger.should_fire(0.0, Instant::now()));

        // Reattaching starts clean, no leftover cooldown.
        trigger.attach();
        assert!(trigger.should_fire(0.0, Instant::now()));
    }
}
