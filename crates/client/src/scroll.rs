//! Auto-scroll policy for the message list

/// Distance from the bottom, in pixels, still treated as "at the bottom"
pub const NEAR_BOTTOM_THRESHOLD: f64 = 100.0;

/// Scroll geometry sampled before an update is rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// The user's own message was appended
    UserSend,
    /// Streamed assistant text changed
    AssistantDelta,
}

#[derive(Debug, Clone, Copy)]
pub struct ScrollPolicy {
    threshold: f64,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            threshold: NEAR_BOTTOM_THRESHOLD,
        }
    }
}

impl ScrollPolicy {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_near_bottom(&self, before: &Viewport) -> bool {
        before.distance_from_bottom() <= self.threshold
    }

    /// Whether to jump to the newest message after `kind`
    pub fn should_scroll(&self, kind: UpdateKind, before: &Viewport) -> bool {
        match kind {
            UpdateKind::UserSend => true,
            UpdateKind::AssistantDelta => self.is_near_bottom(before),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCROLLED_UP: Viewport = Viewport {
        scroll_top: 0.0,
        client_height: 600.0,
        scroll_height: 2000.0,
    };

    const AT_BOTTOM: Viewport = Viewport {
        scroll_top: 1350.0,
        client_height: 600.0,
        scroll_height: 2000.0,
    };

    #[test]
    fn test_user_send_always_scrolls() {
        let policy = ScrollPolicy::default();
        assert!(policy.should_scroll(UpdateKind::UserSend, &SCROLLED_UP));
        assert!(policy.should_scroll(UpdateKind::UserSend, &AT_BOTTOM));
    }

    #[test]
    fn test_delta_scrolls_only_near_bottom() {
        let policy = ScrollPolicy::default();
        assert!(policy.should_scroll(UpdateKind::AssistantDelta, &AT_BOTTOM));
        assert!(!policy.should_scroll(UpdateKind::AssistantDelta, &SCROLLED_UP));
    }

    #[test]
    fn test_threshold_edge() {
        let policy = ScrollPolicy::default();
        let edge = Viewport {
            scroll_top: 1300.0,
            ..AT_BOTTOM
        };
        assert!(policy.is_near_bottom(&edge));
        let past = Viewport {
            scroll_top: 1299.0,
            ..AT_BOTTOM
        };
        assert!(!policy.is_near_bottom(&past));
        assert!(ScrollPolicy::with_threshold(200.0).is_near_bottom(&past));
    }
}
