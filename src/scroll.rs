//! Scroll-proximity triggering for infinite lists

use serde::{Deserialize, Serialize};

/// Something that scrolls: the document or a scrollable element
pub trait ScrollTarget: Send {
    /// Current vertical scroll offset
    fn scroll_top(&self) -> f64;

    fn set_scroll_top(&mut self, scroll_top: f64);

    /// Full height of the scrollable content
    fn scroll_height(&self) -> f64;

    /// Rendered height of the target
    fn offset_height(&self) -> f64;

    /// Height of the visible viewport
    fn viewport_height(&self) -> f64;
}

/// Direction in which the list grows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// New pages appear at the bottom
    #[default]
    Down,
    /// New pages appear at the top (chat-style history)
    Up,
}

/// Scroll trigger options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrollOptions {
    pub direction: ScrollDirection,
    /// Distance from the growing edge, in pixels, at which the next page loads
    pub trigger_distance: f64,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            direction: ScrollDirection::Down,
            trigger_distance: 200.0,
        }
    }
}

impl ScrollOptions {
    /// Whether the target is inside the trigger zone of the growing edge
    pub fn in_trigger_zone<S: ScrollTarget + ?Sized>(&self, target: &S) -> bool {
        match self.direction {
            ScrollDirection::Down => {
                target.scroll_top() + target.viewport_height() + self.trigger_distance
                    > target.offset_height()
            }
            ScrollDirection::Up => target.scroll_top() < self.trigger_distance,
        }
    }

    /// Offset a reverse list is pushed to after a fetch left it in the trigger zone
    pub fn rest_position(&self) -> f64 {
        self.trigger_distance + 10.0
    }
}
