use serde::{Deserialize, Serialize};

use super::projection::ScreenPoint;

pub const ZOOM_MIN: f64 = 0.3;
pub const ZOOM_MAX: f64 = 2.0;
pub const ZOOM_STEP: f64 = 1.1;
pub const DEFAULT_ZOOM: f64 = 0.8;

/// Pan/zoom state for a viewport onto the world.
///
/// World pixels map to the viewport as
/// `viewport_center + offset + world * zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: f64,
}

impl Camera {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            viewport_width,
            viewport_height,
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: DEFAULT_ZOOM,
        }
    }

    /// Drag by a screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Scroll-wheel zoom: scrolling down (positive delta) zooms out.
    pub fn wheel(&mut self, delta_y: f64) {
        let factor = if delta_y > 0.0 {
            1.0 / ZOOM_STEP
        } else {
            ZOOM_STEP
        };
        self.set_zoom(self.zoom * factor);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
    }

    pub fn world_to_screen(&self, p: ScreenPoint) -> ScreenPoint {
        ScreenPoint {
            x: self.viewport_width / 2.0 + self.offset_x + p.x * self.zoom,
            y: self.viewport_height / 2.0 + self.offset_y + p.y * self.zoom,
        }
    }

    pub fn screen_to_world(&self, p: ScreenPoint) -> ScreenPoint {
        ScreenPoint {
            x: (p.x - self.viewport_width / 2.0 - self.offset_x) / self.zoom,
            y: (p.y - self.viewport_height / 2.0 - self.offset_y) / self.zoom,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}
