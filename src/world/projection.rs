use serde::{Deserialize, Serialize};

/// Width of one diamond tile in pixels.
pub const TILE_WIDTH: f64 = 64.0;
/// Height of one diamond tile in pixels.
pub const TILE_HEIGHT: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Center of tile `(x, y)` in world pixels, with tile `(0, 0)` at the origin.
pub fn grid_to_screen(x: f64, y: f64) -> ScreenPoint {
    ScreenPoint {
        x: (x - y) * TILE_WIDTH / 2.0,
        y: (x + y) * TILE_HEIGHT / 2.0,
    }
}

/// Inverse of [`grid_to_screen`]; returns fractional grid coordinates.
pub fn screen_to_grid(p: ScreenPoint) -> (f64, f64) {
    let gx = p.x / TILE_WIDTH + p.y / TILE_HEIGHT;
    let gy = p.y / TILE_HEIGHT - p.x / TILE_WIDTH;
    (gx, gy)
}

/// Tile under a world-pixel point, if it lies on a `size`×`size` grid.
pub fn tile_at(p: ScreenPoint, size: usize) -> Option<(usize, usize)> {
    let (gx, gy) = screen_to_grid(p);
    let (tx, ty) = (gx.round(), gy.round());
    if tx < 0.0 || ty < 0.0 || tx >= size as f64 || ty >= size as f64 {
        return None;
    }
    Some((tx as usize, ty as usize))
}

/// Painter's-algorithm depth: tiles further down-screen draw later.
pub fn depth(x: usize, y: usize) -> usize {
    x + y
}
