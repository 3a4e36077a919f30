//! Decorative isometric town shown behind the squad.
//!
//! The world is generated on demand from a seed and never stored. The
//! server computes the layout and the painter's-order draw list; clients
//! only blit.
//!
//! | Module       | Responsibility                                         |
//! |--------------|--------------------------------------------------------|
//! | `tiles`      | `TileGrid` generation, tile kinds, building footprints |
//! | `projection` | Grid ↔ screen diamond projection, depth key            |
//! | `camera`     | Pan/zoom viewport transform                            |
//! | `scene`      | Agent ring placement and the ordered draw list         |

pub mod camera;
pub mod projection;
pub mod scene;
pub mod tiles;

use serde::Serialize;

pub use camera::Camera;
pub use projection::ScreenPoint;
pub use scene::{Scene, build_scene};
pub use tiles::{Tile, TileGrid};

/// Hit-test result for a viewport click.
#[derive(Debug, Clone, Serialize)]
pub struct Pick {
    pub seed: u64,
    /// Zoom after clamping.
    pub zoom: f64,
    pub world: ScreenPoint,
    pub tile: Option<Tile>,
}

/// Generate the world for `seed` and lay out the given agents on it.
pub fn render(seed: u64, agents: &[crate::control::models::Agent]) -> Scene {
    build_scene(&TileGrid::seeded(seed), agents, seed)
}

/// Tile under a viewport point for the world generated from `seed`.
pub fn pick(seed: u64, camera: &Camera, screen: ScreenPoint) -> Pick {
    let grid = TileGrid::seeded(seed);
    let world = camera.screen_to_world(screen);
    let tile = projection::tile_at(world, grid.size).and_then(|(x, y)| grid.get(x, y).copied());
    Pick {
        seed,
        zoom: camera.zoom,
        world,
        tile,
    }
}
