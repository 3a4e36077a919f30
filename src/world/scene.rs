use serde::{Deserialize, Serialize};

use super::projection::{ScreenPoint, TILE_HEIGHT, TILE_WIDTH, depth, grid_to_screen};
use super::tiles::{Footprint, Tile, TileGrid, TileKind};
use crate::control::models::{Agent, AgentStatus};

/// Agents stand on a ring this many tiles from the center.
pub const AGENT_RING_RADIUS: f64 = 5.0;
/// Markers float this many pixels above their tile.
pub const MARKER_LIFT: f64 = 40.0;
pub const DEFAULT_MARKER_COLOR: &str = "#f97316";
pub const DEFAULT_MARKER_EMOJI: &str = "\u{1F916}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMarker {
    pub agent_id: i64,
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub status: AgentStatus,
    pub x: usize,
    pub y: usize,
    /// Working agents get a halo.
    pub glow: bool,
}

/// One entry of the draw list, in the order it must be painted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum DrawItem {
    Ground {
        x: usize,
        y: usize,
        kind: TileKind,
        at: ScreenPoint,
    },
    Building {
        x: usize,
        y: usize,
        kind: TileKind,
        footprint: Footprint,
        at: ScreenPoint,
    },
    Agent {
        marker: AgentMarker,
        at: ScreenPoint,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub seed: u64,
    pub grid_size: usize,
    pub tile_width: f64,
    pub tile_height: f64,
    pub agents: Vec<AgentMarker>,
    pub draw_list: Vec<DrawItem>,
}

/// Spread agents evenly around the center of a `size`×`size` grid.
pub fn place_agents(agents: &[Agent], size: usize) -> Vec<AgentMarker> {
    let center = (size / 2) as f64;
    let n = agents.len() as f64;
    agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let angle = i as f64 / n * std::f64::consts::TAU;
            let x = (center + angle.cos() * AGENT_RING_RADIUS).floor().max(0.0) as usize;
            let y = (center + angle.sin() * AGENT_RING_RADIUS).floor().max(0.0) as usize;
            AgentMarker {
                agent_id: agent.id,
                name: agent.name.clone(),
                emoji: agent
                    .emoji
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MARKER_EMOJI.to_string()),
                color: agent
                    .color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MARKER_COLOR.to_string()),
                status: agent.status,
                x: x.min(size.saturating_sub(1)),
                y: y.min(size.saturating_sub(1)),
                glow: agent.status == AgentStatus::Working,
            }
        })
        .collect()
}

/// Depth of a building's front corner, so multi-tile footprints draw after
/// every tile they overlap.
fn building_depth(tile: &Tile) -> usize {
    let fp = tile.kind.footprint();
    depth(tile.x, tile.y) + (fp.width as usize - 1) + (fp.height as usize - 1)
}

/// Build the draw list: all ground tiles back to front, then buildings and
/// agent markers back to front, with markers after buildings at equal depth.
pub fn build_scene(grid: &TileGrid, agents: &[Agent], seed: u64) -> Scene {
    let markers = place_agents(agents, grid.size);

    let mut ground: Vec<&Tile> = grid.tiles.iter().collect();
    ground.sort_by_key(|t| (depth(t.x, t.y), t.x));

    let mut draw_list: Vec<DrawItem> = ground
        .iter()
        .map(|t| DrawItem::Ground {
            x: t.x,
            y: t.y,
            kind: if t.kind == TileKind::Water {
                TileKind::Water
            } else {
                TileKind::Grass
            },
            at: grid_to_screen(t.x as f64, t.y as f64),
        })
        .collect();

    // (depth, layer, x) where buildings are layer 0 and agents layer 1.
    let mut sprites: Vec<((usize, u8, usize), DrawItem)> = Vec::new();
    for t in grid.tiles.iter().filter(|t| t.kind.is_building()) {
        sprites.push((
            (building_depth(t), 0, t.x),
            DrawItem::Building {
                x: t.x,
                y: t.y,
                kind: t.kind,
                footprint: t.kind.footprint(),
                at: grid_to_screen(t.x as f64, t.y as f64),
            },
        ));
    }
    for m in &markers {
        let base = grid_to_screen(m.x as f64, m.y as f64);
        sprites.push((
            (depth(m.x, m.y), 1, m.x),
            DrawItem::Agent {
                marker: m.clone(),
                at: ScreenPoint {
                    x: base.x,
                    y: base.y - MARKER_LIFT,
                },
            },
        ));
    }
    sprites.sort_by_key(|(key, _)| *key);
    draw_list.extend(sprites.into_iter().map(|(_, item)| item));

    Scene {
        seed,
        grid_size: grid.size,
        tile_width: TILE_WIDTH,
        tile_height: TILE_HEIGHT,
        agents: markers,
        draw_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::models::AgentLevel;
    use crate::world::tiles::GRID_SIZE;

    fn agent(id: i64, status: AgentStatus) -> Agent {
        Agent {
            id,
            name: format!("agent-{}", id),
            role: "Developer".into(),
            anime: None,
            emoji: None,
            avatar_url: None,
            level: AgentLevel::Specialist,
            status,
            current_task: None,
            color: Some("#3b82f6".into()),
            session_key: None,
            last_heartbeat: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_place_agents_on_ring() {
        let agents: Vec<Agent> = (1..=4).map(|i| agent(i, AgentStatus::Idle)).collect();
        let markers = place_agents(&agents, GRID_SIZE);
        let coords: Vec<(usize, usize)> = markers.iter().map(|m| (m.x, m.y)).collect();
        // Angles 0, 90, 180, 270 degrees around (12, 12); floor() biases
        // the sin/cos rounding noise downward.
        assert_eq!(coords[0], (17, 12));
        assert_eq!(coords[1].0, 12);
        assert_eq!(coords[1].1, 17);
        assert_eq!(coords[2].0, 7);
        assert_eq!(coords[3].1, 7);
        assert_eq!(markers[0].emoji, DEFAULT_MARKER_EMOJI);
        assert_eq!(markers[0].color, "#3b82f6");
    }

    #[test]
    fn test_working_agents_glow() {
        let markers = place_agents(
            &[agent(1, AgentStatus::Working), agent(2, AgentStatus::Blocked)],
            GRID_SIZE,
        );
        assert!(markers[0].glow);
        assert!(!markers[1].glow);
    }

    #[test]
    fn test_no_agents() {
        assert!(place_agents(&[], GRID_SIZE).is_empty());
    }

    #[test]
    fn test_draw_list_order() {
        let grid = TileGrid::seeded(3);
        let agents: Vec<Agent> = (1..=8).map(|i| agent(i, AgentStatus::Working)).collect();
        let scene = build_scene(&grid, &agents, 3);

        let n_tiles = GRID_SIZE * GRID_SIZE;
        let n_buildings = grid.tiles.iter().filter(|t| t.kind.is_building()).count();
        assert_eq!(scene.draw_list.len(), n_tiles + n_buildings + 8);

        // Ground first, non-decreasing depth.
        let mut last = (0, 0);
        for item in &scene.draw_list[..n_tiles] {
            match item {
                DrawItem::Ground { x, y, .. } => {
                    let key = (x + y, *x);
                    assert!(key >= last);
                    last = key;
                }
                other => panic!("Expected ground tile, got {:?}", other),
            }
        }

        // Sprites sorted by (depth, layer).
        let mut last = (0, 0);
        for item in &scene.draw_list[n_tiles..] {
            let key = match item {
                DrawItem::Building { x, y, footprint, .. } => (
                    x + y + footprint.width as usize - 1 + footprint.height as usize - 1,
                    0,
                ),
                DrawItem::Agent { marker, .. } => (marker.x + marker.y, 1),
                other => panic!("Unexpected ground tile in sprites: {:?}", other),
            };
            assert!(key >= last, "{:?} before {:?}", last, key);
            last = key;
        }
    }

    #[test]
    fn test_agent_marker_is_lifted() {
        let grid = TileGrid::seeded(1);
        let scene = build_scene(&grid, &[agent(1, AgentStatus::Idle)], 1);
        let at = scene
            .draw_list
            .iter()
            .find_map(|item| match item {
                DrawItem::Agent { at, .. } => Some(*at),
                _ => None,
            })
            .unwrap();
        let base = grid_to_screen(17.0, 12.0);
        assert_eq!(at.x, base.x);
        assert_eq!(at.y, base.y - MARKER_LIFT);
    }
}
