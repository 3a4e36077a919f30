//! Sprite-sheet metadata and frame selection for agent avatars.
//!
//! Each avatar ships `<name>.json` next to its sheet image. Animations are
//! rows of equally sized frames; the frame to show is a pure function of the
//! elapsed time, so the server can tell any client exactly which rectangle
//! to blit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::AgentStatus;

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("Invalid sprite name: {0}")]
    InvalidName(String),

    #[error("Sprite {0} not found")]
    NotFound(String),

    #[error("Failed to parse sprite metadata {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read sprite metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown animation: {0}")]
    UnknownAnimation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteAnimation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub row: u32,
    pub frames: u32,
    pub fps: u32,
    #[serde(rename = "loop")]
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteMetadata {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub description: String,
    pub sprite_sheet: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub animations: HashMap<String, SpriteAnimation>,
    #[serde(default = "default_animation")]
    pub default_animation: String,
    #[serde(default)]
    pub status_animation_map: HashMap<String, String>,
}

fn default_animation() -> String {
    "idle".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSelection {
    pub animation: String,
    pub frame: u32,
    /// True once a non-looping animation has reached its last frame.
    pub finished: bool,
    pub sprite_sheet: String,
    pub rect: SourceRect,
}

impl SpriteAnimation {
    /// Frame index after `elapsed_ms` of playback. Looping animations wrap;
    /// one-shot animations hold the last frame.
    pub fn frame_at(&self, elapsed_ms: u64) -> (u32, bool) {
        if self.frames == 0 {
            return (0, true);
        }
        let advanced = elapsed_ms.saturating_mul(u64::from(self.fps)) / 1000;
        let frames = u64::from(self.frames);
        if self.looping {
            ((advanced % frames) as u32, false)
        } else {
            // Finished only once playback tries to step past the last frame.
            let frame = advanced.min(frames - 1) as u32;
            (frame, advanced >= frames)
        }
    }
}

impl SpriteMetadata {
    /// Animation key for a request: explicit name, else the status mapping,
    /// else the default animation.
    pub fn animation_key(&self, explicit: Option<&str>, status: Option<AgentStatus>) -> String {
        if let Some(name) = explicit.filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        status
            .and_then(|s| self.status_animation_map.get(s.as_str()))
            .cloned()
            .unwrap_or_else(|| self.default_animation.clone())
    }

    pub fn source_rect(&self, animation: &SpriteAnimation, frame: u32) -> SourceRect {
        SourceRect {
            x: frame * self.frame_width,
            y: animation.row * self.frame_height,
            width: self.frame_width,
            height: self.frame_height,
        }
    }

    pub fn select_frame(
        &self,
        explicit: Option<&str>,
        status: Option<AgentStatus>,
        elapsed_ms: u64,
    ) -> Result<FrameSelection, SpriteError> {
        let key = self.animation_key(explicit, status);
        let animation = self
            .animations
            .get(&key)
            .ok_or_else(|| SpriteError::UnknownAnimation(key.clone()))?;
        let (frame, finished) = animation.frame_at(elapsed_ms);
        Ok(FrameSelection {
            rect: self.source_rect(animation, frame),
            animation: key,
            frame,
            finished,
            sprite_sheet: self.sprite_sheet.clone(),
        })
    }
}

/// Sprite names are file stems; anything else could escape the directory.
fn validate_name(name: &str) -> Result<(), SpriteError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SpriteError::InvalidName(name.to_string()))
    }
}

pub fn load_metadata(dir: &Path, name: &str) -> Result<SpriteMetadata, SpriteError> {
    validate_name(name)?;
    let path = dir.join(format!("{}.json", name));
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SpriteError::NotFound(name.to_string()));
        }
        Err(source) => return Err(SpriteError::Io { path, source }),
    };
    serde_json::from_str(&content).map_err(|source| SpriteError::Parse { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRANKY: &str = r#"{
        "name": "franky",
        "displayName": "Franky",
        "character": "Franky",
        "description": "Cyborg shipwright",
        "spriteSheet": "/sprites/franky-sheet.png",
        "frameWidth": 64,
        "frameHeight": 64,
        "animations": {
            "idle": {"name": "idle", "description": "breathing", "row": 0, "frames": 4, "fps": 4, "loop": true},
            "working": {"name": "working", "description": "hammering", "row": 1, "frames": 6, "fps": 8, "loop": true},
            "celebrate": {"name": "celebrate", "description": "SUPER", "row": 2, "frames": 5, "fps": 10, "loop": false}
        },
        "defaultAnimation": "idle",
        "statusAnimationMap": {"idle": "idle", "working": "working", "done": "celebrate"}
    }"#;

    fn franky() -> SpriteMetadata {
        serde_json::from_str(FRANKY).unwrap()
    }

    #[test]
    fn test_looping_animation_wraps() {
        let meta = franky();
        let working = &meta.animations["working"];
        assert_eq!(working.frame_at(0), (0, false));
        assert_eq!(working.frame_at(125), (1, false));
        // 6 frames at 8 fps: 750ms is exactly one full cycle.
        assert_eq!(working.frame_at(750), (0, false));
        assert_eq!(working.frame_at(999), (1, false));
    }

    #[test]
    fn test_one_shot_animation_clamps() {
        let meta = franky();
        let celebrate = &meta.animations["celebrate"];
        assert_eq!(celebrate.frame_at(300), (3, false));
        // Showing the last frame is not the end; stepping past it is.
        assert_eq!(celebrate.frame_at(400), (4, false));
        assert_eq!(celebrate.frame_at(499), (4, false));
        assert_eq!(celebrate.frame_at(500), (4, true));
        assert_eq!(celebrate.frame_at(10_000), (4, true));
    }

    #[test]
    fn test_animation_resolution_order() {
        let meta = franky();
        assert_eq!(meta.animation_key(Some("celebrate"), Some(AgentStatus::Idle)), "celebrate");
        assert_eq!(meta.animation_key(None, Some(AgentStatus::Working)), "working");
        // Blocked has no mapping and falls back to the default.
        assert_eq!(meta.animation_key(None, Some(AgentStatus::Blocked)), "idle");
        assert_eq!(meta.animation_key(Some(""), None), "idle");
    }

    #[test]
    fn test_select_frame_rect() {
        let meta = franky();
        let sel = meta
            .select_frame(None, Some(AgentStatus::Working), 250)
            .unwrap();
        assert_eq!(sel.animation, "working");
        assert_eq!(sel.frame, 2);
        assert_eq!(
            sel.rect,
            SourceRect {
                x: 128,
                y: 64,
                width: 64,
                height: 64
            }
        );
        assert_eq!(sel.sprite_sheet, "/sprites/franky-sheet.png");
    }

    #[test]
    fn test_select_unknown_animation() {
        let meta = franky();
        assert!(matches!(
            meta.select_frame(Some("dance"), None, 0),
            Err(SpriteError::UnknownAnimation(a)) if a == "dance"
        ));
    }

    #[test]
    fn test_zero_frame_animation() {
        let anim = SpriteAnimation {
            name: String::new(),
            description: String::new(),
            row: 0,
            frames: 0,
            fps: 10,
            looping: true,
        };
        assert_eq!(anim.frame_at(500), (0, true));
    }

    #[test]
    fn test_load_metadata_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("franky.json"), FRANKY).unwrap();
        let meta = load_metadata(dir.path(), "franky").unwrap();
        assert_eq!(meta.display_name, "Franky");
        assert!(matches!(
            load_metadata(dir.path(), "robin"),
            Err(SpriteError::NotFound(_))
        ));
        assert!(matches!(
            load_metadata(dir.path(), "../etc/passwd"),
            Err(SpriteError::InvalidName(_))
        ));
    }

    #[test]
    fn test_load_metadata_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert!(matches!(
            load_metadata(dir.path(), "broken"),
            Err(SpriteError::Parse { .. })
        ));
    }
}
