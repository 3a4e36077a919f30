//! Mission Control server: agent/task store, HTTP surfaces and live feed.
//!
//! | Module     | Responsibility                                             |
//! |------------|------------------------------------------------------------|
//! | `models`   | Agent, task, activity and comment types; board/stats views |
//! | `db`       | SQLite store (`MissionDb`) and its async `DbHandle`        |
//! | `roster`   | Built-in eight-agent squad used by `seed`                  |
//! | `webhooks` | Agent-facing `/agent/*` endpoints with open CORS           |
//! | `api`      | Dashboard JSON API under `/api`                            |
//! | `ws`       | WebSocket fan-out of every mutation                        |
//! | `health`   | Heartbeat staleness classification                         |
//! | `gateway`  | Chat relay to the orchestration gateway                    |
//! | `sprites`  | Sprite-sheet metadata and frame selection                  |
//! | `server`   | Router assembly and `serve` entry point                    |

pub mod api;
pub mod db;
pub mod gateway;
pub mod health;
pub mod models;
pub mod roster;
pub mod server;
pub mod sprites;
pub mod webhooks;
pub mod ws;
