//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled   |
//! |------------|--------------------|
//! | `serve`    | `Serve`            |
//! | `db`       | `InitDb`, `Seed`   |
//! | `simulate` | `Simulate`         |
//! | `config`   | `Config`           |

pub mod config;
pub mod db;
pub mod serve;
pub mod simulate;

pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_seed};
pub use serve::cmd_serve;
pub use simulate::cmd_simulate;
