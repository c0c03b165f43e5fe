//! kudu-exporter — the daemon's configuration and HTTP surface.
//!
//! The binary in `main.rs` wires these together with the poller crate:
//!
//! ```text
//! kudu-exporter --url http://kudu-tserver:8050/metrics --port 9098
//! ```

pub mod config;
pub mod server;

pub use config::{Cli, Config, FileConfig};
pub use server::{AppState, build_router};
