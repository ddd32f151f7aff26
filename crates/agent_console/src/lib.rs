//! Headless line-oriented client for agent sessions and dashboard pipelines.
//!
//! ## Configuration
//!
//! Read once at startup through `agent_link::LinkConfig::from_env`:
//!
//! - `AGENT_LINK_API_URL`: workbench REST base (default `http://127.0.0.1:8000/api`)
//! - `AGENT_LINK_CHANNEL_URL`: live channel base (default `ws://127.0.0.1:8000`)
//! - `AGENT_LINK_KEEPALIVE_SECS`, `AGENT_LINK_CONNECT_TIMEOUT_SECS` (0 disables)
//! - `AGENT_LINK_SETTLE_MS`: pipeline settle delay after each stage
//! - `AGENT_LINK_LOG`: `tracing` filter directives, else `RUST_LOG`
//!
//! Logs go to stderr; transcript and command output go to stdout.

pub mod app;
pub mod commands;
pub mod render;
