//! End-to-end tests across the plugin host and the dense cache.

mod analysis;
mod helpers;
mod plugin_host;
