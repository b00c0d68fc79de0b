//! CLI command implementations

pub mod check_config;
pub mod cleanup;
pub mod daemon;
pub mod failed;
pub mod health;
pub mod runs;
pub mod status;
pub mod sync;
