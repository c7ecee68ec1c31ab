//! Command implementations

pub mod add_agent;
pub mod create_plane;
pub mod remove_agent;
pub mod status;
pub mod watch;
