//! Shared types for the kaiga daemon and its clients: the station catalog,
//! the session snapshot and wire protocol, the WordPress content model and
//! client, configuration and platform paths.

pub mod config;
pub mod content;
pub mod platform;
pub mod protocol;
pub mod station;
pub mod wordpress;
