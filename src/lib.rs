//! CalorieQuest: nearby fast food by calories and distance.
//!
//! The location subsystem resolves where the user is through a tiered
//! fallback chain; the search subsystem queries the restaurant backend
//! around that point.

pub mod config;
pub mod location;
pub mod logging;
pub mod search;
pub mod server;
