//! # span-viewer
//!
//! Headless controller for span. Lists the sessions a relay knows about,
//! or attaches to one: the latest frame is written to a JPEG file each
//! time it changes, and console lines become pointer, keyboard and
//! gesture commands for the agent.

pub mod config;
pub mod console;
pub mod surface;
