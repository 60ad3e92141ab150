//! # span-relay
//!
//! HTTP relay between span agents and controllers. Agents register, poll
//! for commands and upload frames; controllers list sessions, queue
//! commands and fetch the latest frame. Neither side ever waits on the
//! other: every route answers immediately from the in-memory stores.

pub mod config;
pub mod routes;
