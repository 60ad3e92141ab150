//! # span-agent
//!
//! Runs on the machine being controlled. Registers with a span relay,
//! publishes JPEG screen frames when something changed, and injects the
//! pointer and keyboard commands queued for it.
//!
//! Both loops recover on their own: a relay that forgets the session is
//! answered with a fresh registration, and network failures back off
//! exponentially up to a ceiling.

pub mod config;
pub mod service;
