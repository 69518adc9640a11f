//! Core domain types and port definitions for xraytun.
//!
//! This crate contains no OS or process concerns. It defines the trait
//! boundaries (ports) through which the runtime reaches the bundled
//! proxy engine and the native tunnel library, the preference snapshot
//! that drives a session, and the events a session emits.

pub mod commands;
pub mod events;
pub mod paths;
pub mod ports;
pub mod prefs;
