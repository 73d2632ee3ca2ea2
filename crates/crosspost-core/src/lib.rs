//! Core domain + orchestration logic for the crosspost fan-out relay.
//!
//! This crate is intentionally framework-agnostic. Telegram / Slack / Notion
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod content;
pub mod deliver;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;
pub mod report;
pub mod resolve;
pub mod session;

pub use errors::{Error, Result};
