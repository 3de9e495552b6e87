//! Core domain + application logic for railwatch.
//!
//! This crate is intentionally framework-agnostic. The messaging channel and the
//! departure-board provider live behind ports (traits) implemented in adapter
//! crates.

pub mod board;
pub mod bounded;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod retry;
pub mod store;
pub mod subscription;

pub use errors::{Error, Result};
