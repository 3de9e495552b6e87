//! Inbound messaging channel (subscription commands arrive here).

pub mod port;
pub mod types;
