//! Utilities shared across Agora packages.

pub mod logger;
pub mod time;
