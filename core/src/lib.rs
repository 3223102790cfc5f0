//! # RedLilium Core
//!
//! Core crate for RedLilium basic utilities shared by the resource engine.

pub mod compute;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
