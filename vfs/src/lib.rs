//! Byte-level resource sources for the RedLilium resource engine.
//!
//! Providers implement the [`VfsProvider`] trait and only move bytes; typed
//! decoding, caching and reference counting live in `redlilium-resources`.
//!
//! # Providers
//!
//! - [`MemoryProvider`]: In-memory storage for tests and embedded assets
//! - [`FileSystemProvider`]: Native filesystem access (native only)
//! - [`HttpProvider`]: Remote HTTP(S) downloads with progress (requires `http` feature)
//!
//! All operations return boxed futures ([`VfsFuture`]) so that slow sources
//! can suspend a cooperative task instead of blocking the frame.

mod error;
#[cfg(all(feature = "filesystem", not(target_arch = "wasm32")))]
mod filesystem;
#[cfg(all(feature = "http", not(target_arch = "wasm32")))]
mod http;
mod memory;
pub mod path;
mod provider;
#[cfg(test)]
mod test_util;

pub use error::VfsError;
#[cfg(all(feature = "filesystem", not(target_arch = "wasm32")))]
pub use filesystem::FileSystemProvider;
#[cfg(all(feature = "http", not(target_arch = "wasm32")))]
pub use http::{HttpConfig, HttpProvider};
pub use memory::MemoryProvider;
pub use provider::{VfsFuture, VfsProvider};
