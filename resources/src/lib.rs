//! Reference-counted resource loading and caching for RedLilium.
//!
//! Resources are addressed by logical paths such as `mem://a`,
//! `file://textures/wall.png` or `bundle://level1/hero.mesh`. The prefix
//! selects a [`Backend`]; the [`Resources`] cache keeps one entry per path
//! and requested type, shares in-flight loads between callers, and counts
//! references so that assets are released exactly once when unused.
//!
//! # Backends
//!
//! - [`MemoryBackend`]: typed values and raw bytes held in memory
//! - [`VfsBackend`]: bytes from any [`VfsProvider`](redlilium_vfs::VfsProvider),
//!   e.g. the filesystem or HTTP
//! - [`ArchiveBackend`]: bundles with declared dependencies
//!
//! # Scheduling
//!
//! Asynchronous loads are cooperative tasks on the thread that owns the
//! cache. They advance only when the host calls [`Resources::tick`].

pub mod archive;
mod asset;
mod backend;
mod backends;
mod cache;
pub mod config;
mod error;
mod handle;
mod key;
mod path;
mod registry;
mod resources;

pub use archive::ArchiveBackend;
pub use asset::{AnyAsset, Asset, AssetRequest, downcast};
pub use backend::{Backend, LoadFuture};
pub use backends::{MemoryBackend, VfsBackend};
pub use cache::{CacheEntry, CacheTable, EntryState, EntryStatus, PendingLoad};
pub use config::{CacheConfig, ConfigError, ResourcesConfig, SyncConflictPolicy};
pub use error::{DecodeError, LoadError, PathError, ResourceError};
pub use handle::{BatchHandle, BatchResults, LoadHandle};
pub use key::ResourceKey;
pub use path::{DEFAULT_PREFIX, ResourcePath, split_node_asset};
pub use registry::ProviderRegistry;
pub use resources::Resources;
