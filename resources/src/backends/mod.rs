//! Built-in backends.

mod memory;
mod vfs_backend;

pub use memory::MemoryBackend;
pub use vfs_backend::VfsBackend;
