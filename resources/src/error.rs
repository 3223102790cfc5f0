//! Error types for resource loading.
//!
//! Parse and registry errors surface immediately to the caller. Backend
//! failures are ordinary values ([`LoadError`]) because missing assets are
//! an expected runtime condition. Usage defects (refcount underflow, orphaned
//! entries) are logged and never returned.

use redlilium_vfs::VfsError;
use thiserror::Error;

/// Malformed logical path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty resource path")]
    Empty,
    #[error("missing prefix before `://` in {0:?}")]
    EmptyPrefix(String),
    #[error("resource path {0:?} starts with `:`")]
    LeadingColon(String),
    #[error("invalid prefix {prefix:?} in {path:?}")]
    InvalidPrefix { prefix: String, path: String },
    #[error("nothing after the prefix in {0:?}")]
    EmptyPayload(String),
    #[error("{0:?} must have the form `node/asset` without leading or trailing `/`")]
    NodeAsset(String),
    #[error("invalid backend path {path:?}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Failure reported by a backend, or by the coordinator on a backend's behalf.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed to decode as {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(String),
    #[error("cached asset is not a {expected}")]
    TypeMismatch { expected: &'static str },
    #[error("a load for this resource is already in flight")]
    Busy,
    #[error("manifest error: {0}")]
    Manifest(String),
    #[error("dependency {dependency:?} of bundle {bundle:?} failed: {reason}")]
    Dependency {
        bundle: String,
        dependency: String,
        reason: String,
    },
    #[error("invalid bundle {bundle:?}: {reason}")]
    Bundle { bundle: String, reason: String },
    #[error("the pending load was dropped before it completed")]
    Abandoned,
}

impl LoadError {
    /// Whether the failure means "the asset does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound(_))
    }
}

impl From<VfsError> for LoadError {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::NotFound(path) => LoadError::NotFound(path),
            VfsError::InvalidPath(reason) => LoadError::NotFound(reason),
            other => LoadError::Io(other.to_string()),
        }
    }
}

/// Error returned by the public [`Resources`](crate::Resources) API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("unknown resource prefix `{0}`")]
    UnknownPrefix(String),
    #[error(
        "no backend registered for prefix `{prefix}`: enable backend `{backend}` in configuration"
    )]
    BackendNotEnabled {
        prefix: String,
        backend: &'static str,
    },
    #[error("failed to load {path}: {source}")]
    Load { path: String, source: LoadError },
}

impl ResourceError {
    /// The backend failure, if this is a load error.
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            ResourceError::Load { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error produced when decoding bytes into an asset type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}
