//! Asset types and type-erased load requests.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{DecodeError, LoadError};

/// A type-erased loaded asset.
pub type AnyAsset = Arc<dyn Any + Send + Sync>;

/// A type that can be produced by a resource backend.
///
/// Backends that deliver bytes (files, HTTP, archives) use [`from_bytes`]
/// to build the requested type. Backends holding typed values return them
/// directly and never call it.
///
/// [`from_bytes`]: Asset::from_bytes
pub trait Asset: Any + Send + Sync + Sized {
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError>;
}

impl Asset for Vec<u8> {
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(bytes.to_vec())
    }
}

impl Asset for String {
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        String::from_utf8(bytes.to_vec()).map_err(DecodeError::new)
    }
}

macro_rules! impl_text_asset {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Asset for $ty {
                fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                    let text = std::str::from_utf8(bytes).map_err(DecodeError::new)?;
                    text.trim().parse::<$ty>().map_err(DecodeError::new)
                }
            }
        )*
    };
}

impl_text_asset!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

type DecodeFn = fn(&[u8]) -> Result<AnyAsset, LoadError>;

/// A request handed to a backend: the backend path plus the requested type.
#[derive(Clone)]
pub struct AssetRequest {
    path: String,
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
}

impl AssetRequest {
    pub fn new<T: Asset>(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            decode: decode_as::<T>,
        }
    }

    /// Backend-specific path (the part after `prefix://`).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Decodes raw bytes into the requested type.
    pub fn decode(&self, bytes: &[u8]) -> Result<AnyAsset, LoadError> {
        (self.decode)(bytes)
    }
}

impl std::fmt::Debug for AssetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRequest")
            .field("path", &self.path)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn decode_as<T: Asset>(bytes: &[u8]) -> Result<AnyAsset, LoadError> {
    T::from_bytes(bytes)
        .map(|asset| Arc::new(asset) as AnyAsset)
        .map_err(|err| LoadError::Decode {
            type_name: std::any::type_name::<T>(),
            reason: err.0,
        })
}

/// Recovers the concrete type of a cached asset.
pub fn downcast<T: Asset>(asset: AnyAsset) -> Result<Arc<T>, LoadError> {
    asset.downcast::<T>().map_err(|_| LoadError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}
