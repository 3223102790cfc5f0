use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Leading bytes of every bundle file.
const MAGIC: &[u8; 4] = b"RLBN";

/// Error reading or writing a bundle file.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("not a bundle file")]
    BadMagic,
    #[error("bundle encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// A named set of asset blobs stored in one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleArchive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl BundleArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), bytes.into());
    }

    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
        let body = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
        let body = bytes.strip_prefix(MAGIC).ok_or(BundleError::BadMagic)?;
        Ok(bincode::deserialize(body)?)
    }
}
