use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::asset::Asset;
use crate::path::ResourcePath;

/// Cache key: normalized prefix, backend path and requested asset type.
///
/// The same path requested as two different types yields two distinct
/// entries.
#[derive(Debug, Clone)]
pub struct ResourceKey {
    prefix: String,
    path: String,
    type_id: TypeId,
    type_name: &'static str,
}

impl ResourceKey {
    pub fn new(path: &ResourcePath, type_id: TypeId, type_name: &'static str) -> Self {
        Self {
            prefix: path.prefix().to_string(),
            path: path.path().to_string(),
            type_id,
            type_name,
        }
    }

    pub fn of<T: Asset>(path: &ResourcePath) -> Self {
        Self::new(path, TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.prefix == other.prefix && self.path == other.path
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prefix.hash(state);
        self.path.hash(state);
        self.type_id.hash(state);
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{} as {}", self.prefix, self.path, self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_is_part_of_identity() {
        let path = ResourcePath::parse("mem://a").unwrap();
        let as_int = ResourceKey::of::<i32>(&path);
        let as_text = ResourceKey::of::<String>(&path);
        assert_ne!(as_int, as_text);

        let mut set = HashSet::new();
        set.insert(as_int.clone());
        set.insert(as_text);
        set.insert(ResourceKey::of::<i32>(&path));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&as_int));
    }

    #[test]
    fn default_prefix_is_normalized_into_key() {
        let bare = ResourceKey::of::<i32>(&ResourcePath::parse("a").unwrap());
        let explicit = ResourceKey::of::<i32>(&ResourcePath::parse("res://a").unwrap());
        assert_eq!(bare, explicit);
        assert_eq!(bare.to_string(), "res://a as i32");
    }
}
