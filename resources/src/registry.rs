use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::Backend;
use crate::backends::MemoryBackend;
use crate::error::ResourceError;
use crate::path::{DEFAULT_PREFIX, ResourcePath, normalize_prefix};

/// Prefixes with a well-known backend that must be enabled explicitly,
/// paired with that backend's name.
const OPTIONAL_BACKENDS: &[(&str, &str)] = &[
    ("file", "filesystem"),
    ("http", "http"),
    ("https", "http"),
    ("bundle", "archive"),
    ("pkg", "package"),
];

/// Maps path prefixes to backends.
///
/// The default prefix always resolves: a fresh registry serves it from an
/// empty [`MemoryBackend`] until another default is registered.
pub struct ProviderRegistry {
    backends: HashMap<String, Rc<dyn Backend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let mut backends: HashMap<String, Rc<dyn Backend>> = HashMap::new();
        backends.insert(DEFAULT_PREFIX.to_string(), Rc::new(MemoryBackend::new()));
        Self { backends }
    }

    /// Registers `backend` under `prefix`, returning the backend it replaced.
    pub fn register(
        &mut self,
        prefix: &str,
        backend: impl Backend,
    ) -> Option<Rc<dyn Backend>> {
        self.register_shared(prefix, Rc::new(backend))
    }

    /// Registers an already shared backend, e.g. one instance for both
    /// `http` and `https`.
    pub fn register_shared(
        &mut self,
        prefix: &str,
        backend: Rc<dyn Backend>,
    ) -> Option<Rc<dyn Backend>> {
        let prefix = normalize_prefix(prefix);
        log::info!("Registered {} backend for `{prefix}://`", backend.name());
        self.backends.insert(prefix, backend)
    }

    pub fn register_default(&mut self, backend: impl Backend) -> Option<Rc<dyn Backend>> {
        self.register(DEFAULT_PREFIX, backend)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.backends.contains_key(&normalize_prefix(prefix))
    }

    pub fn resolve(&self, prefix: &str) -> Result<Rc<dyn Backend>, ResourceError> {
        let prefix = normalize_prefix(prefix);
        if let Some(backend) = self.backends.get(&prefix) {
            return Ok(backend.clone());
        }
        match OPTIONAL_BACKENDS.iter().find(|(p, _)| *p == prefix) {
            Some(&(_, backend)) => Err(ResourceError::BackendNotEnabled { prefix, backend }),
            None => Err(ResourceError::UnknownPrefix(prefix)),
        }
    }

    pub fn resolve_path(&self, path: &ResourcePath) -> Result<Rc<dyn Backend>, ResourceError> {
        self.resolve(path.prefix())
    }

    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.backends.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// Every distinct registered backend, once each.
    pub fn backends(&self) -> Vec<Rc<dyn Backend>> {
        let mut unique: Vec<Rc<dyn Backend>> = Vec::new();
        for backend in self.backends.values() {
            if !unique.iter().any(|seen| Rc::ptr_eq(seen, backend)) {
                unique.push(backend.clone());
            }
        }
        unique
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_prefix_always_resolves() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.resolve("").unwrap().name(), "memory");
        assert!(registry.resolve(DEFAULT_PREFIX).is_ok());
    }

    #[test]
    fn register_replaces_and_normalizes() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register("MEM", MemoryBackend::new()).is_none());
        assert!(registry.contains("mem"));
        assert!(registry.register("mem", MemoryBackend::new()).is_some());
        assert_eq!(registry.prefixes(), ["mem", "res"]);
    }

    #[rstest]
    #[case("http", "http")]
    #[case("https", "http")]
    #[case("bundle", "archive")]
    #[case("file", "filesystem")]
    #[case("pkg", "package")]
    fn optional_prefix_needs_configuration(#[case] prefix: &str, #[case] expected: &str) {
        let registry = ProviderRegistry::new();
        match registry.resolve(prefix) {
            Err(ResourceError::BackendNotEnabled { backend, .. }) => assert_eq!(backend, expected),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("{prefix} should not resolve"),
        }
    }

    #[test]
    fn unknown_prefix() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.resolve("foo"),
            Err(ResourceError::UnknownPrefix(p)) if p == "foo"
        ));
    }

    #[test]
    fn shared_backend_listed_once() {
        let mut registry = ProviderRegistry::new();
        let shared: Rc<dyn Backend> = Rc::new(MemoryBackend::new());
        registry.register_shared("http", shared.clone());
        registry.register_shared("https", shared);
        assert_eq!(registry.backends().len(), 2);
    }
}
