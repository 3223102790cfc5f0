use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::MANIFEST_NODE;
use crate::error::LoadError;

/// Declared bundles and their dependencies.
///
/// ```toml
/// [[bundle]]
/// name = "shared"
///
/// [[bundle]]
/// name = "level1"
/// file = "levels/level1.bundle"
/// dependencies = ["shared"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "bundle")]
    pub bundles: Vec<BundleDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleDecl {
    pub name: String,
    /// File relative to the archive source. Defaults to `<name>.bundle`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl BundleDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn file_name(&self) -> String {
        match &self.file {
            Some(file) => file.clone(),
            None => format!("{}.bundle", self.name),
        }
    }
}

impl Manifest {
    /// Parses and validates a manifest.
    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        let manifest: Manifest =
            toml::from_str(text).map_err(|e| LoadError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_toml_string(&self) -> Result<String, LoadError> {
        toml::to_string(self).map_err(|e| LoadError::Manifest(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&BundleDecl> {
        self.bundles.iter().find(|b| b.name == name)
    }

    /// Names `bundle` needs open, dependencies before dependents, ending
    /// with `bundle` itself.
    pub fn dependency_order(&self, bundle: &str) -> Result<Vec<String>, LoadError> {
        let index: HashMap<&str, &BundleDecl> =
            self.bundles.iter().map(|b| (b.name.as_str(), b)).collect();
        if !index.contains_key(bundle) {
            return Err(LoadError::NotFound(format!("bundle {bundle:?}")));
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        visit(bundle, &index, &mut visited, &mut order);
        Ok(order)
    }

    /// Checks names are unique, dependencies are declared and acyclic.
    pub fn validate(&self) -> Result<(), LoadError> {
        let mut index: HashMap<&str, &BundleDecl> = HashMap::new();
        for bundle in &self.bundles {
            if bundle.name.is_empty() || bundle.name.contains('/') {
                return Err(LoadError::Manifest(format!(
                    "invalid bundle name {:?}",
                    bundle.name
                )));
            }
            if bundle.name == MANIFEST_NODE {
                return Err(LoadError::Manifest(format!(
                    "bundle name {MANIFEST_NODE:?} is reserved"
                )));
            }
            if index.insert(&bundle.name, bundle).is_some() {
                return Err(LoadError::Manifest(format!(
                    "bundle {:?} declared twice",
                    bundle.name
                )));
            }
        }

        for bundle in &self.bundles {
            for dep in &bundle.dependencies {
                if !index.contains_key(dep.as_str()) {
                    return Err(LoadError::Manifest(format!(
                        "bundle {:?} depends on undeclared {dep:?}",
                        bundle.name
                    )));
                }
            }
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for bundle in &self.bundles {
            check_cycles(&bundle.name, &index, &mut marks)?;
        }
        Ok(())
    }
}

fn visit<'a>(
    name: &'a str,
    index: &HashMap<&'a str, &'a BundleDecl>,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !visited.insert(name) {
        return;
    }
    if let Some(&decl) = index.get(name) {
        for dep in &decl.dependencies {
            visit(dep, index, visited, order);
        }
    }
    order.push(name.to_string());
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn check_cycles<'a>(
    name: &'a str,
    index: &HashMap<&'a str, &'a BundleDecl>,
    marks: &mut HashMap<&'a str, Mark>,
) -> Result<(), LoadError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(LoadError::Manifest(format!(
                "dependency cycle through bundle {name:?}"
            )));
        }
        None => {}
    }
    marks.insert(name, Mark::Visiting);
    if let Some(&decl) = index.get(name) {
        for dep in &decl.dependencies {
            check_cycles(dep, index, marks)?;
        }
    }
    marks.insert(name, Mark::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = r#"
        [[bundle]]
        name = "a"
        dependencies = ["b"]

        [[bundle]]
        name = "b"
        file = "shared/b.bin"
        dependencies = ["c"]

        [[bundle]]
        name = "c"
    "#;

    #[test]
    fn parses_declarations() {
        let manifest = Manifest::from_toml_str(CHAIN).unwrap();
        assert_eq!(manifest.bundles.len(), 3);
        assert_eq!(manifest.get("b").unwrap().file_name(), "shared/b.bin");
        assert_eq!(manifest.get("c").unwrap().file_name(), "c.bundle");
        assert!(manifest.get("d").is_none());
    }

    #[test]
    fn dependencies_come_first() {
        let manifest = Manifest::from_toml_str(CHAIN).unwrap();
        assert_eq!(manifest.dependency_order("a").unwrap(), ["c", "b", "a"]);
        assert_eq!(manifest.dependency_order("c").unwrap(), ["c"]);
        assert!(manifest.dependency_order("zzz").unwrap_err().is_not_found());
    }

    #[test]
    fn diamond_visits_shared_dependency_once() {
        let manifest = Manifest {
            bundles: vec![
                BundleDecl::new("top").with_dependencies(["left", "right"]),
                BundleDecl::new("left").with_dependencies(["base"]),
                BundleDecl::new("right").with_dependencies(["base"]),
                BundleDecl::new("base"),
            ],
        };
        manifest.validate().unwrap();
        assert_eq!(
            manifest.dependency_order("top").unwrap(),
            ["base", "left", "right", "top"]
        );
    }

    #[test]
    fn rejects_cycles() {
        let manifest = Manifest {
            bundles: vec![
                BundleDecl::new("a").with_dependencies(["b"]),
                BundleDecl::new("b").with_dependencies(["a"]),
            ],
        };
        assert!(matches!(manifest.validate(), Err(LoadError::Manifest(_))));
    }

    #[test]
    fn rejects_undeclared_and_reserved_names() {
        let undeclared = Manifest {
            bundles: vec![BundleDecl::new("a").with_dependencies(["ghost"])],
        };
        assert!(undeclared.validate().is_err());

        let reserved = Manifest {
            bundles: vec![BundleDecl::new(MANIFEST_NODE)],
        };
        assert!(reserved.validate().is_err());

        let duplicate = Manifest {
            bundles: vec![BundleDecl::new("a"), BundleDecl::new("a")],
        };
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn toml_output_parses_back() {
        let manifest = Manifest::from_toml_str(CHAIN).unwrap();
        let text = manifest.to_toml_string().unwrap();
        assert_eq!(Manifest::from_toml_str(&text).unwrap(), manifest);
    }
}
