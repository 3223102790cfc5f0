//! Logical resource paths of the form `prefix://payload`.

use std::fmt;

use crate::error::PathError;

/// Prefix used when a path carries none.
pub const DEFAULT_PREFIX: &str = "res";

const SCHEME_SEPARATOR: &str = "://";

/// A parsed logical path.
///
/// The prefix selects a backend; the payload is opaque to everything but
/// that backend. Prefixes are normalized to lower case and an empty or
/// missing prefix becomes [`DEFAULT_PREFIX`].
///
/// ```
/// use redlilium_resources::ResourcePath;
///
/// let path = ResourcePath::parse("textures/wall.png").unwrap();
/// assert_eq!(path.prefix(), "res");
/// assert_eq!(path.to_string(), "res://textures/wall.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    prefix: String,
    path: String,
}

impl ResourcePath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.starts_with(SCHEME_SEPARATOR) {
            return Err(PathError::EmptyPrefix(raw.to_string()));
        }
        if raw.starts_with(':') {
            return Err(PathError::LeadingColon(raw.to_string()));
        }

        let (prefix, payload) = match raw.find(SCHEME_SEPARATOR) {
            Some(pos) => (&raw[..pos], &raw[pos + SCHEME_SEPARATOR.len()..]),
            None => ("", raw),
        };

        if !prefix.is_empty() && !is_valid_prefix(prefix) {
            return Err(PathError::InvalidPrefix {
                prefix: prefix.to_string(),
                path: raw.to_string(),
            });
        }
        if payload.is_empty() {
            return Err(PathError::EmptyPayload(raw.to_string()));
        }

        Ok(Self {
            prefix: normalize_prefix(prefix),
            path: payload.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The backend-specific payload after `://`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_default(&self) -> bool {
        self.prefix == DEFAULT_PREFIX
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, SCHEME_SEPARATOR, self.path)
    }
}

/// Whether `prefix` may name a backend: an ASCII letter followed by
/// letters, digits and `+ - _ .`.
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '.'))
}

/// Lower-cases a prefix and maps the empty prefix to [`DEFAULT_PREFIX`].
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        prefix.to_ascii_lowercase()
    }
}

/// Splits an archive payload `node/asset` at the first `/`.
pub fn split_node_asset(path: &str) -> Result<(&str, &str), PathError> {
    if path.starts_with('/') || path.ends_with('/') {
        return Err(PathError::NodeAsset(path.to_string()));
    }
    match path.split_once('/') {
        Some((node, asset)) if !asset.starts_with('/') => Ok((node, asset)),
        _ => Err(PathError::NodeAsset(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mem://a", "mem", "a")]
    #[case("textures/wall.png", "res", "textures/wall.png")]
    #[case("HTTPS://example.com/x", "https", "example.com/x")]
    #[case("bundle://level1/hero.mesh", "bundle", "level1/hero.mesh")]
    #[case("c:relative", "res", "c:relative")]
    fn parse_valid(#[case] raw: &str, #[case] prefix: &str, #[case] payload: &str) {
        let path = ResourcePath::parse(raw).unwrap();
        assert_eq!(path.prefix(), prefix);
        assert_eq!(path.path(), payload);
    }

    #[rstest]
    #[case("", PathError::Empty)]
    #[case("://a", PathError::EmptyPrefix("://a".into()))]
    #[case(":a", PathError::LeadingColon(":a".into()))]
    #[case("mem://", PathError::EmptyPayload("mem://".into()))]
    fn parse_invalid(#[case] raw: &str, #[case] expected: PathError) {
        assert_eq!(ResourcePath::parse(raw), Err(expected));
    }

    #[test]
    fn bad_prefix_characters() {
        assert!(matches!(
            ResourcePath::parse("1mem://a"),
            Err(PathError::InvalidPrefix { .. })
        ));
        assert!(matches!(
            ResourcePath::parse("me m://a"),
            Err(PathError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        let path = ResourcePath::parse("mem://a/b").unwrap();
        assert_eq!(ResourcePath::parse(&path.to_string()).unwrap(), path);
        assert!(!path.is_default());
    }

    #[rstest]
    #[case("level1/hero.mesh", ("level1", "hero.mesh"))]
    #[case("level1/sub/hero.mesh", ("level1", "sub/hero.mesh"))]
    fn split_valid(#[case] path: &str, #[case] expected: (&str, &str)) {
        assert_eq!(split_node_asset(path).unwrap(), expected);
    }

    #[rstest]
    #[case("/level1/hero")]
    #[case("level1/")]
    #[case("level1")]
    #[case("level1//hero")]
    fn split_invalid(#[case] path: &str) {
        assert!(matches!(split_node_asset(path), Err(PathError::NodeAsset(_))));
    }
}
