//! Provider path normalization.

use crate::VfsError;

/// Normalize a provider path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators (`a///b` → `a/b`)
/// - Drops `.` segments
/// - Rejects `..` segments (path traversal not allowed)
/// - Strips leading and trailing slashes
///
/// Returns `Err(VfsError::InvalidPath)` if the path is empty or contains `..`.
pub fn normalize(path: &str) -> Result<String, VfsError> {
    let replaced = path.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(VfsError::InvalidPath(format!(
                    "path traversal (..) not allowed in {path:?}"
                )));
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(VfsError::InvalidPath(format!("empty path {path:?}")));
    }

    Ok(segments.join("/"))
}

/// Returns `true` if `path` is already in normalized form.
pub fn is_normalized(path: &str) -> bool {
    normalize(path).is_ok_and(|normalized| normalized == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("textures/brick.png", "textures/brick.png")]
    #[case("/textures/brick.png", "textures/brick.png")]
    #[case("textures/", "textures")]
    #[case("textures///brick.png", "textures/brick.png")]
    #[case("textures/./brick.png", "textures/brick.png")]
    #[case("textures\\brick.png", "textures/brick.png")]
    #[case("file.txt", "file.txt")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("///")]
    #[case("././.")]
    #[case("textures/../secret.txt")]
    #[case("..")]
    fn rejects(#[case] input: &str) {
        assert!(matches!(normalize(input), Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn normalized_check() {
        assert!(is_normalized("a/b/c.txt"));
        assert!(!is_normalized("/a/b"));
        assert!(!is_normalized("a//b"));
        assert!(!is_normalized("a/../b"));
    }
}
