use thiserror::Error;

/// Errors raised by a byte source.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Nothing is stored under the requested path.
    #[error("not found: {0}")]
    NotFound(String),
    /// The underlying file or socket failed.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    /// The path failed normalization (empty, or escaping the root with `..`).
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// A remote server answered with an error status or the transfer broke off.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(err.to_string()),
            _ => VfsError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn io_not_found_becomes_not_found() {
        let err: VfsError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn io_source_is_preserved() {
        let err: VfsError = std::io::Error::other("disk on fire").into();
        assert!(matches!(err, VfsError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[rstest]
    #[case(VfsError::NotFound("a.txt".into()), "not found: a.txt")]
    #[case(VfsError::InvalidPath("empty".into()), "invalid path: empty")]
    #[case(VfsError::Http("status 500".into()), "HTTP error: status 500")]
    fn messages(#[case] err: VfsError, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }
}
