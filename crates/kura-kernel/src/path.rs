//! Virtual path validation and normalization.
//!
//! Every path an agent supplies passes through [`validate_path`] once, at
//! the boundary, before any backend sees it. The result always starts with
//! `/`, uses forward slashes only, and contains no `.`/`..` segments.

use crate::error::{StorageError, StorageResult};

/// Validate and normalize a virtual path.
///
/// Rejects `..` anywhere, a leading `~`, and drive-letter prefixes such as
/// `C:`. Backslashes become forward slashes, repeated separators and `.`
/// segments collapse, and a leading `/` is added. With `allowed_prefixes`,
/// the normalized path must also start with one of the prefixes.
///
/// Normalization is idempotent.
///
/// ```
/// use kura_kernel::path::validate_path;
///
/// assert_eq!(validate_path("./foo//bar", None).unwrap(), "/foo/bar");
/// assert!(validate_path("../etc/passwd", None).is_err());
/// ```
pub fn validate_path(path: &str, allowed_prefixes: Option<&[String]>) -> StorageResult<String> {
    if path.contains("..") || path.starts_with('~') {
        return Err(StorageError::invalid_path(format!(
            "Path traversal not allowed: {}",
            path
        )));
    }

    if has_drive_letter(path) {
        return Err(StorageError::invalid_path(format!(
            "Windows absolute paths are not supported: {}. Please use virtual paths starting with / (e.g., /workspace/file.txt)",
            path
        )));
    }

    let normalized = normalize(&path.replace('\\', "/"));

    if let Some(prefixes) = allowed_prefixes {
        if !prefixes.iter().any(|p| normalized.starts_with(p.as_str())) {
            return Err(StorageError::invalid_path(format!(
                "Path must start with one of {:?}: {}",
                prefixes, path
            )));
        }
    }

    Ok(normalized)
}

/// Collapse separators and `.` segments, and root the path at `/`.
fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Make a tool call id safe to use as a single path segment.
///
/// Replaces `.`, `/` and `\` with `_`.
pub fn sanitize_tool_call_id(tool_call_id: &str) -> String {
    tool_call_id.replace(['.', '/', '\\'], "_")
}

/// Turn a search base into a directory prefix ending in `/`.
///
/// `None` and empty strings mean the root.
pub(crate) fn dir_prefix(path: Option<&str>) -> String {
    let path = match path {
        Some(p) if !p.trim().is_empty() => p,
        _ => "/",
    };
    let mut prefix = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_and_doubled_separators() {
        assert_eq!(validate_path("./foo//bar", None).unwrap(), "/foo/bar");
        assert_eq!(validate_path("foo/bar", None).unwrap(), "/foo/bar");
        assert_eq!(validate_path("/./foo//bar/", None).unwrap(), "/foo/bar");
        assert_eq!(validate_path("/", None).unwrap(), "/");
        assert_eq!(validate_path("", None).unwrap(), "/");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["./foo//bar", "a\\b\\c.txt", "/x/./y/", "notes.md", "/"] {
            let once = validate_path(raw, None).unwrap();
            let twice = validate_path(&once, None).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn backslashes_become_forward_slashes() {
        assert_eq!(validate_path("dir\\file.txt", None).unwrap(), "/dir/file.txt");
    }

    #[test]
    fn rejects_traversal_and_home() {
        assert!(validate_path("../etc/passwd", None).is_err());
        assert!(validate_path("/data/../etc", None).is_err());
        assert!(validate_path("~/secrets", None).is_err());
    }

    #[test]
    fn rejects_drive_letters() {
        let err = validate_path("C:\\Users\\file.txt", None).unwrap_err();
        assert!(err.is_validation());
        assert!(validate_path("f:/data", None).is_err());
    }

    #[test]
    fn allowed_prefixes_are_enforced() {
        let prefixes = vec!["/data/".to_string()];
        assert_eq!(
            validate_path("/data/file.txt", Some(&prefixes)).unwrap(),
            "/data/file.txt"
        );
        assert!(validate_path("/etc/file.txt", Some(&prefixes)).is_err());
    }

    #[test]
    fn sanitizes_call_ids() {
        assert_eq!(sanitize_tool_call_id("call.1/a\\b"), "call_1_a_b");
        assert_eq!(sanitize_tool_call_id("toolu_01"), "toolu_01");
    }

    #[test]
    fn dir_prefix_always_ends_with_slash() {
        assert_eq!(dir_prefix(None), "/");
        assert_eq!(dir_prefix(Some("")), "/");
        assert_eq!(dir_prefix(Some("/src")), "/src/");
        assert_eq!(dir_prefix(Some("src/")), "/src/");
    }
}
