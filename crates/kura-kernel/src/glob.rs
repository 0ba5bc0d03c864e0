//! Glob matching over virtual paths.
//!
//! Standard glob semantics: `*` never crosses a `/`, so a pattern without a
//! separator only matches entries directly under the search base; `**`
//! opts into recursion. Brace alternatives (`*.{rs,toml}`) are supported.

use globset::{GlobBuilder, GlobMatcher};

/// Compile a path glob. The error is an agent-facing message.
pub fn compile(pattern: &str) -> Result<GlobMatcher, String> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))
}

/// Path of `path` relative to a `/`-terminated `base`, if it lies under it.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    path.strip_prefix(base)
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty())
}

/// Final component of a `/`-separated path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// File filter used by text search (`glob` argument).
///
/// Every backend applies the same rule: a pattern containing `/` matches
/// the path relative to the search base, anything else matches the file
/// name at any depth. When the search base is a single file, its relative
/// path is its file name.
#[derive(Debug, Clone)]
pub struct NameFilter {
    matcher: Option<GlobMatcher>,
    anchored: bool,
}

impl NameFilter {
    /// Build a filter; `None` or an empty pattern matches everything.
    pub fn new(pattern: Option<&str>) -> Result<Self, String> {
        let (matcher, anchored) = match pattern {
            Some(p) if !p.is_empty() => (Some(compile(p)?), p.contains('/')),
            _ => (None, false),
        };
        Ok(Self { matcher, anchored })
    }

    /// Whether the pattern is matched against relative paths rather than
    /// file names.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Check a `/`-separated path relative to the search base.
    pub fn matches(&self, relative: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return true;
        };
        if self.anchored {
            matcher.is_match(relative)
        } else {
            matcher.is_match(basename(relative))
        }
    }
}
