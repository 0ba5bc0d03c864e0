//! Listing and search over flat path → record maps.
//!
//! The ephemeral and persistent backends store files as a flat keyspace
//! with no native hierarchy. Directories are reconstructed here by
//! grouping keys on their next path component.

use std::collections::BTreeSet;

use kura_types::{FileRecord, ListEntry, SearchMatch};

use crate::backend::TextSearch;
use crate::glob::{self, NameFilter};
use crate::path::dir_prefix;

/// Immediate children of `path`, sorted by path.
pub(crate) fn list_records<'a, I>(records: I, path: &str) -> Vec<ListEntry>
where
    I: IntoIterator<Item = (&'a str, &'a FileRecord)>,
{
    let dir = dir_prefix(Some(path));
    let mut entries = Vec::new();
    let mut subdirs = BTreeSet::new();

    for (key, record) in records {
        let Some(relative) = key.strip_prefix(dir.as_str()) else {
            continue;
        };
        match relative.split_once('/') {
            Some((child, _)) => {
                subdirs.insert(format!("{}{}/", dir, child));
            }
            None => entries.push(
                ListEntry::file(key, record.size_bytes(), None).with_modified(record.modified_at),
            ),
        }
    }

    entries.extend(subdirs.into_iter().map(ListEntry::directory));
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Files under `path` whose relative path matches `pattern`, most recently
/// modified first.
pub(crate) fn glob_records<'a, I>(records: I, pattern: &str, path: &str) -> Vec<ListEntry>
where
    I: IntoIterator<Item = (&'a str, &'a FileRecord)>,
{
    let matcher = match glob::compile(pattern) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "glob pattern rejected");
            return Vec::new();
        }
    };
    let base = dir_prefix(Some(path));

    let mut hits: Vec<(&FileRecord, ListEntry)> = records
        .into_iter()
        .filter(|(key, _)| {
            glob::relative_to(key, &base).is_some_and(|relative| matcher.is_match(relative))
        })
        .map(|(key, record)| {
            let entry =
                ListEntry::file(key, record.size_bytes(), None).with_modified(record.modified_at);
            (record, entry)
        })
        .collect();

    hits.sort_by(|(a, ea), (b, eb)| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| ea.path.cmp(&eb.path))
    });
    hits.into_iter().map(|(_, entry)| entry).collect()
}

/// Lines containing `pattern` in files under `path`, ordered by path then line.
pub(crate) fn grep_records<'a, I>(
    records: I,
    pattern: &str,
    path: Option<&str>,
    glob: Option<&str>,
) -> TextSearch
where
    I: IntoIterator<Item = (&'a str, &'a FileRecord)>,
{
    let filter = NameFilter::new(glob)?;
    let base = dir_prefix(path);

    let mut matches = Vec::new();
    for (key, record) in records {
        if !key.starts_with(base.as_str()) {
            continue;
        }
        let relative = glob::relative_to(key, &base).unwrap_or_else(|| glob::basename(key));
        if !filter.matches(relative) {
            continue;
        }
        for (idx, line) in record.lines.iter().enumerate() {
            if line.contains(pattern) {
                matches.push(SearchMatch::new(key, idx + 1, line.as_str()));
            }
        }
    }

    matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    fn files() -> HashMap<String, FileRecord> {
        let mut map = HashMap::new();
        map.insert("/README.md".to_string(), FileRecord::new("# readme\ntodo: docs"));
        map.insert("/main.py".to_string(), FileRecord::new("import os\nprint('hi')"));
        map.insert(
            "/sub/dir/file.py".to_string(),
            FileRecord::new("import sys\n# todo"),
        );
        map.insert("/sub/notes.md".to_string(), FileRecord::new("todo: more"));
        map
    }

    fn iter(map: &HashMap<String, FileRecord>) -> impl Iterator<Item = (&str, &FileRecord)> {
        map.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[test]
    fn list_groups_subdirectories() {
        let map = files();
        let root = list_records(iter(&map), "/");
        let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/README.md", "/main.py", "/sub/"]);
        assert!(root[2].is_dir);
        assert_eq!(root[2].size_bytes, 0);

        let sub = list_records(iter(&map), "/sub");
        let paths: Vec<&str> = sub.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/sub/dir/", "/sub/notes.md"]);
    }

    #[test]
    fn list_of_unknown_or_file_path_is_empty() {
        let map = files();
        assert!(list_records(iter(&map), "/missing").is_empty());
        assert!(list_records(iter(&map), "/main.py").is_empty());
    }

    #[test]
    fn glob_is_not_recursive_without_double_star() {
        let map = files();
        let flat = glob_records(iter(&map), "*.py", "/");
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].path, "/main.py");

        let deep = glob_records(iter(&map), "**/*.py", "/");
        let mut paths: Vec<&str> = deep.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/main.py", "/sub/dir/file.py"]);
    }

    #[test]
    fn glob_orders_newest_first() {
        let mut map = HashMap::new();
        let mut old = FileRecord::new("old");
        old.modified_at = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let mut new = FileRecord::new("new");
        new.modified_at = SystemTime::UNIX_EPOCH + Duration::from_secs(20);
        map.insert("/a.txt".to_string(), old);
        map.insert("/b.txt".to_string(), new);

        let hits = glob_records(iter(&map), "*.txt", "/");
        assert_eq!(hits[0].path, "/b.txt");
        assert_eq!(hits[1].path, "/a.txt");
    }

    #[test]
    fn grep_is_literal_and_scoped() {
        let map = files();
        let all = grep_records(iter(&map), "todo", None, None).unwrap();
        let found: Vec<(&str, usize)> = all.iter().map(|m| (m.path.as_str(), m.line)).collect();
        assert_eq!(
            found,
            vec![("/README.md", 2), ("/sub/dir/file.py", 2), ("/sub/notes.md", 1)]
        );

        let scoped = grep_records(iter(&map), "todo", Some("/sub"), Some("*.md")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].path, "/sub/notes.md");

        let literal = grep_records(iter(&map), "print(", None, None).unwrap();
        assert_eq!(literal.len(), 1);
    }

    #[test]
    fn grep_glob_with_separator_matches_relative_path() {
        let map = files();
        let under_sub = grep_records(iter(&map), "todo", None, Some("sub/*.md")).unwrap();
        let paths: Vec<&str> = under_sub.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/sub/notes.md"]);

        let scoped = grep_records(iter(&map), "todo", Some("/sub"), Some("dir/*.py")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].path, "/sub/dir/file.py");
    }

    #[test]
    fn grep_with_bad_glob_is_an_error_string() {
        let map = files();
        let err = grep_records(iter(&map), "x", None, Some("[")).unwrap_err();
        assert!(err.starts_with("Invalid glob pattern"));
    }
}
