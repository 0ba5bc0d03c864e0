//! Local filesystem backend.
//!
//! Two addressing modes:
//!
//! - **plain**: absolute paths pass through untouched, relative paths
//!   resolve under `root`. Returned paths are absolute OS paths.
//! - **virtual** (sandboxed): every path is rooted under `root`. `..` and
//!   `~` are rejected up front, and after resolving symlinks the real path
//!   must still lie under `root`. Returned paths are virtual (`/src/a.rs`).
//!
//! Files are opened with `O_NOFOLLOW` on unix so a symlink swapped in after
//! resolution is refused rather than followed.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use walkdir::WalkDir;

use kura_types::{
    DownloadResponse, FileOperationError, ListEntry, OperationResult, SearchMatch, UploadResponse,
};

use crate::backend::{StorageBackend, TextSearch, offload};
use crate::config::LocalDiskConfig;
use crate::error::{StorageError, StorageResult};
use crate::format;
use crate::glob::{self, NameFilter};

/// Default cap on file size for the in-process search fallback.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Default deadline for an external ripgrep run.
pub const DEFAULT_RIPGREP_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend over the real filesystem.
#[derive(Debug, Clone)]
pub struct LocalDiskBackend {
    root: PathBuf,
    virtual_mode: bool,
    max_file_size_bytes: u64,
    ripgrep: bool,
    ripgrep_timeout: Duration,
}

impl LocalDiskBackend {
    /// Plain mode: relative paths resolve under `root`, absolute paths pass
    /// through.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            virtual_mode: false,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            ripgrep: true,
            ripgrep_timeout: DEFAULT_RIPGREP_TIMEOUT,
        }
    }

    /// Virtual mode: all paths are confined under `root`.
    pub fn sandboxed(root: impl Into<PathBuf>) -> Self {
        Self {
            virtual_mode: true,
            ..Self::new(root)
        }
    }

    /// Build from configuration, defaulting the root to the working directory.
    pub fn from_config(config: &LocalDiskConfig) -> StorageResult<Self> {
        let root = match &config.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        let backend = if config.virtual_mode {
            Self::sandboxed(root)
        } else {
            Self::new(root)
        };
        Ok(backend
            .with_max_file_size_mb(config.max_file_size_mb)
            .with_ripgrep(config.ripgrep)
            .with_ripgrep_timeout(Duration::from_secs(config.ripgrep_timeout_secs)))
    }

    pub fn with_max_file_size_mb(mut self, mb: u64) -> Self {
        self.max_file_size_bytes = mb * 1024 * 1024;
        self
    }

    /// Enable or disable the external ripgrep search path.
    pub fn with_ripgrep(mut self, enabled: bool) -> Self {
        self.ripgrep = enabled;
        self
    }

    pub fn with_ripgrep_timeout(mut self, timeout: Duration) -> Self {
        self.ripgrep_timeout = timeout;
        self
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_mode
    }

    /// Map a caller path to an OS path.
    ///
    /// In virtual mode, returns an error if the path contains `..`/`~` or
    /// resolves (through symlinks) outside the root.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        if !self.virtual_mode {
            let p = Path::new(path);
            return Ok(if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            });
        }

        if path.contains("..") || path.starts_with('~') {
            return Err(StorageError::invalid_path(format!(
                "Path traversal not allowed: {}",
                path
            )));
        }

        let full = self.root.join(path.trim_start_matches('/'));
        let resolved = canonicalize_lenient(&full)?;
        if !resolved.starts_with(&self.root) {
            return Err(StorageError::path_escapes_root(format!(
                "{} is not under {}",
                resolved.display(),
                self.root.display()
            )));
        }
        Ok(resolved)
    }

    /// Map an OS path back to what callers see.
    fn to_caller_path(&self, real: &Path) -> String {
        if !self.virtual_mode {
            return real.to_string_lossy().into_owned();
        }
        match real.strip_prefix(&self.root) {
            Ok(relative) => {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                format!("/{}", parts.join("/"))
            }
            Err(_) => real.to_string_lossy().into_owned(),
        }
    }

    fn entry_for(&self, real: &Path, meta: &fs::Metadata) -> ListEntry {
        let path = self.to_caller_path(real);
        if meta.is_dir() {
            ListEntry::directory(path)
        } else {
            ListEntry::file(path, meta.len(), meta.modified().ok())
        }
    }

    fn list_sync(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        let dir = self.resolve(path)?;
        let Ok(read_dir) = fs::read_dir(&dir) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<ListEntry> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let real = entry.path();
                let meta = fs::metadata(&real).ok()?;
                (meta.is_file() || meta.is_dir()).then(|| self.entry_for(&real, &meta))
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read_sync(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        let real = self.resolve(path)?;
        if !real.is_file() {
            return Ok(format::file_not_found(path));
        }
        Ok(match read_nofollow(&real) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => format::format_read_window(&content, offset, limit),
                Err(_) => format!("Error reading file '{}': file is not valid UTF-8", path),
            },
            Err(e) => format!("Error reading file '{}': {}", path, e),
        })
    }

    fn write_sync(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        let real = self.resolve(path)?;
        if fs::symlink_metadata(&real).is_ok() {
            return Ok(OperationResult::failed(format::already_exists(path)));
        }
        let written = real
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| write_nofollow(&real, content.as_bytes(), true));
        Ok(match written {
            Ok(()) => OperationResult::written(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                OperationResult::failed(format::already_exists(path))
            }
            Err(e) => OperationResult::failed(format!("Error writing file '{}': {}", path, e)),
        })
    }

    fn edit_sync(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let real = self.resolve(path)?;
        if !real.is_file() {
            return Ok(OperationResult::failed(format::file_not_found(path)));
        }
        let content = match read_nofollow(&real).map(String::from_utf8) {
            Ok(Ok(content)) => content,
            Ok(Err(_)) => {
                return Ok(OperationResult::failed(format!(
                    "Error editing file '{}': file is not valid UTF-8",
                    path
                )));
            }
            Err(e) => {
                return Ok(OperationResult::failed(format!(
                    "Error editing file '{}': {}",
                    path, e
                )));
            }
        };

        let (updated, occurrences) =
            match format::perform_string_replacement(&content, old, new, replace_all) {
                Ok(done) => done,
                Err(message) => return Ok(OperationResult::failed(message)),
            };

        Ok(match write_nofollow(&real, updated.as_bytes(), false) {
            Ok(()) => OperationResult::edited(path, occurrences),
            Err(e) => OperationResult::failed(format!("Error editing file '{}': {}", path, e)),
        })
    }

    fn search_glob_sync(&self, pattern: &str, path: &str) -> Vec<ListEntry> {
        let Ok(base) = self.resolve(path) else {
            return Vec::new();
        };
        if !base.is_dir() {
            return Vec::new();
        }
        let matcher = match glob::compile(pattern) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "glob pattern rejected");
                return Vec::new();
            }
        };

        let mut walker = WalkDir::new(&base).min_depth(1);
        if !pattern.contains('/') && !pattern.contains("**") {
            walker = walker.max_depth(1);
        }

        let mut entries: Vec<ListEntry> = walker
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = relative_slash_path(entry.path(), &base)?;
                if !matcher.is_match(&relative) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                Some(self.entry_for(entry.path(), &meta))
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// In-process search: walk the tree and scan each file line by line.
    fn search_fallback(&self, pattern: &str, base: &Path, filter: &NameFilter) -> Vec<SearchMatch> {
        let Ok(regex) = Regex::new(&regex::escape(pattern)) else {
            return Vec::new();
        };

        let mut matches = Vec::new();
        for entry in WalkDir::new(base).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.len() > self.max_file_size_bytes {
                continue;
            }
            if !filter.matches(&search_relative(entry.path(), base)) {
                continue;
            }
            let Ok(content) = read_nofollow(entry.path()).map(String::from_utf8) else {
                continue;
            };
            let Ok(content) = content else { continue };

            let caller_path = self.to_caller_path(entry.path());
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(SearchMatch::new(caller_path.clone(), idx + 1, line));
                }
            }
        }
        matches
    }

    /// Search with ripgrep's JSON output. `None` means ripgrep was
    /// unavailable, failed or timed out and the caller should fall back.
    async fn search_ripgrep(
        &self,
        pattern: &str,
        base: &Path,
        filter: &NameFilter,
        glob: Option<&str>,
    ) -> Option<Vec<SearchMatch>> {
        let mut cmd = Command::new("rg");
        cmd.arg("--json")
            .arg("-F")
            .arg("--hidden")
            .arg("--no-ignore")
            .arg("--max-filesize")
            .arg(self.max_file_size_bytes.to_string());
        // Globs with a separator are applied only by the filter below.
        if let Some(g) = glob.filter(|g| !g.is_empty() && !filter.is_anchored()) {
            cmd.arg("--glob").arg(g);
        }
        cmd.arg("--")
            .arg(pattern)
            .arg(base)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(error = %e, "ripgrep unavailable, using fallback search");
                return None;
            }
        };
        let mut stdout = child.stdout.take()?;

        let run = async {
            let mut raw = Vec::new();
            stdout.read_to_end(&mut raw).await?;
            let status = child.wait().await?;
            Ok::<_, io::Error>((raw, status))
        };

        let (raw, status) = match tokio::time::timeout(self.ripgrep_timeout, run).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "ripgrep failed, using fallback search");
                return None;
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.ripgrep_timeout, "ripgrep timed out, using fallback search");
                return None;
            }
        };

        // rg exits 1 when nothing matched; 2 is an error.
        if status.code() == Some(2) {
            tracing::warn!("ripgrep reported an error, using fallback search");
            return None;
        }

        Some(
            String::from_utf8_lossy(&raw)
                .lines()
                .filter_map(|line| self.parse_ripgrep_match(line, base, filter))
                .collect(),
        )
    }

    fn parse_ripgrep_match(
        &self,
        line: &str,
        base: &Path,
        filter: &NameFilter,
    ) -> Option<SearchMatch> {
        let event: serde_json::Value = serde_json::from_str(line).ok()?;
        if event.get("type")?.as_str()? != "match" {
            return None;
        }
        let data = event.get("data")?;
        let path = data.get("path")?.get("text")?.as_str()?;
        if !filter.matches(&search_relative(Path::new(path), base)) {
            return None;
        }
        let line_number = data.get("line_number")?.as_u64()? as usize;
        let text = data.get("lines")?.get("text")?.as_str()?;
        let text = text.trim_end_matches('\n').trim_end_matches('\r');
        Some(SearchMatch::new(
            self.to_caller_path(Path::new(path)),
            line_number,
            text,
        ))
    }

    fn upload_sync(&self, files: Vec<(String, Vec<u8>)>) -> Vec<UploadResponse> {
        files
            .into_iter()
            .map(|(path, bytes)| {
                let real = match self.resolve(&path) {
                    Ok(real) => real,
                    Err(_) => return UploadResponse::failed(path, FileOperationError::InvalidPath),
                };
                let written = real
                    .parent()
                    .map_or(Ok(()), fs::create_dir_all)
                    .and_then(|_| write_nofollow(&real, &bytes, false));
                match written {
                    Ok(()) => UploadResponse::ok(path),
                    Err(e) => UploadResponse::failed(path, FileOperationError::from_io(&e)),
                }
            })
            .collect()
    }

    fn download_sync(&self, paths: Vec<String>) -> Vec<DownloadResponse> {
        paths
            .into_iter()
            .map(|path| {
                let real = match self.resolve(&path) {
                    Ok(real) => real,
                    Err(_) => {
                        return DownloadResponse::failed(path, FileOperationError::InvalidPath);
                    }
                };
                match fs::metadata(&real) {
                    Ok(meta) if meta.is_dir() => {
                        return DownloadResponse::failed(path, FileOperationError::IsDirectory);
                    }
                    Err(e) => return DownloadResponse::failed(path, FileOperationError::from_io(&e)),
                    Ok(_) => {}
                }
                match read_nofollow(&real) {
                    Ok(bytes) => DownloadResponse::ok(path, bytes),
                    Err(e) => DownloadResponse::failed(path, FileOperationError::from_io(&e)),
                }
            })
            .collect()
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest, so
/// paths that do not exist yet still get their symlinks resolved.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        match dunce::canonicalize(existing) {
            Ok(mut resolved) => {
                for part in tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(e);
                };
                tail.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Path of a search hit relative to the search base; the file name when
/// the base is the file itself.
fn search_relative(path: &Path, base: &Path) -> String {
    match relative_slash_path(path, base) {
        Some(relative) if !relative.is_empty() => relative,
        _ => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

fn no_follow(opts: &mut OpenOptions) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }
    #[cfg(not(unix))]
    let _ = opts;
}

fn read_nofollow(path: &Path) -> io::Result<Vec<u8>> {
    let mut opts = OpenOptions::new();
    opts.read(true);
    no_follow(&mut opts);
    let mut file = opts.open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

fn write_nofollow(path: &Path, data: &[u8], create_new: bool) -> io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true);
    if create_new {
        opts.create_new(true);
    } else {
        opts.create(true).truncate(true);
    }
    no_follow(&mut opts);
    let mut file = opts.open(path)?;
    file.write_all(data)?;
    file.flush()
}

#[async_trait]
impl StorageBackend for LocalDiskBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        let this = self.clone();
        let path = path.to_owned();
        offload(move || this.list_sync(&path)).await
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        let this = self.clone();
        let path = path.to_owned();
        offload(move || this.read_sync(&path, offset, limit)).await
    }

    async fn search_text(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> StorageResult<TextSearch> {
        let filter = match NameFilter::new(glob) {
            Ok(filter) => filter,
            Err(message) => return Ok(Err(message)),
        };
        let base = match self.resolve(path.unwrap_or(".")) {
            Ok(base) if base.exists() => base,
            _ => return Ok(Ok(Vec::new())),
        };

        let mut matches = if self.ripgrep {
            self.search_ripgrep(pattern, &base, &filter, glob).await
        } else {
            None
        };

        if matches.is_none() {
            let this = self.clone();
            let pattern = pattern.to_owned();
            let base = base.clone();
            matches = Some(offload(move || Ok(this.search_fallback(&pattern, &base, &filter))).await?);
        }

        let mut matches = matches.unwrap_or_default();
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        Ok(Ok(matches))
    }

    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        let this = self.clone();
        let pattern = pattern.to_owned();
        let path = path.to_owned();
        offload(move || Ok(this.search_glob_sync(&pattern, &path))).await
    }

    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        let this = self.clone();
        let path = path.to_owned();
        let content = content.to_owned();
        offload(move || this.write_sync(&path, &content)).await
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let this = self.clone();
        let (path, old, new) = (path.to_owned(), old.to_owned(), new.to_owned());
        offload(move || this.edit_sync(&path, &old, &new, replace_all)).await
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        let this = self.clone();
        offload(move || Ok(this.upload_sync(files))).await
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        let this = self.clone();
        offload(move || Ok(this.download_sync(paths))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalDiskBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalDiskBackend::sandboxed(dir.path()).with_ripgrep(false);
        (backend, dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, dir) = setup();
        let res = backend.write("/src/main.rs", "fn main() {}\n").await.unwrap();
        assert!(res.is_ok());
        assert!(res.update.is_none());
        assert!(dir.path().join("src/main.rs").exists());

        let out = backend.read_all("/src/main.rs").await.unwrap();
        assert_eq!(out, "     1\tfn main() {}");
    }

    #[tokio::test]
    async fn test_write_is_create_only() {
        let (backend, dir) = setup();
        backend.write("/a.txt", "first").await.unwrap();
        let res = backend.write("/a.txt", "second").await.unwrap();
        assert!(res.error.unwrap().contains("already exists"));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "first");
    }

    #[tokio::test]
    async fn test_read_missing_empty_and_offset() {
        let (backend, dir) = setup();
        assert_eq!(
            backend.read_all("/nope.txt").await.unwrap(),
            "Error: File '/nope.txt' not found"
        );

        fs::write(dir.path().join("empty.txt"), "").unwrap();
        assert_eq!(
            backend.read_all("/empty.txt").await.unwrap(),
            format::EMPTY_CONTENT_WARNING
        );

        fs::write(dir.path().join("two.txt"), "a\nb\n").unwrap();
        assert_eq!(
            backend.read("/two.txt", 9, 10).await.unwrap(),
            "Error: Line offset 9 exceeds file length (2 lines)"
        );
    }

    #[tokio::test]
    async fn test_edit() {
        let (backend, dir) = setup();
        fs::write(dir.path().join("f.txt"), "x = 1\ny = 1\n").unwrap();

        let ambiguous = backend.edit("/f.txt", "= 1", "= 2", false).await.unwrap();
        assert!(ambiguous.error.unwrap().contains("appears 2 times"));

        let all = backend.edit("/f.txt", "= 1", "= 2", true).await.unwrap();
        assert_eq!(all.occurrences, Some(2));
        assert_eq!(
            fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "x = 2\ny = 2\n"
        );

        let missing = backend.edit("/none.txt", "a", "b", false).await.unwrap();
        assert_eq!(missing.error.as_deref(), Some("Error: File '/none.txt' not found"));
    }

    #[tokio::test]
    async fn test_list_uses_virtual_paths() {
        let (backend, dir) = setup();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.txt"), "in").unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();

        let root = backend.list("/").await.unwrap();
        let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/sub/", "/top.txt"]);
        assert_eq!(root[1].size_bytes, 3);

        let sub = backend.list("/sub").await.unwrap();
        assert_eq!(sub[0].path, "/sub/inner.txt");

        assert!(backend.list("/missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (backend, _dir) = setup();
        let err = backend.read_all("/../etc/passwd").await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.write("~/x", "y").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (backend, dir) = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = backend.read_all("/link/secret.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::PathEscapesRoot(_)));
        assert!(backend.write("/link/new.txt", "x").await.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_nofollow_refuses_symlink() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("ln.txt"))
            .unwrap();
        assert!(read_nofollow(&dir.path().join("ln.txt")).is_err());
        assert!(read_nofollow(&dir.path().join("target.txt")).is_ok());
    }

    #[tokio::test]
    async fn test_plain_mode_passes_absolute_paths() {
        let dir = TempDir::new().unwrap();
        let backend = LocalDiskBackend::new(dir.path()).with_ripgrep(false);
        let abs = backend.root().join("abs.txt");
        let abs = abs.to_string_lossy().into_owned();

        backend.write(&abs, "hello").await.unwrap();
        let listed = backend.list(&backend.root().to_string_lossy()).await.unwrap();
        assert_eq!(listed[0].path, abs);

        backend.write("rel.txt", "relative").await.unwrap();
        assert!(backend.root().join("rel.txt").exists());
    }

    #[tokio::test]
    async fn test_glob_recursion_is_opt_in() {
        let (backend, dir) = setup();
        fs::create_dir_all(dir.path().join("sub/dir")).unwrap();
        fs::write(dir.path().join("sub/dir/file.py"), "").unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();

        let flat = backend.search_glob("*.py", "/").await.unwrap();
        let paths: Vec<&str> = flat.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/main.py"]);

        let deep = backend.search_glob("**/*.py", "/").await.unwrap();
        let paths: Vec<&str> = deep.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/main.py", "/sub/dir/file.py"]);
    }

    #[tokio::test]
    async fn test_fallback_search() {
        let (backend, dir) = setup();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "intro\nTODO: write (more)\n").unwrap();
        fs::write(dir.path().join("b.txt"), "TODO: b\n").unwrap();

        let hits = backend.search_text("TODO: write (", None, None).await.unwrap().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/docs/a.md");
        assert_eq!(hits[0].line, 2);
        assert_eq!(hits[0].text, "TODO: write (more)");

        let md_only = backend.search_text("TODO", Some("/"), Some("*.md")).await.unwrap().unwrap();
        assert_eq!(md_only.len(), 1);

        let bad = backend.search_text("TODO", None, Some("[")).await.unwrap();
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_fallback_skips_large_files() {
        let dir = TempDir::new().unwrap();
        let backend = LocalDiskBackend::sandboxed(dir.path())
            .with_ripgrep(false)
            .with_max_file_size_mb(0);
        fs::write(dir.path().join("a.txt"), "needle").unwrap();
        let hits = backend.search_text("needle", None, None).await.unwrap().unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_ripgrep_and_fallback_agree() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("n")).unwrap();
        fs::write(dir.path().join("n/one.rs"), "let needle = 1;\nother\nneedle again\n").unwrap();
        fs::write(dir.path().join("two.rs"), "no match\n").unwrap();

        let with_rg = LocalDiskBackend::sandboxed(dir.path());
        let base = with_rg.root().to_path_buf();
        let everything = NameFilter::new(None).unwrap();
        let Some(mut rg) = with_rg.search_ripgrep("needle", &base, &everything, None).await else {
            // ripgrep is not installed here
            return;
        };
        rg.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));

        let without = LocalDiskBackend::sandboxed(dir.path()).with_ripgrep(false);
        let fallback = without.search_text("needle", None, None).await.unwrap().unwrap();
        assert_eq!(rg, fallback);
    }

    #[tokio::test]
    async fn test_search_glob_filter_is_the_same_with_and_without_ripgrep() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/deep")).unwrap();
        fs::write(dir.path().join("docs/a.md"), "needle\n").unwrap();
        fs::write(dir.path().join("docs/deep/b.md"), "needle\n").unwrap();
        fs::write(dir.path().join("c.md"), "needle\n").unwrap();

        let cases: [(Option<&str>, Option<&str>, Vec<&str>); 5] = [
            (None, Some("docs/*.md"), vec!["/docs/a.md"]),
            (None, Some("**/deep/*.md"), vec!["/docs/deep/b.md"]),
            (None, Some("*.md"), vec!["/c.md", "/docs/a.md", "/docs/deep/b.md"]),
            (Some("/docs"), Some("deep/*.md"), vec!["/docs/deep/b.md"]),
            (Some("/docs/a.md"), Some("*.txt"), vec![]),
        ];
        for ripgrep in [false, true] {
            let backend = LocalDiskBackend::sandboxed(dir.path()).with_ripgrep(ripgrep);
            for (path, glob, expected) in &cases {
                let hits = backend.search_text("needle", *path, *glob).await.unwrap().unwrap();
                let paths: Vec<&str> = hits.iter().map(|m| m.path.as_str()).collect();
                assert_eq!(&paths, expected, "ripgrep={ripgrep} path={path:?} glob={glob:?}");
            }
        }

        let single = LocalDiskBackend::sandboxed(dir.path()).with_ripgrep(false);
        let named = single
            .search_text("needle", Some("/docs/a.md"), Some("a.md"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(named.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_upload_download() {
        let (backend, dir) = setup();
        fs::create_dir(dir.path().join("adir")).unwrap();

        let up = backend
            .upload_batch(vec![
                ("/bin/data.bin".into(), vec![0, 159, 146, 150]),
                ("/../escape".into(), b"x".to_vec()),
            ])
            .await
            .unwrap();
        assert!(up[0].error.is_none());
        assert_eq!(up[1].error, Some(FileOperationError::InvalidPath));

        let down = backend
            .download_batch(vec![
                "/bin/data.bin".into(),
                "/adir".into(),
                "/missing".into(),
            ])
            .await
            .unwrap();
        assert_eq!(down[0].content.as_deref(), Some(&[0u8, 159, 146, 150][..]));
        assert_eq!(down[1].error, Some(FileOperationError::IsDirectory));
        assert_eq!(down[2].error, Some(FileOperationError::FileNotFound));
    }
}
