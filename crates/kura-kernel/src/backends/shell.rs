//! Backend over an environment reachable only through shell commands.
//!
//! A provider implements [`RemoteShell`]: run a command, plus batch
//! upload/download. [`ShellBackend`] synthesizes every file operation as a
//! single `python3 -c` script run through [`RemoteShell::execute`], so each
//! operation costs exactly one round trip.
//!
//! Scripts are fixed text wrapped in single quotes. Every payload (paths,
//! content, search strings, patterns) travels as a base64 argument, so no
//! user data is ever interpreted by the remote shell.
//!
//! Exit status conventions:
//!
//! | Script | 0 | 1 | 2 | 3 |
//! |--------|---|---|---|---|
//! | write  | written | path exists | | |
//! | edit   | replaced (count on stdout) | string not found | ambiguous (count on stdout) | file missing |

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use kura_types::{
    DownloadResponse, ExecuteResponse, ListEntry, OperationResult, SearchMatch, UploadResponse,
};

use crate::backend::{Sandbox, StorageBackend, TextSearch};
use crate::error::StorageResult;
use crate::format;
use crate::glob::NameFilter;

/// Command execution plus bulk transfer for one remote environment.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Identifier of the environment.
    fn id(&self) -> &str;

    /// Run a shell command. Output is combined stdout and stderr.
    ///
    /// Errors are reserved for a broken channel; a failing command is an
    /// `Ok` response with a non-zero exit code.
    async fn execute(&self, command: &str) -> StorageResult<ExecuteResponse>;

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>>;

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>>;
}

// ============================================================================
// Scripts
// ============================================================================

const LS_SCRIPT: &str = r#"
import base64, json, os, sys
path = base64.b64decode(sys.argv[1]).decode("utf-8")
try:
    with os.scandir(path) as it:
        for entry in it:
            is_dir = entry.is_dir(follow_symlinks=False)
            st = entry.stat(follow_symlinks=False)
            print(json.dumps(dict(path=entry.path, is_dir=is_dir, size=0 if is_dir else st.st_size, mtime=st.st_mtime)))
except (FileNotFoundError, NotADirectoryError, PermissionError):
    pass
"#;

const READ_SCRIPT: &str = r#"
import base64, json, os, sys
path = base64.b64decode(sys.argv[1]).decode("utf-8")
offset = int(base64.b64decode(sys.argv[2]).decode("ascii"))
limit = int(base64.b64decode(sys.argv[3]).decode("ascii"))
if not os.path.isfile(path):
    print(json.dumps(dict(status="missing")))
    sys.exit(0)
with open(path, encoding="utf-8", errors="replace", newline="") as f:
    text = f.read()
if not text.strip():
    print(json.dumps(dict(status="empty")))
    sys.exit(0)
lines = text.split("\n")
if text.endswith("\n"):
    lines.pop()
lines = [l[:-1] if l.endswith("\r") else l for l in lines]
print(json.dumps(dict(status="ok", total=len(lines), lines=lines[offset:offset + limit])))
"#;

const WRITE_SCRIPT: &str = r#"
import base64, os, sys
path = base64.b64decode(sys.argv[1]).decode("utf-8")
content = base64.b64decode(sys.argv[2]).decode("utf-8")
if os.path.lexists(path):
    sys.exit(1)
os.makedirs(os.path.dirname(path) or ".", exist_ok=True)
try:
    fd = os.open(path, os.O_WRONLY | os.O_CREAT | os.O_EXCL, 0o644)
except FileExistsError:
    sys.exit(1)
with os.fdopen(fd, "w", encoding="utf-8", newline="") as f:
    f.write(content)
"#;

const EDIT_SCRIPT: &str = r#"
import base64, sys
path = base64.b64decode(sys.argv[1]).decode("utf-8")
old = base64.b64decode(sys.argv[2]).decode("utf-8")
new = base64.b64decode(sys.argv[3]).decode("utf-8")
replace_all = base64.b64decode(sys.argv[4]) == b"1"
try:
    with open(path, encoding="utf-8", newline="") as f:
        text = f.read()
except (FileNotFoundError, IsADirectoryError, NotADirectoryError):
    sys.exit(3)
count = text.count(old) if old else 0
if count == 0:
    sys.exit(1)
if count > 1 and not replace_all:
    print(count)
    sys.exit(2)
text = text.replace(old, new) if replace_all else text.replace(old, new, 1)
with open(path, "w", encoding="utf-8", newline="") as f:
    f.write(text)
print(count)
"#;

const GLOB_SCRIPT: &str = r#"
import base64, glob, json, os, sys
base = base64.b64decode(sys.argv[1]).decode("utf-8")
pattern = base64.b64decode(sys.argv[2]).decode("utf-8")
if not os.path.isdir(base):
    sys.exit(0)
os.chdir(base)
for rel in sorted(glob.glob(pattern, recursive=True)):
    if not os.path.isfile(rel):
        continue
    st = os.stat(rel)
    print(json.dumps(dict(path=os.path.join(base, rel), is_dir=False, size=st.st_size, mtime=st.st_mtime)))
"#;

const GREP_SCRIPT: &str = r#"
import base64, json, os, sys
pattern = base64.b64decode(sys.argv[1]).decode("utf-8")
base = base64.b64decode(sys.argv[2]).decode("utf-8")
def scan(path):
    try:
        with open(path, encoding="utf-8") as f:
            for number, line in enumerate(f, 1):
                if line.endswith("\n"):
                    line = line[:-1]
                if pattern in line:
                    print(json.dumps(dict(path=path, line=number, text=line)))
    except (OSError, UnicodeDecodeError):
        pass
if os.path.isfile(base):
    scan(base)
else:
    for root, dirs, files in os.walk(base):
        dirs.sort()
        for name in sorted(files):
            scan(os.path.join(root, name))
"#;

/// `python3 -c '<script>' '<b64 arg>'...`, with stderr discarded or merged.
fn python_command(script: &str, args: &[&[u8]], merge_stderr: bool) -> String {
    let mut cmd = format!("python3 -c '{}'", script);
    for arg in args {
        cmd.push_str(" '");
        cmd.push_str(&STANDARD.encode(arg));
        cmd.push('\'');
    }
    cmd.push_str(if merge_stderr { " 2>&1" } else { " 2>/dev/null" });
    cmd
}

// ============================================================================
// Script output
// ============================================================================

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    path: String,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    mtime: Option<f64>,
}

impl RemoteEntry {
    fn into_entry(self) -> ListEntry {
        if self.is_dir {
            let mut entry = ListEntry::directory(self.path);
            entry.modified_at = self.mtime.and_then(epoch_secs);
            entry
        } else {
            ListEntry::file(self.path, self.size, self.mtime.and_then(epoch_secs))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteMatch {
    path: String,
    line: usize,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ReadReply {
    Ok { total: usize, lines: Vec<String> },
    Missing,
    Empty,
}

fn epoch_secs(secs: f64) -> Option<SystemTime> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .map(|d| UNIX_EPOCH + d)
}

/// Parse one JSON document per line, skipping anything that is not one.
fn json_lines<T: DeserializeOwned>(output: &str) -> Vec<T> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring non-JSON script output line");
                None
            }
        })
        .collect()
}

// ============================================================================
// Backend
// ============================================================================

/// File operations synthesized over a [`RemoteShell`].
#[derive(Debug, Clone)]
pub struct ShellBackend<S> {
    shell: S,
}

impl<S: RemoteShell> ShellBackend<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    async fn run(&self, command: String) -> StorageResult<ExecuteResponse> {
        tracing::trace!(shell = self.shell.id(), len = command.len(), "running script");
        self.shell.execute(&command).await
    }
}

#[async_trait]
impl<S: RemoteShell> StorageBackend for ShellBackend<S> {
    fn name(&self) -> &str {
        "shell"
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<ListEntry>> {
        let reply = self
            .run(python_command(LS_SCRIPT, &[path.as_bytes()], false))
            .await?;
        let mut entries: Vec<ListEntry> = json_lines::<RemoteEntry>(&reply.output)
            .into_iter()
            .map(RemoteEntry::into_entry)
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> StorageResult<String> {
        let offset_arg = offset.to_string();
        let limit_arg = limit.to_string();
        let reply = self
            .run(python_command(
                READ_SCRIPT,
                &[path.as_bytes(), offset_arg.as_bytes(), limit_arg.as_bytes()],
                false,
            ))
            .await?;

        if !reply.succeeded() {
            return Ok(format::file_not_found(path));
        }
        Ok(match serde_json::from_str::<ReadReply>(reply.output.trim()) {
            Ok(ReadReply::Missing) => format::file_not_found(path),
            Ok(ReadReply::Empty) => format::EMPTY_CONTENT_WARNING.to_string(),
            Ok(ReadReply::Ok { total, .. }) if offset >= total => {
                format::offset_past_end(offset, total)
            }
            Ok(ReadReply::Ok { lines, .. }) => format::format_with_line_numbers(&lines, offset + 1),
            Err(_) => format!("Error reading file '{}': {}", path, reply.output.trim()),
        })
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
        let base = path.unwrap_or(".");
        let reply = self
            .run(python_command(
                GREP_SCRIPT,
                &[pattern.as_bytes(), base.as_bytes()],
                false,
            ))
            .await?;

        let mut matches: Vec<SearchMatch> = json_lines::<RemoteMatch>(&reply.output)
            .into_iter()
            .filter(|m| {
                let relative = crate::glob::relative_to(&m.path, base)
                    .unwrap_or_else(|| crate::glob::basename(&m.path));
                filter.matches(relative)
            })
            .map(|m| SearchMatch::new(m.path, m.line, m.text))
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        Ok(Ok(matches))
    }

    async fn search_glob(&self, pattern: &str, path: &str) -> StorageResult<Vec<ListEntry>> {
        let reply = self
            .run(python_command(
                GLOB_SCRIPT,
                &[path.as_bytes(), pattern.as_bytes()],
                false,
            ))
            .await?;
        let mut entries: Vec<ListEntry> = json_lines::<RemoteEntry>(&reply.output)
            .into_iter()
            .map(RemoteEntry::into_entry)
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn write(&self, path: &str, content: &str) -> StorageResult<OperationResult> {
        let reply = self
            .run(python_command(
                WRITE_SCRIPT,
                &[path.as_bytes(), content.as_bytes()],
                true,
            ))
            .await?;
        Ok(match reply.exit_code {
            Some(0) => OperationResult::written(path),
            Some(1) => OperationResult::failed(format::already_exists(path)),
            _ => {
                let detail = reply.output.trim();
                OperationResult::failed(if detail.is_empty() {
                    format!("Failed to write file '{}'", path)
                } else {
                    format!("Error writing file '{}': {}", path, detail)
                })
            }
        })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> StorageResult<OperationResult> {
        let flag: &[u8] = if replace_all { b"1" } else { b"0" };
        let reply = self
            .run(python_command(
                EDIT_SCRIPT,
                &[path.as_bytes(), old.as_bytes(), new.as_bytes(), flag],
                true,
            ))
            .await?;
        let count = reply.output.trim().parse::<usize>();

        Ok(match reply.exit_code {
            Some(0) => match count {
                Ok(n) => OperationResult::edited(path, n),
                Err(_) => OperationResult::failed(format!(
                    "Error editing file '{}': {}",
                    path,
                    reply.output.trim()
                )),
            },
            Some(1) => OperationResult::failed(format::string_not_found(old)),
            Some(2) => OperationResult::failed(format::ambiguous_match(old, count.unwrap_or(2))),
            _ => OperationResult::failed(format::file_not_found(path)),
        })
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<Vec<UploadResponse>> {
        self.shell.upload_batch(files).await
    }

    async fn download_batch(&self, paths: Vec<String>) -> StorageResult<Vec<DownloadResponse>> {
        self.shell.download_batch(paths).await
    }

    fn as_sandbox(&self) -> Option<&dyn Sandbox> {
        Some(self)
    }
}

#[async_trait]
impl<S: RemoteShell> Sandbox for ShellBackend<S> {
    fn id(&self) -> &str {
        self.shell.id()
    }

    async fn execute(&self, command: &str) -> StorageResult<ExecuteResponse> {
        self.shell.execute(command).await
    }
}
