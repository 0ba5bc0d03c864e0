//! Shared storage types for kura.
//!
//! This crate is the data foundation every backend speaks: file records,
//! listing entries, search matches, write/edit outcomes and the batch
//! response taxonomy. It has **no internal kura dependencies**.
//!
//! # Key Types
//!
//! |----------------------|-------------------------------------------------|
//! | Type                 | Purpose                                         |
//! |----------------------|-------------------------------------------------|
//! | [`FileRecord`]       | Stored content as lines plus timestamps         |
//! | [`FileUpdate`]       | Explicit set/delete delta for shared state      |
//! | [`ListEntry`]        | One row of a directory listing or glob result   |
//! | [`SearchMatch`]      | One matching line (path, 1-indexed line, text)  |
//! | [`OperationResult`]  | Outcome of write/edit, errors carried as data   |
//! | [`FileOperationError`] | Machine-readable batch failure code           |
//! | [`UploadResponse`]   | Per-item upload outcome                         |
//! | [`DownloadResponse`] | Per-item download outcome                       |
//! | [`ExecuteResponse`]  | Output of a shell command                       |
//! |----------------------|-------------------------------------------------|

pub mod entry;
pub mod record;
pub mod result;

pub use entry::{ListEntry, SearchMatch};
pub use record::{FileRecord, FileUpdate};
pub use result::{
    DownloadResponse, ExecuteResponse, FileOperationError, OperationResult, UploadResponse,
};
