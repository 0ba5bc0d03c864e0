//! Concrete storage backends.
//!
//! | Backend | Storage | Side effects |
//! |---------|---------|--------------|
//! | [`EphemeralBackend`] | shared in-memory map | returned as [`FileUpdate`](kura_types::FileUpdate) |
//! | [`PersistentBackend`] | [`KeyValueStore`](crate::store::KeyValueStore) | none |
//! | [`LocalDiskBackend`] | host filesystem | none |
//! | [`ShellBackend`] | anything behind a [`RemoteShell`] | none |

pub mod ephemeral;
pub mod local;
pub mod local_shell;
pub mod persistent;
pub mod shell;

mod records;

pub use ephemeral::{EphemeralBackend, EphemeralState};
pub use local::LocalDiskBackend;
pub use local_shell::LocalShell;
pub use persistent::PersistentBackend;
pub use shell::{RemoteShell, ShellBackend};
