//! Configuration resolution.
//!
//! [`SecretStore`] merges [`LocalSettings`] with secrets from a remote vault
//! into one immutable [`ConfigurationSnapshot`] shared by every component.

mod local;
mod snapshot;
mod store;

pub use local::LocalSettings;
pub use snapshot::{ConfigurationSnapshot, SnapshotSource};
pub use store::{SecretStore, merge_vault_secrets, vault_name_to_key};
