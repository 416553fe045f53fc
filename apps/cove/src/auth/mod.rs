pub mod credentials;
pub mod error;

pub use credentials::{CredentialsStore, IdentityCookies};
pub use error::AuthError;

use std::path::Path;

/// Reads the persisted identity marker. Absence, a malformed file, and an
/// undeterminable home directory are all "no identity", never an error.
pub fn probe() -> Option<String> {
    let path = CredentialsStore::path().ok()?;
    probe_at(&path)
}

pub fn probe_at(path: &Path) -> Option<String> {
    CredentialsStore::load_from(path)
        .ok()?
        .identity()
        .map(str::to_string)
}
