// Allow dead code: full credential lifecycle kept even where unused yet
#![allow(dead_code)]

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "inkdesk";

/// OS-keychain storage for the password-mode credentials, keyed by OpenID.
/// QR sign-ins never touch this.
pub struct CredentialStore;

impl CredentialStore {
    /// Store the password for an OpenID in the OS keychain
    pub fn store(open_id: &str, password: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, open_id).context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve the password for an OpenID from the OS keychain
    pub fn get_password(open_id: &str) -> Result<String> {
        let entry =
            Entry::new(SERVICE_NAME, open_id).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete stored credentials for an OpenID
    pub fn delete(open_id: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, open_id).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Check if credentials exist for an OpenID
    pub fn has_credentials(open_id: &str) -> bool {
        if let Ok(entry) = Entry::new(SERVICE_NAME, open_id) {
            entry.get_password().is_ok()
        } else {
            false
        }
    }
}
