//! Per-phone credential directory handed to pairing clients.

use super::PhoneNumber;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use whatsapp_client::{CredentialStore, WhatsAppError};

/// Credentials file written inside each phone directory.
const CREDS_FILE: &str = "creds.json";

/// Credential directory for one phone number: `<root>/<phone>/creds.json`.
///
/// The content is opaque here; it is written by the pairing client and read
/// back verbatim for the confirmation message.
#[derive(Debug, Clone)]
pub struct AuthDir {
    dir: PathBuf,
}

impl AuthDir {
    /// Credential directory for `phone` under `root`.
    pub fn new(root: &Path, phone: &PhoneNumber) -> Self {
        Self {
            dir: root.join(phone.as_str()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Read the credentials file as-is.
    pub async fn read_raw(&self) -> std::io::Result<String> {
        fs::read_to_string(self.creds_path()).await
    }
}

#[async_trait]
impl CredentialStore for AuthDir {
    async fn load(&self) -> Result<Option<Value>, WhatsAppError> {
        let path = self.creds_path();
        if !fs::try_exists(&path)
            .await
            .map_err(|e| WhatsAppError::Credentials(e.to_string()))?
        {
            debug!("No credentials at {:?}, starting a fresh link", path);
            return Ok(None);
        }

        let data = fs::read(&path)
            .await
            .map_err(|e| WhatsAppError::Credentials(e.to_string()))?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    async fn save(&self, creds: &Value) -> Result<(), WhatsAppError> {
        let data = serde_json::to_vec_pretty(creds)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WhatsAppError::Credentials(e.to_string()))?;

        // Write atomically using temp file + rename
        let path = self.creds_path();
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &data)
            .await
            .map_err(|e| WhatsAppError::Credentials(e.to_string()))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| WhatsAppError::Credentials(e.to_string()))?;

        debug!("Saved credentials ({} bytes) to {:?}", data.len(), path);
        Ok(())
    }
}
