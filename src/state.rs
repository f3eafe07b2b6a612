use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Store;
use crate::files::FileStorage;
use crate::secured::{AesFieldCipher, CipherError, FieldCipher};

/// Shared handles every handler and service works through.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cipher: Arc<dyn FieldCipher>,
    pub files: FileStorage,
    pub self_authorship_guard: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Arc<dyn FieldCipher>,
        files: FileStorage,
        self_authorship_guard: bool,
    ) -> Self {
        Self {
            store,
            cipher,
            files,
            self_authorship_guard,
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn Store>) -> Result<Self, CipherError> {
        let cipher = AesFieldCipher::from_hex(&config.field_encryption_key)?;
        Ok(Self::new(
            store,
            Arc::new(cipher),
            FileStorage::new(config.media_root.clone()),
            config.self_authorship_guard,
        ))
    }
}
