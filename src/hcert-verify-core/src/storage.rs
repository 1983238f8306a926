//! Encrypted blob storage for dataset payloads and state.
//!
//! Datasets persist through a [`BlobStore`] (a flat name → bytes map) wrapped
//! in a [`SealedStore`] that applies XChaCha20-Poly1305 with a per-dataset
//! key. The stored format is `nonce (24 bytes) || ciphertext`, and the blob
//! name is bound in as associated data so blobs cannot be swapped between
//! names.

// Allow deprecated from_slice until chacha20poly1305 upgrades to generic-array 1.x
#![allow(deprecated)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::error::VerifyError;

/// XChaCha20-Poly1305 nonce size (24 bytes)
const NONCE_SIZE: usize = 24;

/// Durable name → bytes storage.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous blob.
    fn save(&self, name: &str, data: &[u8]) -> Result<(), VerifyError>;

    /// Load the blob stored under `name`.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError>;

    /// Remove the blob stored under `name`, if any.
    fn delete(&self, name: &str) -> Result<(), VerifyError>;
}

/// One file per blob inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> Result<PathBuf, VerifyError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(VerifyError::storage(format!("invalid blob name {name:?}")));
        }
        Ok(self.dir.join(name))
    }
}

impl BlobStore for FileBlobStore {
    fn save(&self, name: &str, data: &[u8]) -> Result<(), VerifyError> {
        let path = self.path(name)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| VerifyError::storage(format!("create {}: {e}", self.dir.display())))?;
        std::fs::write(&path, data)
            .map_err(|e| VerifyError::storage(format!("write {}: {e}", path.display())))
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError> {
        let path = self.path(name)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VerifyError::storage(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    fn delete(&self, name: &str) -> Result<(), VerifyError> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VerifyError::storage(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-process store, for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently stored.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&self, name: &str, data: &[u8]) -> Result<(), VerifyError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| VerifyError::storage("Failed to acquire store lock"))?;
        blobs.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| VerifyError::storage("Failed to acquire store lock"))?;
        Ok(blobs.get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<(), VerifyError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| VerifyError::storage("Failed to acquire store lock"))?;
        blobs.remove(name);
        Ok(())
    }
}

/// A [`BlobStore`] view that seals every blob under one dataset key.
#[derive(Clone)]
pub struct SealedStore {
    inner: Arc<dyn BlobStore>,
    encryption_key: [u8; 32],
}

impl std::fmt::Debug for SealedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedStore").finish_non_exhaustive()
    }
}

impl SealedStore {
    /// Create a sealed view keyed by `secret` and the dataset `alias`.
    pub fn new(inner: Arc<dyn BlobStore>, secret: &[u8], alias: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"hcert-dataset-key:");
        hasher.update(secret);
        hasher.update(b":");
        hasher.update(alias.as_bytes());
        let encryption_key: [u8; 32] = hasher.finalize().into();

        Self {
            inner,
            encryption_key,
        }
    }

    /// Seal and store `plaintext` under `name`.
    pub fn save(&self, name: &str, plaintext: &[u8]) -> Result<(), VerifyError> {
        let sealed = self.encrypt(name, plaintext)?;
        self.inner.save(name, &sealed)?;
        debug!(name = %name, len = plaintext.len(), "Store: saved sealed blob");
        Ok(())
    }

    /// Load and unseal the blob under `name`.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionError` if the blob fails authentication (wrong key,
    /// tampering, or a blob written under another name).
    pub fn load(&self, name: &str) -> Result<Option<Vec<u8>>, VerifyError> {
        match self.inner.load(name)? {
            Some(sealed) => self.decrypt(name, &sealed).map(Some),
            None => Ok(None),
        }
    }

    /// Remove the blob under `name`.
    pub fn delete(&self, name: &str) -> Result<(), VerifyError> {
        self.inner.delete(name)
    }

    /// Encrypt data using XChaCha20-Poly1305 authenticated encryption.
    ///
    /// Returns nonce || ciphertext (24 bytes nonce prepended to ciphertext).
    fn encrypt(&self, name: &str, plaintext: &[u8]) -> Result<Vec<u8>, VerifyError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.encryption_key).map_err(|e| {
            VerifyError::EncryptionError {
                message: format!("cipher init: {e}"),
            }
        })?;

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| VerifyError::EncryptionError {
                message: format!("seal {name}: {e}"),
            })?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        trace!(
            plaintext_len = plaintext.len(),
            ciphertext_len = result.len(),
            "Store: encrypted data"
        );

        Ok(result)
    }

    /// Decrypt data using XChaCha20-Poly1305 authenticated encryption.
    ///
    /// Expects nonce || ciphertext format.
    fn decrypt(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, VerifyError> {
        if data.len() < NONCE_SIZE {
            warn!(
                name = %name,
                data_len = data.len(),
                "Store: data too short to contain nonce"
            );
            return Err(VerifyError::EncryptionError {
                message: format!("{name}: blob too short"),
            });
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.encryption_key).map_err(|e| {
            VerifyError::EncryptionError {
                message: format!("cipher init: {e}"),
            }
        })?;

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| {
                warn!(name = %name, "Store: decryption failed (possible tampering): {}", e);
                VerifyError::EncryptionError {
                    message: format!("unseal {name}: {e}"),
                }
            })
    }
}
