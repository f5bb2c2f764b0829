//! Encrypted at-rest storage for the session cookie set.
//!
//! Files are sealed with a random per-install key held by the OS secret
//! store for the current user, so a copied file or another local account
//! reads as "no credentials".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use tracing::{debug, info, warn};

use crate::errors::TrackerError;
use crate::keystore::{self, KEY_LEN};
use crate::models::CredentialSet;

pub const COOKIE_FILE: &str = "cookies";

const MAGIC: &[u8; 4] = b"LWT2";
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + NONCE_LEN;

/// Encryption scope bound to a secret only the current user can read.
#[derive(Clone)]
pub struct LocalScope {
    key: Key,
}

impl LocalScope {
    /// Loads the key from the OS secret store, creating it on first use.
    pub async fn current(data_dir: &Path) -> Result<Self, TrackerError> {
        let data_dir = data_dir.to_path_buf();
        let key = tokio::task::spawn_blocking(move || keystore::load_or_create_key(&data_dir))
            .await
            .map_err(|err| TrackerError::Other(format!("key lookup task failed: {err}")))??;
        Ok(Self::from_key(key))
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: Key::from(key),
        }
    }

    /// Scope with a fresh random key that is not stored anywhere.
    pub fn generate() -> Self {
        Self::from_key(keystore::random_key())
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, TrackerError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|_| TrackerError::Crypto("encryption failed".into()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, TrackerError> {
        if sealed.len() < HEADER_LEN || !sealed.starts_with(MAGIC) {
            return Err(TrackerError::Crypto("unrecognized credential file".into()));
        }
        let (nonce, ciphertext) = sealed[MAGIC.len()..].split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TrackerError::Crypto("credential file was sealed with another key".into()))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(&self.key)
    }
}

pub struct CredentialStore {
    path: PathBuf,
    scope: LocalScope,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, scope: LocalScope) -> Self {
        Self {
            path: path.into(),
            scope,
        }
    }

    /// Store at `<dir>/cookies` sealed with the current user's key.
    pub async fn in_dir(dir: &Path) -> Result<Self, TrackerError> {
        let scope = LocalScope::current(dir).await?;
        Ok(Self::new(dir.join(COOKIE_FILE), scope))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when nothing usable is stored. Unreadable, foreign or
    /// corrupt files are logged and treated the same as a missing one.
    pub fn load(&self) -> Option<CredentialSet> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored cookies");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read stored cookies");
                return None;
            }
        };
        let plaintext = match self.scope.open(&raw) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(error = %err, "stored cookies could not be decrypted");
                return None;
            }
        };
        match serde_json::from_slice::<CredentialSet>(&plaintext) {
            Ok(set) if !set.is_empty() => {
                info!(count = set.len(), "cookies loaded");
                Some(set)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "stored cookies are malformed");
                None
            }
        }
    }

    /// Replaces any previously stored set.
    pub fn save(&self, credentials: &CredentialSet) -> Result<(), TrackerError> {
        let json = serde_json::to_vec(credentials)
            .map_err(|err| TrackerError::Other(format!("failed to serialize cookies: {err}")))?;
        let sealed = self.scope.seal(&json)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), "cookies saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), TrackerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn alice() -> LocalScope {
        LocalScope::from_key([0xA1; KEY_LEN])
    }

    fn sample() -> CredentialSet {
        CredentialSet::parse_header("auth=authcookie_123; twoFactorAuth=tfa_456")
    }

    #[test]
    fn save_then_load_returns_same_set() {
        let dir = tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("cookies"), alice());
        store.save(&sample()).expect("save");
        assert_eq!(store.load(), Some(sample()));

        let raw = fs::read(store.path()).expect("raw");
        assert!(!String::from_utf8_lossy(&raw).contains("authcookie_123"));
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("cookies"), alice());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn other_scope_cannot_read() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cookies");
        CredentialStore::new(&path, alice())
            .save(&sample())
            .expect("save");
        let mallory = CredentialStore::new(&path, LocalScope::generate());
        assert_eq!(mallory.load(), None);
        assert!(alice().open(&fs::read(&path).expect("raw")).is_ok());
    }

    #[test]
    fn file_is_only_readable_with_the_stored_key() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cookies");
        let owner = LocalScope::generate();
        CredentialStore::new(&path, owner.clone())
            .save(&sample())
            .expect("save");

        for _ in 0..3 {
            let guess = CredentialStore::new(&path, LocalScope::generate());
            assert_eq!(guess.load(), None);
        }
        assert_eq!(CredentialStore::new(&path, owner).load(), Some(sample()));
    }

    #[test]
    fn legacy_layout_is_rejected() {
        let mut sealed = b"LWT1".to_vec();
        sealed.extend_from_slice(&[0u8; 60]);
        assert!(matches!(alice().open(&sealed), Err(TrackerError::Crypto(_))));
    }

    #[test]
    fn corrupt_or_empty_content_is_absent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cookies");
        let scope = alice();
        fs::write(&path, b"not encrypted at all").expect("write");
        let store = CredentialStore::new(&path, scope.clone());
        assert_eq!(store.load(), None);

        fs::write(&path, scope.seal(b"{}").expect("seal")).expect("write");
        assert_eq!(store.load(), None);

        fs::write(&path, scope.seal(b"[1,2,3]").expect("seal")).expect("write");
        assert_eq!(store.load(), None);
    }

    #[test]
    fn save_overwrites_and_clear_removes() {
        let dir = tempdir().expect("tempdir");
        let store = CredentialStore::new(dir.path().join("nested").join("cookies"), alice());
        store.save(&sample()).expect("save");
        let replacement = CredentialSet::parse_header("auth=new");
        store.save(&replacement).expect("save again");
        assert_eq!(store.load(), Some(replacement));

        store.clear().expect("clear");
        assert_eq!(store.load(), None);
        store.clear().expect("clear twice");
    }
}
