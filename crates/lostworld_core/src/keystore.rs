//! Per-install cookie key kept in the OS secret store.
//!
//! - Linux: Secret Service (GNOME Keyring / KWallet)
//! - macOS: login Keychain generic password
//! - Windows: key file wrapped with DPAPI for the current user
//!
//! The key is random and created on first use. Nothing it is derived from is
//! readable by other local users.

use std::path::Path;

use rand::RngCore;

use crate::errors::TrackerError;

pub const KEY_LEN: usize = 32;

#[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
const SERVICE: &str = "lost_world_tracker";
#[cfg_attr(not(any(target_os = "linux", target_os = "macos")), allow(dead_code))]
const ACCOUNT: &str = "cookie-key";

pub fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg_attr(
    not(any(target_os = "linux", target_os = "macos", target_os = "windows")),
    allow(dead_code)
)]
fn key_from_bytes(secret: &[u8]) -> Result<[u8; KEY_LEN], TrackerError> {
    <[u8; KEY_LEN]>::try_from(secret).map_err(|_| {
        TrackerError::Crypto(format!(
            "stored cookie key has {} bytes, expected {KEY_LEN}",
            secret.len()
        ))
    })
}

/// Returns the stored key, creating and storing a fresh one when none exists.
#[cfg(target_os = "linux")]
pub fn load_or_create_key(_data_dir: &Path) -> Result<[u8; KEY_LEN], TrackerError> {
    use std::collections::HashMap;

    use secret_service::blocking::SecretService;
    use secret_service::EncryptionType;

    fn unavailable(err: secret_service::Error) -> TrackerError {
        TrackerError::Crypto(format!("secret service unavailable: {err}"))
    }

    let ss = SecretService::connect(EncryptionType::Dh).map_err(unavailable)?;
    let attributes = HashMap::from([("application", SERVICE), ("purpose", ACCOUNT)]);

    let found = ss.search_items(attributes.clone()).map_err(unavailable)?;
    if let Some(item) = found.unlocked.first().or_else(|| found.locked.first()) {
        if found.unlocked.is_empty() {
            item.unlock().map_err(unavailable)?;
        }
        let secret = item.get_secret().map_err(unavailable)?;
        return key_from_bytes(&secret);
    }

    let key = random_key();
    let collection = ss.get_default_collection().map_err(unavailable)?;
    if collection.is_locked().map_err(unavailable)? {
        collection.unlock().map_err(unavailable)?;
    }
    collection
        .create_item(
            "Lost World Tracker cookie key",
            attributes,
            &key,
            true,
            "application/octet-stream",
        )
        .map_err(unavailable)?;
    Ok(key)
}

#[cfg(target_os = "macos")]
pub fn load_or_create_key(_data_dir: &Path) -> Result<[u8; KEY_LEN], TrackerError> {
    use security_framework::passwords::{get_generic_password, set_generic_password};

    // errSecItemNotFound
    const ITEM_NOT_FOUND: i32 = -25300;

    match get_generic_password(SERVICE, ACCOUNT) {
        Ok(secret) => key_from_bytes(&secret),
        Err(err) if err.code() == ITEM_NOT_FOUND => {
            let key = random_key();
            set_generic_password(SERVICE, ACCOUNT, &key)
                .map_err(|err| TrackerError::Crypto(format!("keychain write failed: {err}")))?;
            Ok(key)
        }
        Err(err) => Err(TrackerError::Crypto(format!("keychain unavailable: {err}"))),
    }
}

#[cfg(target_os = "windows")]
pub const KEY_FILE: &str = "cookies.key";

#[cfg(target_os = "windows")]
pub fn load_or_create_key(data_dir: &Path) -> Result<[u8; KEY_LEN], TrackerError> {
    use std::fs;
    use std::io;

    let path = data_dir.join(KEY_FILE);
    match fs::read(&path) {
        Ok(wrapped) => key_from_bytes(&dpapi::unprotect(&wrapped)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let key = random_key();
            fs::create_dir_all(data_dir)?;
            fs::write(&path, dpapi::protect(&key)?)?;
            Ok(key)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(target_os = "windows")]
mod dpapi {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HLOCAL;
    use windows::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPT_INTEGER_BLOB,
    };
    use windows::Win32::System::Memory::LocalFree;

    use crate::errors::TrackerError;

    pub fn protect(data: &[u8]) -> Result<Vec<u8>, TrackerError> {
        let blob_in = CRYPT_INTEGER_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        };
        let mut blob_out = CRYPT_INTEGER_BLOB::default();
        unsafe {
            CryptProtectData(&blob_in, PCWSTR::null(), None, None, None, 0, &mut blob_out)
                .map_err(|err| TrackerError::Crypto(format!("DPAPI protect failed: {err}")))?;
            Ok(take_blob(blob_out))
        }
    }

    pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, TrackerError> {
        let blob_in = CRYPT_INTEGER_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        };
        let mut blob_out = CRYPT_INTEGER_BLOB::default();
        unsafe {
            CryptUnprotectData(&blob_in, None, None, None, None, 0, &mut blob_out)
                .map_err(|err| TrackerError::Crypto(format!("DPAPI unprotect failed: {err}")))?;
            Ok(take_blob(blob_out))
        }
    }

    /// Copies a DPAPI output blob and frees the system allocation.
    unsafe fn take_blob(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
        let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();
        let _ = LocalFree(HLOCAL(blob.pbData as *mut _));
        bytes
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub fn load_or_create_key(_data_dir: &Path) -> Result<[u8; KEY_LEN], TrackerError> {
    Err(TrackerError::Crypto(
        "no OS secret store is supported on this platform".into(),
    ))
}
