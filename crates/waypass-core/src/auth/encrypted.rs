use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::debug;

use super::{Session, SessionStore, StoreError};

/// File header identifying a sealed session record (format version 1)
const MAGIC: &[u8; 4] = b"WPS1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Session file name in the data directory
pub const SESSION_FILE: &str = "session.bin";

/// Session store for platforms without an OS keychain.
///
/// The record is sealed with ChaCha20-Poly1305 under a key derived from a
/// passphrase with Argon2. Layout: `MAGIC | salt | nonce | ciphertext`.
///
/// The derived key is cached per salt and later writes keep that salt with
/// a fresh nonce, so Argon2 runs once per store rather than once per access.
#[derive(Clone)]
pub struct EncryptedFileSessionStore {
    path: PathBuf,
    keys: Arc<KeyCache>,
}

impl EncryptedFileSessionStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl AsRef<[u8]>) -> Self {
        Self {
            path: path.into(),
            keys: Arc::new(KeyCache::new(passphrase.as_ref())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for EncryptedFileSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedFileSessionStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN], String> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|e| format!("key derivation failed: {}", e))?;
    Ok(key)
}

/// Passphrase plus the most recently derived `(salt, key)` pair.
struct KeyCache {
    passphrase: Box<[u8]>,
    derived: Mutex<Option<([u8; SALT_LEN], [u8; KEY_LEN])>>,
}

impl KeyCache {
    fn new(passphrase: &[u8]) -> Self {
        Self {
            passphrase: passphrase.into(),
            derived: Mutex::new(None),
        }
    }

    /// Key for reading a record sealed under `salt`.
    fn key_for(&self, salt: &[u8]) -> Result<[u8; KEY_LEN], String> {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_salt, key)) = derived.as_ref() {
            if cached_salt.as_slice() == salt {
                return Ok(*key);
            }
        }
        let key = derive_key(&self.passphrase, salt)?;
        let mut owned = [0u8; SALT_LEN];
        owned.copy_from_slice(salt);
        *derived = Some((owned, key));
        Ok(key)
    }

    /// Salt and key for a new write, deriving from a random salt on first use.
    fn for_write(&self) -> Result<([u8; SALT_LEN], [u8; KEY_LEN]), String> {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pair) = derived.as_ref() {
            return Ok(*pair);
        }
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(&self.passphrase, &salt)?;
        *derived = Some((salt, key));
        Ok((salt, key))
    }

    #[cfg(test)]
    fn cached_salt(&self) -> Option<[u8; SALT_LEN]> {
        self.derived
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(salt, _)| *salt)
    }
}

fn seal(keys: &KeyCache, plaintext: &[u8]) -> Result<Vec<u8>, String> {
    let (salt, key) = keys.for_write()?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| "encryption failed".to_string())?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(keys: &KeyCache, sealed: &[u8]) -> Result<Vec<u8>, StoreError> {
    if sealed.len() < HEADER_LEN || !sealed.starts_with(MAGIC) {
        return Err(StoreError::Corrupt("unrecognized session file".to_string()));
    }
    let salt = &sealed[MAGIC.len()..MAGIC.len() + SALT_LEN];
    let nonce = &sealed[MAGIC.len() + SALT_LEN..HEADER_LEN];

    let key = keys.key_for(salt).map_err(StoreError::read)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), &sealed[HEADER_LEN..])
        .map_err(|_| StoreError::Corrupt("session file failed authentication".to_string()))
}

impl SessionStore for EncryptedFileSessionStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        let path = self.path.clone();
        let keys = Arc::clone(&self.keys);

        tokio::task::spawn_blocking(move || -> Result<Option<Session>, StoreError> {
            let sealed = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(StoreError::read(e)),
            };
            let plaintext = open(&keys, &sealed)?;
            let session = serde_json::from_slice(&plaintext)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            Ok(Some(session))
        })
        .await?
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(session).map_err(StoreError::write)?;
        let path = self.path.clone();
        let keys = Arc::clone(&self.keys);

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let sealed = seal(&keys, &plaintext).map_err(StoreError::write)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(StoreError::write)?;
            }
            // Write-then-rename so a crash never leaves a half-written record
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, sealed).map_err(StoreError::write)?;
            std::fs::rename(&tmp, &path).map_err(StoreError::write)
        })
        .await??;

        debug!(path = %self.path.display(), "Session sealed to file");
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::delete(e)),
        })
        .await?
    }
}
