//! Password-at-rest: a Fernet-style construction (128-bit AES-CBC + HMAC-SHA256) over a
//! process-bound key loaded from a keyfile created on first use (`spec.md` §6).
//!
//! No crate in the reference corpus implements this exact construction, but the corpus's
//! `hmac`/`sha2` pairing (used for exchange request signing in `barter-execution`'s Bybit
//! client) is the idiomatic building block; we add `aes`/`cbc` for the encryption half and
//! compose them by hand the way Fernet itself is specified.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::warn;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("failed to read keyfile at {path}: {source}")]
    ReadKeyfile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write keyfile at {path}: {source}")]
    WriteKeyfile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("keyfile at {path} has unexpected length {len}, expected {KEY_LEN}")]
    MalformedKeyfile { path: PathBuf, len: usize },
}

/// The process-bound symmetric key, held only in memory after load.
#[derive(Clone)]
pub struct CryptoKey {
    signing_key: [u8; 16],
    encryption_key: [u8; 16],
}

impl CryptoKey {
    fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        let mut signing_key = [0u8; 16];
        let mut encryption_key = [0u8; 16];
        signing_key.copy_from_slice(&bytes[..16]);
        encryption_key.copy_from_slice(&bytes[16..]);
        Self {
            signing_key,
            encryption_key,
        }
    }

    /// Loads the key from `path`, creating a fresh random keyfile with `0600` permissions on
    /// first use (`spec.md` §6).
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let bytes = fs::read(path).map_err(|source| CryptoError::ReadKeyfile {
                path: path.to_path_buf(),
                source,
            })?;
            if bytes.len() != KEY_LEN {
                return Err(CryptoError::MalformedKeyfile {
                    path: path.to_path_buf(),
                    len: bytes.len(),
                });
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&bytes);
            if detect_rotation(path)? {
                warn!(
                    path = %path.display(),
                    "keyfile changed since last run, previously stored passwords will fail to decrypt and fall back to plaintext"
                );
            }
            return Ok(Self::from_bytes(&key));
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);

        fs::write(path, key).map_err(|source| CryptoError::WriteKeyfile {
            path: path.to_path_buf(),
            source,
        })?;
        set_owner_only_perms(path)?;
        detect_rotation(path)?;

        Ok(Self::from_bytes(&key))
    }

    /// Encrypts `plaintext`, returning a base64 token of `iv || ciphertext || mac`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext =
            Aes128CbcEnc::new(&self.encryption_key.into(), &iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts any key length");
        mac.update(&iv);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut token = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        token.extend_from_slice(&tag);

        STANDARD.encode(token)
    }

    /// Decrypts a token produced by [`encrypt`](Self::encrypt). Per `spec.md` §8's round-trip
    /// property, a malformed or tampered token is returned unchanged rather than erroring — the
    /// caller (config loading) is expected to fall back to treating it as a last-known-good
    /// plaintext password, matching §6's "rotating the keyfile invalidates stored passwords,
    /// which then fall back to the last-known-good plaintext".
    pub fn decrypt(&self, token: &str) -> String {
        self.try_decrypt(token).unwrap_or_else(|| token.to_string())
    }

    fn try_decrypt(&self, token: &str) -> Option<String> {
        let raw = STANDARD.decode(token).ok()?;
        if raw.len() < IV_LEN + MAC_LEN {
            return None;
        }

        let (iv_and_ciphertext, tag) = raw.split_at(raw.len() - MAC_LEN);
        let (iv, ciphertext) = iv_and_ciphertext.split_at(IV_LEN);

        let mut mac = HmacSha256::new_from_slice(&self.signing_key).ok()?;
        mac.update(iv);
        mac.update(ciphertext);
        mac.verify_slice(tag).ok()?;

        let mut buf = ciphertext.to_vec();
        let iv_arr: [u8; IV_LEN] = iv.try_into().ok()?;
        let plaintext = Aes128CbcDec::new(&self.encryption_key.into(), &iv_arr.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .ok()?;

        String::from_utf8(plaintext.to_vec()).ok()
    }
}

fn marker_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".mtime");
    PathBuf::from(os)
}

/// Compares the keyfile's current modification time against the one recorded by the last call
/// to [`CryptoKey::load_or_create`] for this `path`, then updates the record to the current
/// time. Returns `true` when a prior record existed and no longer matches, i.e. the keyfile was
/// replaced out from under a running deployment (`spec.md` §6's "rotating the keyfile
/// invalidates stored passwords"). Returns `false` the first time a given `path` is seen.
fn detect_rotation(path: &Path) -> Result<bool, CryptoError> {
    let metadata = fs::metadata(path).map_err(|source| CryptoError::ReadKeyfile {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = metadata.modified().map_err(|source| CryptoError::ReadKeyfile {
        path: path.to_path_buf(),
        source,
    })?;
    let current = modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

    let marker = marker_path(path);
    let recorded = fs::read_to_string(&marker)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok());

    fs::write(&marker, current.to_string()).map_err(|source| CryptoError::WriteKeyfile {
        path: marker.clone(),
        source,
    })?;

    Ok(matches!(recorded, Some(prev) if prev != current))
}

#[cfg(unix)]
fn set_owner_only_perms(path: &Path) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        CryptoError::WriteKeyfile {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_owner_only_perms(_path: &Path) -> Result<(), CryptoError> {
    Ok(())
}
