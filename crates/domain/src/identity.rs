//! Ed25519 identity for an agent host.
//!
//! An address is the `0x`-prefixed hex encoding of the Ed25519 public key.
//! The seed lives at `<co_dir>/keys/agent.key` as 64 hex characters; it is
//! generated on first run and reused across restarts so the address stays
//! stable.
//!
//! Key-file handling:
//! - On Unix the file is created atomically with `O_CREAT | O_EXCL` and
//!   mode 0o600, so the seed is never world-readable, not even briefly.
//! - Reads refuse symlinks, so a planted link cannot redirect the host to
//!   attacker-controlled key material.
//! - Seed buffers are wrapped in `Zeroizing` and the signing key is wiped
//!   on drop.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

const KEY_FILE: &str = "keys/agent.key";

/// The host's signing identity: key pair plus derived address.
///
/// The secret key is zeroized on drop so key material does not linger in
/// freed memory.
#[derive(ZeroizeOnDrop)]
pub struct AgentKeys {
    signing_key: SigningKey,
    #[zeroize(skip)] // public information, derived from the verifying key
    address: String,
}

impl AgentKeys {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Rebuild an identity from a 32-byte seed. The caller's copy is
    /// cleared before returning.
    pub fn from_seed(mut seed: [u8; 32]) -> Self {
        let keys = Self::from_signing_key(SigningKey::from_bytes(&seed));
        seed.zeroize();
        keys
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = format!("0x{}", hex::encode(signing_key.verifying_key().as_bytes()));
        Self {
            signing_key,
            address,
        }
    }

    /// Load the identity stored under `co_dir`, if any. Refuses to follow a
    /// symlink at the key path.
    pub fn load(co_dir: &Path) -> Result<Option<Self>> {
        let path = co_dir.join(KEY_FILE);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if meta.file_type().is_symlink() {
            return Err(Error::Crypto(format!(
                "refusing to read key file {}: path is a symlink",
                path.display()
            )));
        }

        let raw = Zeroizing::new(fs::read_to_string(&path)?);
        let bytes = Zeroizing::new(hex::decode(raw.trim()).map_err(|e| {
            Error::Crypto(format!("malformed key file {}: {e}", path.display()))
        })?);
        let mut seed = [0u8; 32];
        if bytes.len() != seed.len() {
            return Err(Error::Crypto(format!(
                "key file {} is not 32 bytes",
                path.display()
            )));
        }
        seed.copy_from_slice(&bytes);
        Ok(Some(Self::from_seed(seed)))
    }

    /// Persist the seed under `co_dir`, creating directories as needed.
    ///
    /// The file is created in a single syscall with owner-only permissions
    /// (`O_CREAT | O_EXCL`, mode 0o600 on Unix); an existing key file is
    /// never overwritten.
    pub fn save(&self, co_dir: &Path) -> Result<PathBuf> {
        let path = co_dir.join(KEY_FILE);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;

        let encoded = Zeroizing::new(hex::encode(self.signing_key.to_bytes()));
        file.write_all(encoded.as_bytes())?;
        Ok(path)
    }

    /// Load the stored identity or generate and persist a new one.
    pub fn load_or_generate(co_dir: &Path) -> Result<Self> {
        if let Some(keys) = Self::load(co_dir)? {
            return Ok(keys);
        }
        let keys = Self::generate();
        let path = keys.save(co_dir)?;
        tracing::info!(address = %keys.address(), path = %path.display(), "generated new identity");
        Ok(keys)
    }

    /// The `0x`-prefixed hex address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Public key as bare hex (no `0x` prefix).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign a message, returning the signature as bare hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for AgentKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("AgentKeys")
            .field("address", &self.address)
            .finish()
    }
}

/// Strip an optional `0x` prefix from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Short display form of an address: the first 10 hex characters.
pub fn short_address(address: &str) -> String {
    strip_hex_prefix(address).chars().take(10).collect()
}

/// Verify an Ed25519 signature where key and signature are hex strings
/// (optional `0x` prefix). Malformed hex or wrong lengths verify as false.
pub fn verify_hex_signature(public_key: &str, message: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(strip_hex_prefix(public_key)) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(strip_hex_prefix(signature)) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(&sig_array))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_prefixed_pubkey_hex() {
        let keys = AgentKeys::generate();
        assert!(keys.address().starts_with("0x"));
        assert_eq!(keys.address().len(), 2 + 64);
        assert_eq!(strip_hex_prefix(keys.address()), keys.public_key_hex());
    }

    #[test]
    fn sign_verify_round_trip() {
        let keys = AgentKeys::generate();
        let sig = keys.sign_hex(b"hello");
        assert!(verify_hex_signature(&keys.public_key_hex(), b"hello", &sig));
        assert!(verify_hex_signature(keys.address(), b"hello", &sig));
        assert!(!verify_hex_signature(keys.address(), b"tampered", &sig));
    }

    #[test]
    fn prefixed_signature_accepted() {
        let keys = AgentKeys::generate();
        let sig = format!("0x{}", keys.sign_hex(b"msg"));
        assert!(verify_hex_signature(keys.address(), b"msg", &sig));
    }

    #[test]
    fn garbage_hex_is_invalid_not_panic() {
        assert!(!verify_hex_signature("zz", b"m", "00"));
        assert!(!verify_hex_signature("0xabcd", b"m", "nothex"));
    }

    #[test]
    fn short_address_is_ten_chars() {
        let keys = AgentKeys::generate();
        assert_eq!(short_address(keys.address()).len(), 10);
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = AgentKeys::load_or_generate(dir.path()).unwrap();
        let second = AgentKeys::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.address(), second.address());
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let keys = AgentKeys::load_or_generate(dir.path()).unwrap();
        assert!(keys.save(dir.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let keys = AgentKeys::generate();
        let path = keys.save(dir.path()).unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn load_refuses_symlinked_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("elsewhere.key");
        std::fs::write(&target, hex::encode([7u8; 32])).unwrap();

        let keys_dir = dir.path().join("keys");
        std::fs::create_dir_all(&keys_dir).unwrap();
        std::os::unix::fs::symlink(&target, keys_dir.join("agent.key")).unwrap();

        let err = AgentKeys::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("symlink"));
    }
}
