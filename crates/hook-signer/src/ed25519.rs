//! Native Ed25519 receipt signer: a single on-disk keypair, shared across
//! every receipt regardless of task index.

use std::path::Path;

use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::SignerError;
use crate::keys::{self, KeyStore};
use crate::ReceiptSigner;

const KEY_FILE: &str = "ed25519.key";
const KEY_PATH_LABEL: &str = "native-ed25519-v1";

/// Ed25519 signer backed by a singleton 64-byte keypair persisted as hex.
pub struct NativeEd25519Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl NativeEd25519Signer {
    fn from_keypair_bytes(bytes: &[u8; 64]) -> Self {
        let signing_key = SigningKey::from_keypair_bytes(bytes).expect("fixed-size keypair bytes");
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Loads the key at `store`, generating and persisting one on first use.
    /// Idempotent: a second call against the same store reloads the same key.
    pub fn load(store: &KeyStore) -> Result<Self, SignerError> {
        keys::ensure_key_dir(&store.dir)?;
        let path = store.key_path(KEY_FILE);
        if let Some(existing) = keys::read_hex_key(&path)? {
            let bytes: [u8; 64] = existing
                .try_into()
                .map_err(|_| SignerError::KeyGeneration(format!("malformed key at {}", path.display())))?;
            return Ok(Self::from_keypair_bytes(&bytes));
        }
        let signing_key = SigningKey::generate(&mut OsRng);
        let bytes = signing_key.to_keypair_bytes();
        keys::write_hex_key(&path, &bytes)?;
        Ok(Self {
            verifying_key: signing_key.verifying_key(),
            signing_key,
        })
    }

    fn digest(msg: &[u8]) -> [u8; 32] {
        Sha256::digest(msg).into()
    }
}

impl ReceiptSigner for NativeEd25519Signer {
    fn sign_at(&self, msg: &[u8], _task_index: u32) -> Result<Vec<u8>, SignerError> {
        let digest = Self::digest(msg);
        let sig: Signature = self.signing_key.sign(&digest);
        Ok(sig.to_bytes().to_vec())
    }

    fn verify_at(&self, msg: &[u8], sig: &[u8], _task_index: u32) -> Result<(), SignerError> {
        let digest = Self::digest(msg);
        let sig_bytes: [u8; 64] = sig
            .try_into()
            .map_err(|_| SignerError::SignatureDecodeError)?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.verifying_key
            .verify(&digest, &signature)
            .map_err(|_| SignerError::InvalidSignature)
    }

    fn key_path(&self, _task_index: u32) -> String {
        KEY_PATH_LABEL.to_string()
    }

    fn index_for_key_path(&self, key_path: &str) -> Result<u32, SignerError> {
        if key_path == KEY_PATH_LABEL {
            Ok(0)
        } else {
            Err(SignerError::InvalidKeyPath(key_path.to_string()))
        }
    }
}

/// Convenience constructor used by the Manager's default wiring: loads or
/// creates the singleton key under `key_dir`.
pub fn load_signer(key_dir: impl AsRef<Path>) -> Result<NativeEd25519Signer, SignerError> {
    NativeEd25519Signer::load(&KeyStore::new(key_dir.as_ref()))
}
