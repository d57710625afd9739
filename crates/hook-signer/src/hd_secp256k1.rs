//! Hierarchical-deterministic secp256k1 receipt signer. One master extended
//! key is persisted on disk; every receipt is signed with a key derived
//! along `m/44'/236'/0'/<task_index>` (first three levels hardened, the
//! last non-hardened so verifiers can re-derive from a public-only path if
//! ever needed).

use std::path::Path;

use bip32::{DerivationPath, XPrv};
use k256::ecdsa::signature::{Signer as EcdsaSigner, Verifier as EcdsaVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::SignerError;
use crate::keys::{self, KeyStore};
use crate::ReceiptSigner;

const SEED_FILE: &str = "hd-secp256k1.seed";
const SEED_LEN: usize = 32;
const COIN_TYPE: u32 = 236;

fn derivation_path(task_index: u32) -> String {
    format!("m/44'/{COIN_TYPE}'/0'/{task_index}")
}

/// Clamps a receipt count that would otherwise overflow `u32` to
/// `u32::MAX` rather than wrapping back to a previously used index.
pub fn clamp_task_index(receipt_count: usize) -> u32 {
    u32::try_from(receipt_count).unwrap_or(u32::MAX)
}

/// HD secp256k1 signer backed by a single persisted 32-byte seed.
pub struct HdSecp256k1Signer {
    seed: [u8; SEED_LEN],
}

impl HdSecp256k1Signer {
    /// Loads the master seed at `store`, generating and persisting one on
    /// first use. Idempotent.
    pub fn load(store: &KeyStore) -> Result<Self, SignerError> {
        keys::ensure_key_dir(&store.dir)?;
        let path = store.key_path(SEED_FILE);
        if let Some(existing) = keys::read_hex_key(&path)? {
            let seed: [u8; SEED_LEN] = existing.try_into().map_err(|_| {
                SignerError::KeyGeneration(format!("malformed seed at {}", path.display()))
            })?;
            return Ok(Self { seed });
        }
        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);
        keys::write_hex_key(&path, &seed)?;
        Ok(Self { seed })
    }

    fn signing_key_at(&self, task_index: u32) -> Result<SigningKey, SignerError> {
        let path: DerivationPath = derivation_path(task_index)
            .parse()
            .map_err(|e| SignerError::KeyGeneration(format!("bad derivation path: {e}")))?;
        let child = XPrv::derive_from_path(&self.seed, &path)
            .map_err(|e| SignerError::KeyGeneration(format!("key derivation failed: {e}")))?;
        Ok(child.private_key().clone())
    }

    fn verifying_key_at(&self, task_index: u32) -> Result<VerifyingKey, SignerError> {
        Ok(*self.signing_key_at(task_index)?.verifying_key())
    }
}

impl ReceiptSigner for HdSecp256k1Signer {
    fn sign_at(&self, msg: &[u8], task_index: u32) -> Result<Vec<u8>, SignerError> {
        let signing_key = self.signing_key_at(task_index)?;
        let signature: Signature = signing_key.sign(msg);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify_at(&self, msg: &[u8], sig: &[u8], task_index: u32) -> Result<(), SignerError> {
        let signature = Signature::from_der(sig).map_err(|_| SignerError::SignatureDecodeError)?;
        let verifying_key = self.verifying_key_at(task_index)?;
        verifying_key
            .verify(msg, &signature)
            .map_err(|_| SignerError::InvalidSignature)
    }

    fn key_path(&self, task_index: u32) -> String {
        derivation_path(task_index)
    }

    fn index_for_key_path(&self, key_path: &str) -> Result<u32, SignerError> {
        let suffix = key_path
            .strip_prefix(&format!("m/44'/{COIN_TYPE}'/0'/"))
            .ok_or_else(|| SignerError::InvalidKeyPath(key_path.to_string()))?;
        suffix
            .parse::<u32>()
            .map_err(|_| SignerError::InvalidKeyPath(key_path.to_string()))
    }
}

/// Convenience constructor used by the Manager's default wiring.
pub fn load_signer(key_dir: impl AsRef<Path>) -> Result<HdSecp256k1Signer, SignerError> {
    HdSecp256k1Signer::load(&KeyStore::new(key_dir.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let a = HdSecp256k1Signer::load(&store).unwrap();
        let b = HdSecp256k1Signer::load(&store).unwrap();
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn sign_then_verify_roundtrips_at_same_index() {
        let dir = tempdir().unwrap();
        let signer = HdSecp256k1Signer::load(&KeyStore::new(dir.path())).unwrap();
        let sig = signer.sign_at(b"hello", 7).unwrap();
        signer.verify_at(b"hello", &sig, 7).unwrap();
    }

    #[test]
    fn different_indices_derive_different_keys() {
        let dir = tempdir().unwrap();
        let signer = HdSecp256k1Signer::load(&KeyStore::new(dir.path())).unwrap();
        let sig = signer.sign_at(b"hello", 0).unwrap();
        assert!(signer.verify_at(b"hello", &sig, 1).is_err());
    }

    #[test]
    fn key_path_round_trips_through_index_for_key_path() {
        let dir = tempdir().unwrap();
        let signer = HdSecp256k1Signer::load(&KeyStore::new(dir.path())).unwrap();
        let path = signer.key_path(42);
        assert_eq!(path, "m/44'/236'/0'/42");
        assert_eq!(signer.index_for_key_path(&path).unwrap(), 42);
    }

    #[test]
    fn signing_same_message_twice_is_deterministic() {
        let dir = tempdir().unwrap();
        let signer = HdSecp256k1Signer::load(&KeyStore::new(dir.path())).unwrap();
        let a = signer.sign_at(b"hello", 3).unwrap();
        let b = signer.sign_at(b"hello", 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn clamp_task_index_saturates_at_u32_max() {
        assert_eq!(clamp_task_index(usize::MAX), u32::MAX);
        assert_eq!(clamp_task_index(5), 5);
    }
}
