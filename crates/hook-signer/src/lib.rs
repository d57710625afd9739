//! Deterministic receipt signing for the hook crash-recovery persistence
//! layer.
//!
//! A [`ReceiptSigner`] turns a [`ValidationReceipt`][rv]'s command, exit
//! code, and output hashes into a byte-stable canonical message and signs
//! it. Two backends are provided:
//!
//! - [`ed25519::NativeEd25519Signer`] — one singleton keypair shared by
//!   every receipt.
//! - [`hd_secp256k1::HdSecp256k1Signer`] — one master seed, with a fresh
//!   key derived per receipt along a fixed BIP32 path.
//!
//! Both share the same [`ReceiptSigner`] contract, so `hook-core`'s
//! Manager is agnostic to which backend is configured. Signatures
//! authenticate local receipts only; this is not a general-purpose PKI.
//!
//! [rv]: https://docs.rs/hook-core (ValidationReceipt lives in hook-core)
//!
//! # Modules
//! - [`message`] — the canonical signature payload format.
//! - [`ed25519`] — native Ed25519 backend.
//! - [`hd_secp256k1`] — HD secp256k1 backend.
//! - [`keys`] — shared on-disk key storage helpers.
//! - [`error`] — [`SignerError`].

pub mod ed25519;
pub mod error;
pub mod hd_secp256k1;
pub mod keys;
pub mod message;

pub use error::SignerError;
pub use message::{ReceiptFields, SignedReceipt, canonical_message};

/// A capability that signs and verifies validation receipts.
///
/// Implementors need only provide the four `_at`/`_for` primitives;
/// `sign_receipt` and `verify_receipt` are derived from them and from the
/// canonical message format in [`message`].
pub trait ReceiptSigner: Send + Sync {
    /// Signs `msg` with the key for `task_index` (ignored by signers that
    /// use a single singleton key).
    fn sign_at(&self, msg: &[u8], task_index: u32) -> Result<Vec<u8>, SignerError>;

    /// Verifies `sig` over `msg` with the key for `task_index`.
    fn verify_at(&self, msg: &[u8], sig: &[u8], task_index: u32) -> Result<(), SignerError>;

    /// The signer-defined key identifier for `task_index`, persisted
    /// alongside the signature so a later verifier knows which key to
    /// re-derive.
    fn key_path(&self, task_index: u32) -> String;

    /// Recovers the task index a previously persisted `key_path` refers
    /// to, or fails with `InvalidKeyPath` if this signer does not
    /// recognize the format.
    fn index_for_key_path(&self, key_path: &str) -> Result<u32, SignerError>;

    /// Signs a receipt's fields, returning the signature and key path to
    /// persist. Signing failures are the caller's responsibility to treat
    /// as non-fatal per the crash-recovery design.
    fn sign_receipt(
        &self,
        fields: &ReceiptFields<'_>,
        task_index: u32,
    ) -> Result<SignedReceipt, SignerError> {
        let msg = canonical_message(fields);
        let signature = self.sign_at(msg.as_bytes(), task_index)?;
        Ok(SignedReceipt {
            signature_hex: hex::encode(signature),
            key_path: self.key_path(task_index),
        })
    }

    /// Verifies a previously signed receipt. Returns `MissingSignature`
    /// if `signature_hex` is empty and `InvalidKeyPath` if `key_path` was
    /// not produced by this signer's scheme.
    fn verify_receipt(
        &self,
        fields: &ReceiptFields<'_>,
        signature_hex: &str,
        key_path: &str,
    ) -> Result<(), SignerError> {
        if signature_hex.is_empty() {
            return Err(SignerError::MissingSignature);
        }
        let signature =
            hex::decode(signature_hex).map_err(|_| SignerError::SignatureDecodeError)?;
        let task_index = self.index_for_key_path(key_path)?;
        let msg = canonical_message(fields);
        self.verify_at(msg.as_bytes(), &signature, task_index)
    }
}

/// Prepares a signer, generating its backing key material on first use.
/// Idempotent: a second `load` against the same storage location reloads
/// the same key rather than generating a new one.
pub trait KeyManager {
    type Signer: ReceiptSigner;

    fn load(&self) -> Result<Self::Signer, SignerError>;
}

/// [`KeyManager`] for the native Ed25519 backend.
pub struct Ed25519KeyManager {
    pub store: keys::KeyStore,
}

impl KeyManager for Ed25519KeyManager {
    type Signer = ed25519::NativeEd25519Signer;

    fn load(&self) -> Result<Self::Signer, SignerError> {
        ed25519::NativeEd25519Signer::load(&self.store)
    }
}

/// [`KeyManager`] for the HD secp256k1 backend.
pub struct HdSecp256k1KeyManager {
    pub store: keys::KeyStore,
}

impl KeyManager for HdSecp256k1KeyManager {
    type Signer = hd_secp256k1::HdSecp256k1Signer;

    fn load(&self) -> Result<Self::Signer, SignerError> {
        hd_secp256k1::HdSecp256k1Signer::load(&self.store)
    }
}
