use std::io;

/// Error surface for the receipt-signing capability.
///
/// Verification failures are always reported to the caller; signing
/// failures during receipt creation are the caller's (hook-core Manager)
/// responsibility to treat as non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("receipt has no signature")]
    MissingSignature,
    #[error("signature does not verify against the signed message")]
    InvalidSignature,
    #[error("signature could not be decoded as hex")]
    SignatureDecodeError,
    #[error("key path '{0}' is not recognized by this signer")]
    InvalidKeyPath(String),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("key storage I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}
