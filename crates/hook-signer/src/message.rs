/// The fields of a validation receipt that participate in the canonical
/// signature payload. `hook-core` owns the full `ValidationReceipt` type;
/// this crate only needs the subset that is bound by a signature, kept
/// dependency-free of `hook-core` so the signing capability can be
/// developed and tested in isolation.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptFields<'a> {
    pub receipt_id: &'a str,
    pub command: &'a str,
    pub exit_code: i32,
    pub stdout_hash: &'a str,
    pub stderr_hash: &'a str,
    pub completed_at_unix: i64,
}

/// Result of signing a receipt: the hex-encoded signature plus the
/// signer-defined key path to persist alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedReceipt {
    pub signature_hex: String,
    pub key_path: String,
}

/// Builds the byte-stable canonical message a signature is computed over.
///
/// Format is pipe-delimited and REQUIRED to stay byte-for-byte identical
/// across versions; any future field addition belongs in a new signer
/// version with a new `key_path` label, never a change here.
pub fn canonical_message(fields: &ReceiptFields<'_>) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        fields.receipt_id,
        fields.command,
        fields.exit_code,
        fields.stdout_hash,
        fields.stderr_hash,
        fields.completed_at_unix,
    )
}
