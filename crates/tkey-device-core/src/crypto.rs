//! P-256 ECDSA wrapper functions (spec.md §4.2).
//!
//! The device signs with raw `r ‖ s` (64-byte) signatures; DER conversion
//! is a host-side concern (`tkey-host-core::der`), matching where the real
//! firmware's ABI draws the line.

use ecdsa::signature::{hazmat::PrehashSigner, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The derived 32-byte scalar `k` is not a valid P-256 scalar (zero, or
    /// >= curve order). Expected to occur with probability ~2^-32 per the
    /// curve's cofactor; spec.md §9 leaves the retry policy to the caller —
    /// this crate surfaces the failure rather than silently drawing a new
    /// nonce (see DESIGN.md).
    #[error("derived scalar is out of range for P-256")]
    ScalarOutOfRange,
    #[error("signing operation failed")]
    SignFailure,
}

/// Derives a P-256 keypair from the 32-byte value `k` produced by
/// `keyhandle::derive_k`. Fails if `k`, interpreted big-endian, is zero or
/// exceeds the group order.
pub fn keypair_from_bytes(k: &Zeroizing<[u8; 32]>) -> Result<(SigningKey, VerifyingKey), CryptoError> {
    let field_bytes: p256::FieldBytes = (**k).into();
    let signing_key = SigningKey::from_bytes(&field_bytes).map_err(|_| CryptoError::ScalarOutOfRange)?;
    let verifying_key = *signing_key.verifying_key();
    Ok((signing_key, verifying_key))
}

/// Signs `message` with `key`, returning the raw 64-byte `r ‖ s` encoding
/// (no DER, no recovery id — spec.md §4.2/§6).
pub fn sign_raw(key: &SigningKey, message: &[u8]) -> Result<[u8; 64], CryptoError> {
    let digest = Sha256::digest(message);
    let sig: Signature = key
        .sign_prehash(&digest)
        .map_err(|_| CryptoError::SignFailure)?;
    Ok(sig.to_bytes().into())
}

/// Encodes a public key in the uncompressed SEC1 point form used on the
/// wire (`0x04 ‖ x ‖ y`, 65 bytes) — spec.md §4.4.
pub fn encode_uncompressed_point(key: &VerifyingKey) -> [u8; 65] {
    let point = key.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    out
}

/// Verifies a raw `r ‖ s` signature against a prehashed message, used by
/// the host-side round-trip test in `tkey-host-core`.
pub fn verify_raw(key: &VerifyingKey, message: &[u8], sig_bytes: &[u8; 64]) -> bool {
    let Ok(sig) = Signature::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_roundtrip_sign_verify() {
        let k = Zeroizing::new([7u8; 32]);
        let (signing_key, verifying_key) = keypair_from_bytes(&k).unwrap();
        let msg = b"attestation test payload";
        let sig = sign_raw(&signing_key, msg).unwrap();
        assert!(verify_raw(&verifying_key, msg, &sig));
    }

    #[test]
    fn zero_scalar_is_rejected() {
        let k = Zeroizing::new([0u8; 32]);
        assert!(matches!(keypair_from_bytes(&k), Err(CryptoError::ScalarOutOfRange)));
    }

    #[test]
    fn encoded_point_has_uncompressed_marker() {
        let k = Zeroizing::new([11u8; 32]);
        let (_, verifying_key) = keypair_from_bytes(&k).unwrap();
        let point = encode_uncompressed_point(&verifying_key);
        assert_eq!(point[0], 0x04);
    }
}
