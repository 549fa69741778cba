//! Cryptographic operations for PSPF/2025

use super::constants::{MAGIC_WAND_EMOJI_BYTES, PACKAGE_EMOJI_BYTES, SIGNATURE_SIZE};
use super::index::Index;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Generate an ephemeral Ed25519 key pair
pub fn generate_ephemeral_keypair() -> (SigningKey, VerifyingKey) {
    use rand::RngCore;
    let mut secret_key = [0u8; 32];
    OsRng.fill_bytes(&mut secret_key);
    let signing_key = SigningKey::from_bytes(&secret_key);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Sign data with a signing key
pub fn sign_data(data: &[u8], signing_key: &SigningKey) -> Vec<u8> {
    let signature = signing_key.sign(data);
    signature.to_bytes().to_vec()
}

/// Verify a signature
pub fn verify_signature(data: &[u8], signature: &[u8], verifying_key: &VerifyingKey) -> bool {
    if let Ok(sig) = Signature::from_slice(signature) {
        verifying_key.verify(data, &sig).is_ok()
    } else {
        false
    }
}

/// Build the canonical byte range the integrity seal signs over: the package
/// body (launcher, metadata, descriptor table, slot data) followed by the
/// magic trailer, with the index block's `index_checksum` and
/// `integrity_signature` fields forced to zero.
///
/// Zeroing both fields (not only the signature) keeps the seal independent of
/// the self-checksum: the final on-disk `index_checksum` is computed *after*
/// the signature is patched in (so it reflects the real signature bytes and
/// round-trips under `Index::verify_checksum_raw`), while the signature is
/// always verified against this zeroed-both form regardless of what ends up
/// stored in `index_checksum`.
pub fn canonical_seal_bytes(body: &[u8], index: &Index) -> Vec<u8> {
    let mut sealed = index.clone();
    sealed.integrity_signature = [0u8; SIGNATURE_SIZE];
    let mut index_bytes = sealed.pack();
    index_bytes[4..8].copy_from_slice(&[0, 0, 0, 0]);

    let mut out = Vec::with_capacity(body.len() + PACKAGE_EMOJI_BYTES.len() + index_bytes.len() + MAGIC_WAND_EMOJI_BYTES.len());
    out.extend_from_slice(body);
    out.extend_from_slice(PACKAGE_EMOJI_BYTES);
    out.extend_from_slice(&index_bytes);
    out.extend_from_slice(MAGIC_WAND_EMOJI_BYTES);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let (signing_key, verifying_key) = generate_ephemeral_keypair();
        let data = b"canonical package bytes";
        let sig = sign_data(data, &signing_key);
        assert!(verify_signature(data, &sig, &verifying_key));
    }

    #[test]
    fn tampered_data_fails_verification() {
        let (signing_key, verifying_key) = generate_ephemeral_keypair();
        let sig = sign_data(b"original", &signing_key);
        assert!(!verify_signature(b"tampered", &sig, &verifying_key));
    }

    #[test]
    fn malformed_signature_bytes_fail_rather_than_panic() {
        let (_signing_key, verifying_key) = generate_ephemeral_keypair();
        assert!(!verify_signature(b"data", &[0u8; 3], &verifying_key));
    }

    #[test]
    fn canonical_seal_bytes_independent_of_stored_checksum_and_signature() {
        let mut index = Index::new();
        index.package_size = 4096;

        let body = b"launcher + metadata + slots".to_vec();
        let baseline = canonical_seal_bytes(&body, &index);

        // Changing only index_checksum/integrity_signature on the input index
        // must not change the bytes that get signed/verified.
        index.index_checksum = 0xDEAD_BEEF;
        index.integrity_signature = [0xAB; SIGNATURE_SIZE];
        assert_eq!(baseline, canonical_seal_bytes(&body, &index));
    }

    #[test]
    fn sign_and_verify_over_canonical_seal_bytes() {
        let (signing_key, verifying_key) = generate_ephemeral_keypair();
        let mut index = Index::new();
        index.package_size = 2048;
        let body = b"some package body bytes".to_vec();

        let message = canonical_seal_bytes(&body, &index);
        let sig = sign_data(&message, &signing_key);
        assert!(verify_signature(&message, &sig, &verifying_key));

        // Tampering with the body must invalidate the seal.
        let tampered = canonical_seal_bytes(b"different body bytes!!!!", &index);
        assert!(!verify_signature(&tampered, &sig, &verifying_key));
    }
}
