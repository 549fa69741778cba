//! PSPF/2025 package verifier

use super::constants::{MAGIC_TRAILER_SIZE, MAGIC_WAND_EMOJI_BYTES};
use super::crypto::canonical_seal_bytes;
use crate::api::VerifyResult;
use crate::exceptions::{PspfError, Result};
use adler::Adler32;
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Verify a PSPF/2025 package
pub fn verify(package_path: &Path) -> Result<VerifyResult> {
    info!("Verifying PSPF/2025 package: {package_path:?}");

    let mut file = File::open(package_path)?;
    let file_size = file.metadata()?.len();

    // Read the index
    let mut reader = super::reader::Reader::new(package_path)?;
    let index = reader.read_index()?.clone();
    let metadata = reader.read_metadata()?.clone();

    // Schema validation (format string, workenv paths/umask, deprecated and
    // unknown metadata fields) fails fast, before any checksum work.
    metadata.validate()?;

    // Verify index checksum
    let index_checksum_valid = verify_index_checksum(&index);
    debug!(
        "Index checksum: {}",
        if index_checksum_valid {
            "✅ VALID"
        } else {
            "❌ INVALID"
        }
    );

    // Verify metadata checksum
    let metadata_checksum_valid = verify_metadata_checksum(&mut file, &index)?;
    debug!(
        "Metadata checksum: {}",
        if metadata_checksum_valid {
            "✅ VALID"
        } else {
            "❌ INVALID"
        }
    );

    // Verify package size
    let size_valid = index.package_size == file_size;
    debug!(
        "Package size: {}",
        if size_valid {
            "✅ VALID"
        } else {
            "❌ INVALID"
        }
    );

    // Verify integrity seal (Ed25519 signature over the whole package)
    let integrity_seal_valid = verify_integrity_seal(&mut file, file_size, &index)?;
    debug!(
        "Integrity seal: {}",
        if integrity_seal_valid {
            "✅ VALID"
        } else {
            "❌ NOT VERIFIED"
        }
    );

    // Verify trailing magic (8 bytes: 📦🪄)
    let trailing_magic_valid = verify_trailing_magic(&mut file)?;
    debug!(
        "Trailing magic: {}",
        if trailing_magic_valid {
            "✅ VALID"
        } else {
            "❌ INVALID"
        }
    );

    // Overall signature validity
    debug!(
        "🔍 Verification results: index_checksum={}, metadata_checksum={}, size={}, integrity_seal={}, trailing_magic={}",
        index_checksum_valid,
        metadata_checksum_valid,
        size_valid,
        integrity_seal_valid,
        trailing_magic_valid
    );
    let signature_valid = index_checksum_valid
        && metadata_checksum_valid
        && size_valid
        && integrity_seal_valid
        && trailing_magic_valid;

    Ok(VerifyResult {
        format: "PSPF/2025".to_string(),
        version: format!("0x{:08x}", super::constants::FORMAT_VERSION),
        signature_valid,
        slot_count: metadata.slots.len(),
        package_name: metadata.package.name.clone(),
        package_version: metadata.package.version.clone(),
    })
}

/// Verify the index checksum
fn verify_index_checksum(index: &super::index::Index) -> bool {
    // Get the index bytes using the pack method
    let mut index_bytes = index.pack();

    // Zero out the checksum field (offset 4-8 in 8192-byte header)
    index_bytes[4..8].copy_from_slice(&[0u8; 4]);

    // Calculate Adler32 checksum
    let mut adler = Adler32::new();
    adler.write_slice(&index_bytes);
    let calculated = adler.checksum();

    calculated == index.index_checksum
}

/// Verify the metadata checksum
fn verify_metadata_checksum(file: &mut File, index: &super::index::Index) -> Result<bool> {
    // Read metadata bytes
    file.seek(SeekFrom::Start(index.metadata_offset))?;
    let mut metadata_bytes = vec![0u8; index.metadata_size as usize];
    file.read_exact(&mut metadata_bytes)?;

    // Calculate SHA256 (metadata checksum is full 32-byte SHA-256 hash)
    let mut hasher = Sha256::new();
    hasher.update(&metadata_bytes);
    let calculated: [u8; 32] = hasher.finalize().into();

    // Compare with expected checksum
    Ok(calculated == index.metadata_checksum)
}

/// Verify the trailing magic (4 bytes: 🪄 at the very end)
fn verify_trailing_magic(file: &mut File) -> Result<bool> {
    // Seek to end minus 4 bytes (magic wand emoji)
    file.seek(SeekFrom::End(-4))?;

    // Read the last 4 bytes
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;

    // Check if it matches the magic wand emoji
    Ok(magic == MAGIC_WAND_EMOJI_BYTES)
}

/// Verify the integrity seal (Ed25519 signature over the whole package).
///
/// The canonical range is the package body (everything before the trailer)
/// followed by a trailer whose index block has `index_checksum` and
/// `integrity_signature` zeroed — see `crypto::canonical_seal_bytes`. A
/// tampered slot, not just tampered metadata, must invalidate this seal.
fn verify_integrity_seal(
    file: &mut File,
    file_size: u64,
    index: &super::index::Index,
) -> Result<bool> {
    // Get signature from index
    let sig_bytes = &index.integrity_signature;

    // Get public key from index
    let public_key_bytes = &index.public_key;

    // Check if signature is present (not all zeros)
    if sig_bytes.iter().all(|&b| b == 0) {
        debug!("No signature present in package");
        return Ok(false);
    }

    // Check if public key is present (not all zeros)
    if public_key_bytes.iter().all(|&b| b == 0) {
        debug!("No public key present in package");
        return Ok(false);
    }

    // Parse signature
    let sig_array: [u8; 64] = sig_bytes[..]
        .try_into()
        .map_err(|_| PspfError::Generic("Invalid signature size".to_string()))?;
    let signature = Signature::from_bytes(&sig_array);

    // Parse public key
    let key_array: [u8; 32] = public_key_bytes[..]
        .try_into()
        .map_err(|_| PspfError::Generic("Invalid public key size".to_string()))?;
    let public_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|e| PspfError::Generic(format!("Invalid public key: {e}")))?;

    // Read the whole package body (everything before the trailer)
    let body_len = file_size.saturating_sub(MAGIC_TRAILER_SIZE as u64);
    file.seek(SeekFrom::Start(0))?;
    let mut body = vec![0u8; body_len as usize];
    file.read_exact(&mut body)?;

    let canonical = canonical_seal_bytes(&body, index);
    let valid = public_key.verify(&canonical, &signature).is_ok();

    if valid {
        debug!("✅ Signature verification successful");
    } else {
        debug!("❌ Signature verification failed");
    }

    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::index::Index;

    fn sealed_index() -> Index {
        let mut index = Index::new();
        index.package_size = 4096;
        index.launcher_size = 1024;
        let mut bytes = index.pack();
        bytes[4..8].copy_from_slice(&[0, 0, 0, 0]);
        index.index_checksum = adler::adler32_slice(&bytes);
        index
    }

    #[test]
    fn freshly_sealed_index_checksum_verifies() {
        assert!(verify_index_checksum(&sealed_index()));
    }

    #[test]
    fn tampered_field_fails_index_checksum() {
        let mut index = sealed_index();
        index.package_size += 1;
        assert!(!verify_index_checksum(&index));
    }

    #[test]
    fn metadata_checksum_matches_sha256_of_stored_bytes() {
        use sha2::{Digest, Sha256};
        use std::io::{Seek, SeekFrom, Write};

        let metadata_bytes = b"not real gzip, just bytes to hash";
        let mut hasher = Sha256::new();
        hasher.update(metadata_bytes);
        let digest: [u8; 32] = hasher.finalize().into();

        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(metadata_bytes).expect("write metadata");

        let mut index = Index::new();
        index.metadata_offset = 0;
        index.metadata_size = metadata_bytes.len() as u64;
        index.metadata_checksum = digest;

        file.seek(SeekFrom::Start(0)).expect("seek");
        assert!(verify_metadata_checksum(&mut file, &index).expect("verify"));

        index.metadata_checksum[0] ^= 0xff;
        assert!(!verify_metadata_checksum(&mut file, &index).expect("verify"));
    }

    #[test]
    fn trailing_magic_requires_exact_bytes() {
        use std::io::Write;

        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(b"some body bytes").expect("write body");
        file.write_all(&MAGIC_WAND_EMOJI_BYTES).expect("write magic");
        assert!(verify_trailing_magic(&mut file).expect("verify"));
    }

    #[test]
    fn integrity_seal_reports_false_when_unsigned() {
        use std::io::Write;

        let body = b"launcher bytes + metadata + slots".to_vec();
        let index = Index::new();
        let trailer = canonical_seal_bytes(&body, &index);

        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(&trailer).expect("write package");
        let file_size = trailer.len() as u64;

        // index.public_key / integrity_signature are left all-zero (unsigned).
        assert!(!verify_integrity_seal(&mut file, file_size, &index).expect("verify"));
    }

    fn signed_package() -> (std::fs::File, u64, Index) {
        use ed25519_dalek::Signer;
        use std::io::Write;

        let (signing_key, verifying_key) = super::super::crypto::generate_ephemeral_keypair();
        let body = b"launcher bytes + metadata + descriptor table + slot data".to_vec();

        let mut index = Index::new();
        index.public_key.copy_from_slice(verifying_key.as_bytes());

        let canonical = canonical_seal_bytes(&body, &index);
        let signature = signing_key.sign(&canonical);
        index
            .integrity_signature
            .copy_from_slice(signature.to_bytes().as_ref());

        let trailer = canonical_seal_bytes(&body, &index);
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(&trailer).expect("write package");
        let file_size = trailer.len() as u64;

        (file, file_size, index)
    }

    #[test]
    fn integrity_seal_verifies_over_whole_signed_package() {
        let (mut file, file_size, index) = signed_package();
        assert!(verify_integrity_seal(&mut file, file_size, &index).expect("verify"));
    }

    #[test]
    fn integrity_seal_fails_when_body_byte_is_tampered() {
        use std::io::{Seek, SeekFrom, Write};

        let (mut file, file_size, index) = signed_package();
        file.seek(SeekFrom::Start(0)).expect("seek");
        file.write_all(b"X").expect("tamper first body byte");

        assert!(!verify_integrity_seal(&mut file, file_size, &index).expect("verify"));
    }
}
