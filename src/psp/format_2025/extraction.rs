//! Extraction logic for PSPF slots.
//!
//! Handles the extraction of slots from PSPF packages: reversing the
//! operation chain (decompression), and either writing a single file or
//! safely unpacking a TAR archive.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::{debug, error, trace};
use tar::{Archive, EntryType};
use xz2::read::XzDecoder;

#[cfg(unix)]
use super::defaults::DEFAULT_DIR_PERMS;
use super::defaults::{DEFAULT_ARCHIVE_MAX_ENTRY_SIZE, DEFAULT_ARCHIVE_MAX_TOTAL_SIZE};
use super::operations::{get_name, unpack_operations};
use super::reader::Reader;
use super::slots::SlotDescriptor;
use crate::exceptions::{PspfError, Result};

/// Extract a slot to the specified directory.
///
/// # Errors
///
/// Returns an error if the slot index is out of range, the checksum does not
/// match, decompression fails, or the slot's content is not the archive type
/// its operation chain claims.
pub fn extract_slot(reader: &mut Reader, slot_index: usize, dest_dir: &Path) -> Result<()> {
    trace!("extracting slot {slot_index} to {dest_dir:?}");

    let descriptors = reader.read_slot_descriptors()?;
    trace!("found {} slot descriptors", descriptors.len());

    if slot_index >= descriptors.len() {
        return Err(PspfError::format(format!(
            "slot index {slot_index} out of range (0-{})",
            descriptors.len().saturating_sub(1)
        )));
    }

    let descriptor = &descriptors[slot_index];
    let operations = unpack_operations(descriptor.operations);

    trace!(
        "slot {slot_index} descriptor: offset={:#x}, size={}, operations={:?}",
        descriptor.offset, descriptor.size, operations
    );

    let slot_data = reader.read_slot(descriptor)?;
    verify_slot_checksum(&slot_data, descriptor, slot_index)?;

    let decompressed_data = reverse_operations(slot_data, &operations, slot_index)?;

    let metadata = reader.read_metadata()?;
    let (slot_target, slot_operations, slot_purpose) = if slot_index < metadata.slots.len() {
        let slot_info = &metadata.slots[slot_index];
        (
            slot_info.target.clone(),
            slot_info.operations.clone(),
            slot_info.purpose.clone(),
        )
    } else {
        (format!("slot_{slot_index}"), String::new(), String::new())
    };

    let slot_target = slot_target
        .replace("{workenv}/", "")
        .replace("{workenv}", "");

    debug!(
        "slot {slot_index} operations: '{slot_operations}', purpose: '{slot_purpose}'"
    );

    use super::constants::OP_TAR;
    if operations.contains(&OP_TAR) {
        if !is_tarball(&decompressed_data) {
            return Err(PspfError::integrity(format!(
                "slot {slot_index} has a TAR operation but its content is not a tar archive"
            )));
        }
        debug!("slot {slot_index} is a tar archive, extracting");
        extract_tarball(&decompressed_data, dest_dir)?;
    } else {
        let target_path = dest_dir.join(&slot_target);
        extract_single_file(&decompressed_data, &target_path, &descriptors, slot_index)?;
    }

    Ok(())
}

/// Verify a slot's raw (on-disk, pre-decompression) bytes against its
/// descriptor checksum.
fn verify_slot_checksum(data: &[u8], descriptor: &SlotDescriptor, slot_index: usize) -> Result<()> {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(data);
    let computed = u64::from_le_bytes([
        hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
    ]);

    if computed != descriptor.checksum {
        return Err(PspfError::integrity(format!(
            "slot {slot_index} checksum mismatch: expected {:016x}, computed {computed:016x}",
            descriptor.checksum
        )));
    }
    Ok(())
}

/// Reverse an operation chain against slot data, applied in reverse order
/// from how the builder applied it on write.
fn reverse_operations(data: Vec<u8>, operations: &[u8], slot_index: usize) -> Result<Vec<u8>> {
    use super::constants::{OP_BZIP2, OP_GZIP, OP_TAR, OP_XZ, OP_ZSTD};

    let mut processed = data;
    for &op in operations.iter().rev() {
        processed = match op {
            OP_GZIP => {
                let mut decoder = GzDecoder::new(&processed[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| PspfError::integrity(format!("GZIP decompression failed: {e}")))?;
                out
            }
            OP_BZIP2 => {
                let mut decoder = BzDecoder::new(&processed[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| PspfError::integrity(format!("BZIP2 decompression failed: {e}")))?;
                out
            }
            OP_XZ => {
                let mut decoder = XzDecoder::new(&processed[..]);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| PspfError::integrity(format!("XZ decompression failed: {e}")))?;
                out
            }
            OP_ZSTD => zstd::stream::decode_all(&processed[..])
                .map_err(|e| PspfError::integrity(format!("ZSTD decompression failed: {e}")))?,
            OP_TAR => {
                // TAR framing is handled by the caller once the byte stream
                // is fully decompressed; nothing to reverse here.
                processed
            }
            unknown => {
                error!("slot {slot_index}: unknown operation {unknown:#04x}");
                return Err(PspfError::format(format!(
                    "unknown operation {unknown:#04x} ({}) for slot {slot_index}",
                    get_name(unknown)
                )));
            }
        };
    }
    Ok(processed)
}

/// Write a single decompressed file to `dest_dir` (which is itself the full
/// target path for a non-archive slot).
fn extract_single_file(
    decompressed_data: &[u8],
    dest_dir: &Path,
    descriptors: &[SlotDescriptor],
    slot_index: usize,
) -> Result<()> {
    debug!("writing single file to {dest_dir:?}");

    if let Some(parent) = dest_dir.parent() {
        create_parent_directory(parent)?;
    }

    write_file_with_logging(dest_dir, decompressed_data)?;
    set_file_permissions(dest_dir, descriptors, slot_index)?;

    Ok(())
}

fn create_parent_directory(parent: &Path) -> Result<()> {
    fs::create_dir_all(parent)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if parent.exists() {
            let _ = fs::set_permissions(
                parent,
                fs::Permissions::from_mode(u32::from(DEFAULT_DIR_PERMS)),
            );
        }
    }

    Ok(())
}

fn write_file_with_logging(path: &Path, data: &[u8]) -> Result<()> {
    debug!("writing {} bytes to {path:?}", data.len());
    fs::write(path, data).map_err(|e| PspfError::resource(format!("failed to write {path:?}: {e}")))
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, descriptors: &[SlotDescriptor], slot_index: usize) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let descriptor = &descriptors[slot_index];
    let perms = u16::from(descriptor.permissions) | (u16::from(descriptor.permissions_high) << 8);
    let mode = if perms != 0 {
        u32::from(perms)
    } else {
        u32::from(crate::psp::format_2025::defaults::DEFAULT_FILE_PERMS)
    };

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| PspfError::resource(format!("failed to set permissions on {path:?}: {e}")))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _descriptors: &[SlotDescriptor], _slot_index: usize) -> Result<()> {
    Ok(())
}

/// Check if data looks like a tar archive (`ustar` magic at offset 257).
fn is_tarball(data: &[u8]) -> bool {
    data.len() > 262 && &data[257..262] == b"ustar"
}

/// Extract a tar archive to a directory, rejecting any entry whose path
/// would escape `dest_dir` (absolute paths, `..` components, or symlinks
/// pointing outside the tree), any hard-link or device-node entry, and any
/// entry that would exceed the configured per-file or aggregate *ArchiveLimit*.
///
/// # Errors
///
/// Returns an error if directory creation fails, the archive is malformed,
/// any entry attempts to write outside `dest_dir`, an entry is a hard link
/// or device node, or an entry (or the archive as a whole) exceeds the
/// configured size limits.
pub fn extract_tarball(data: &[u8], dest_dir: &Path) -> Result<()> {
    debug!("extracting tarball to {dest_dir:?}");

    if !dest_dir.exists() {
        fs::create_dir_all(dest_dir)?;
    }
    let dest_dir = dest_dir
        .canonicalize()
        .map_err(|e| PspfError::resource(format!("failed to canonicalize {dest_dir:?}: {e}")))?;

    let mut tar = Archive::new(std::io::Cursor::new(data));
    let mut total_bytes: u64 = 0;

    for entry_result in tar.entries()? {
        let mut entry = entry_result?;
        let path = entry.path()?.into_owned();
        let entry_type = entry.header().entry_type();

        if path_escapes(&path) {
            return Err(PspfError::policy(format!(
                "tar entry {path:?} escapes the extraction directory"
            )));
        }

        match entry_type {
            EntryType::Link => {
                return Err(PspfError::policy(format!(
                    "tar entry {path:?} is a hard link, which is not allowed"
                )));
            }
            EntryType::Block | EntryType::Char => {
                return Err(PspfError::policy(format!(
                    "tar entry {path:?} is a device node, which is not allowed"
                )));
            }
            EntryType::Fifo => {
                return Err(PspfError::policy(format!(
                    "tar entry {path:?} is a FIFO, which is not allowed"
                )));
            }
            EntryType::Symlink => {
                let target = entry.link_name()?.ok_or_else(|| {
                    PspfError::policy(format!("tar entry {path:?} is a symlink with no target"))
                })?;
                let resolved = resolve_symlink_target(&path, &target);
                if path_escapes(&resolved) {
                    return Err(PspfError::policy(format!(
                        "tar entry {path:?} is a symlink targeting {target:?}, which escapes the extraction directory"
                    )));
                }
            }
            _ => {}
        }

        let entry_size = entry.header().size()?;
        if entry_size > DEFAULT_ARCHIVE_MAX_ENTRY_SIZE {
            return Err(PspfError::policy(format!(
                "tar entry {path:?} is {entry_size} bytes, exceeding the per-file ArchiveLimit of {DEFAULT_ARCHIVE_MAX_ENTRY_SIZE} bytes"
            )));
        }
        total_bytes = total_bytes.saturating_add(entry_size);
        if total_bytes > DEFAULT_ARCHIVE_MAX_TOTAL_SIZE {
            return Err(PspfError::policy(format!(
                "tar archive exceeds the aggregate ArchiveLimit of {DEFAULT_ARCHIVE_MAX_TOTAL_SIZE} bytes"
            )));
        }

        let dest_path = dest_dir.join(&path);
        trace!("extracting entry: {path:?}");

        if let Some(parent) = dest_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        entry.unpack(&dest_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(mode) = entry.header().mode() {
                let _ = fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("tarball extracted successfully ({total_bytes} bytes)");
    Ok(())
}

/// True if any component of `path` would step outside the extraction root.
fn path_escapes(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Resolve a symlink entry's target relative to its own location within the
/// archive, without touching the filesystem, so it can be checked against
/// `path_escapes` before anything is written.
fn resolve_symlink_target(entry_path: &Path, target: &Path) -> PathBuf {
    let base = entry_path.parent().unwrap_or_else(|| Path::new(""));
    let mut resolved = PathBuf::new();
    for component in base.components().chain(target.components()) {
        match component {
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push("..");
                }
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Check whether gzipped data decompresses to a tarball.
///
/// # Errors
///
/// Returns an error if decompression fails.
pub fn is_gzipped_tarball(data: &[u8]) -> Result<bool> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(is_tarball(&decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_escape() {
        assert!(path_escapes(Path::new("../../etc/passwd")));
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(path_escapes(Path::new("/etc/passwd")));
    }

    #[test]
    fn allows_nested_relative_path() {
        assert!(!path_escapes(Path::new("bin/tool")));
    }

    #[test]
    fn resolves_symlink_target_within_same_directory() {
        let resolved = resolve_symlink_target(Path::new("bin/link"), Path::new("tool"));
        assert_eq!(resolved, PathBuf::from("bin/tool"));
    }

    #[test]
    fn resolves_symlink_target_escaping_via_relative_dotdot() {
        let resolved = resolve_symlink_target(Path::new("bin/link"), Path::new("../../etc/passwd"));
        assert!(path_escapes(&resolved));
    }

    #[test]
    fn resolves_absolute_symlink_target_as_escaping() {
        let resolved = resolve_symlink_target(Path::new("bin/link"), Path::new("/etc/passwd"));
        assert!(path_escapes(&resolved));
    }

    fn build_tar(entries: impl FnOnce(&mut tar::Builder<Vec<u8>>)) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        entries(&mut builder);
        builder.into_inner().expect("finish tar")
    }

    #[test]
    fn extract_tarball_rejects_symlink_escaping_dest() {
        let tmp = tempfile::tempdir().expect("tempdir");

        let archive = build_tar(|builder| {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header
                .set_link_name("../../etc/passwd")
                .expect("set link name");
            builder
                .append_link(&mut header, "evil_link", "../../etc/passwd")
                .expect("append symlink entry");
        });

        let err = extract_tarball(&archive, tmp.path()).expect_err("must reject escaping symlink");
        assert!(matches!(err, PspfError::Policy(_)));
    }

    #[test]
    fn extract_tarball_rejects_hard_link_entries() {
        let tmp = tempfile::tempdir().expect("tempdir");

        let archive = build_tar(|builder| {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Link);
            header.set_size(0);
            header.set_mode(0o644);
            builder
                .append_link(&mut header, "hardlink", "some_target")
                .expect("append hard link entry");
        });

        let err = extract_tarball(&archive, tmp.path()).expect_err("must reject hard links");
        assert!(matches!(err, PspfError::Policy(_)));
    }

    #[test]
    fn extract_tarball_rejects_entry_over_per_file_limit() {
        let tmp = tempfile::tempdir().expect("tempdir");

        // The declared header size is what gates the check, not the actual
        // bytes written, so this stays a cheap test despite claiming a huge
        // entry.
        let archive = build_tar(|builder| {
            let mut header = tar::Header::new_gnu();
            header.set_size(DEFAULT_ARCHIVE_MAX_ENTRY_SIZE + 1);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "huge_file", std::io::empty())
                .expect("append oversized entry");
        });

        let err = extract_tarball(&archive, tmp.path()).expect_err("must reject oversized entry");
        assert!(matches!(err, PspfError::Policy(_)));
    }

    #[test]
    fn extract_tarball_allows_ordinary_files_within_limits() {
        let tmp = tempfile::tempdir().expect("tempdir");

        let archive = build_tar(|builder| {
            let mut header = tar::Header::new_gnu();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "hello.txt", &b"hello"[..])
                .expect("append entry");
        });

        extract_tarball(&archive, tmp.path()).expect("ordinary archive extracts cleanly");
        assert_eq!(
            fs::read(tmp.path().join("hello.txt")).expect("read extracted file"),
            b"hello"
        );
    }
}
