//! Slot processing and validation.

use super::super::checksums::{ChecksumAlgorithm, calculate_checksum};
use super::super::constants::{OP_TAR, lifecycle_byte, purpose_byte};
use super::super::defaults::DEFAULT_FILE_PERMS;
use super::super::manifest::ManifestSlot;
use super::super::metadata::SlotMetadata;
use super::super::operations::{pack_operations, string_to_operations};
use super::super::slots::SlotDescriptor;
use crate::exceptions::{PspfError, Result};
use log::{debug, info, trace};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Self-referential slot marker: the slot's source is the launcher binary
/// itself rather than packaged data.
const SELF_REF_MARKER: &str = "$SELF";

fn is_self_referential(source: &str) -> bool {
    source == SELF_REF_MARKER
}

/// Process and validate slot data.
pub(super) struct SlotProcessor {
    pub(super) manifest_slots: Vec<ManifestSlot>,
    pub(super) slot_descriptors: Vec<SlotDescriptor>,
    pub(super) metadata_slots: Vec<SlotMetadata>,
    pub(super) slot_paths: Vec<PathBuf>,
    /// Temp files backing directory slots staged into a TAR stream; held
    /// here so they outlive `process_slots` until the builder finishes
    /// streaming slot data.
    tar_staging: Vec<tempfile::NamedTempFile>,
}

impl SlotProcessor {
    pub(super) fn new(manifest_slots: Vec<ManifestSlot>) -> Self {
        Self {
            manifest_slots,
            slot_descriptors: Vec::new(),
            metadata_slots: Vec::new(),
            slot_paths: Vec::new(),
            tar_staging: Vec::new(),
        }
    }

    pub(super) fn process_slots(&mut self) -> Result<()> {
        debug!("processing {} slots", self.manifest_slots.len());
        let slots_timer = Instant::now();

        let num_slots = self.manifest_slots.len();
        for i in 0..num_slots {
            let slot = &self.manifest_slots[i];
            trace!("processing slot {i}: {}", slot.source);

            if let Some(declared_slot) = slot.slot {
                if declared_slot as usize != i {
                    return Err(PspfError::config(format!(
                        "slot number mismatch: expected {i}, manifest declared {declared_slot} for slot '{}'",
                        slot.id
                    )));
                }
            }

            if is_self_referential(&slot.source) {
                info!("slot {i} is self-referential ({}), skipping packaging", slot.source);

                self.metadata_slots.push(SlotMetadata {
                    index: i,
                    id: slot.id.clone(),
                    source: slot.source.clone(),
                    target: slot.target.clone(),
                    size: 0,
                    checksum: String::new(),
                    operations: String::new(),
                    purpose: slot.purpose.clone(),
                    lifecycle: slot.lifecycle.clone(),
                    permissions: slot
                        .permissions
                        .clone()
                        .or_else(|| Some(format!("{:04o}", DEFAULT_FILE_PERMS))),
                    resolution: slot.resolution.clone().or_else(|| Some("build".to_string())),
                    self_ref: Some(true),
                });

                self.slot_descriptors.push(SlotDescriptor {
                    id: i as u64,
                    name_hash: 0,
                    offset: 0,
                    size: 0,
                    original_size: 0,
                    operations: 0,
                    checksum: 0,
                    purpose: 0,
                    lifecycle: 0,
                    priority: 0,
                    platform: 0,
                    reserved1: 0,
                    reserved2: 0,
                    permissions: 0,
                    permissions_high: 0,
                });
                self.slot_paths.push(PathBuf::new());
                continue;
            }

            let resolved_source = self.resolve_slot_path(&slot.source)?;
            let operations = parse_operations(&slot.operations)?;

            let slot_path = if resolved_source.is_dir() {
                if !operations.contains(&OP_TAR) {
                    return Err(PspfError::config(format!(
                        "slot '{}' source is a directory but its operation chain '{}' has no tar step",
                        slot.id, slot.operations
                    )));
                }
                self.stage_directory_as_tar(&resolved_source)?
            } else {
                resolved_source
            };

            let (file_size, sha256_checksum, sha256_u64) =
                self.calculate_slot_checksums(&slot_path, i)?;

            self.metadata_slots.push(SlotMetadata {
                index: i,
                id: slot.id.clone(),
                source: slot.source.clone(),
                target: slot.target.clone(),
                size: file_size as i64,
                checksum: sha256_checksum,
                operations: slot.operations.clone(),
                purpose: slot.purpose.clone(),
                lifecycle: slot.lifecycle.clone(),
                permissions: slot
                    .permissions
                    .clone()
                    .or_else(|| Some(format!("{:04o}", DEFAULT_FILE_PERMS))),
                resolution: slot.resolution.clone().or_else(|| Some("build".to_string())),
                self_ref: None,
            });

            let descriptor =
                self.create_slot_descriptor(i, slot, &operations, file_size, sha256_u64)?;
            self.slot_descriptors.push(descriptor);
            self.slot_paths.push(slot_path);
        }

        debug!(
            "processed {} slots in {:?}",
            self.manifest_slots.len(),
            slots_timer.elapsed()
        );
        Ok(())
    }

    fn resolve_slot_path(&self, source: &str) -> Result<PathBuf> {
        let slot_path = if source.contains("{workenv}") {
            let base_dir = if let Ok(env_base) = std::env::var("FLAVOR_WORKENV_BASE") {
                info!("using FLAVOR_WORKENV_BASE: {env_base}");
                PathBuf::from(env_base)
            } else {
                let cwd = std::env::current_dir()
                    .map_err(|e| PspfError::resource(format!("failed to get current directory: {e}")))?;
                info!("no FLAVOR_WORKENV_BASE, using cwd: {}", cwd.display());
                cwd
            };
            let resolved = source.replace("{workenv}", base_dir.to_str().unwrap_or("."));
            PathBuf::from(resolved)
        } else {
            PathBuf::from(source)
        };

        Ok(slot_path)
    }

    /// Build a deterministic TAR stream from a directory's contents: entries
    /// sorted by path, zeroed mtimes, and normalized ownership/mode, so that
    /// building the same directory twice produces byte-identical output.
    fn stage_directory_as_tar(&mut self, dir: &Path) -> Result<PathBuf> {
        let mut entries = Vec::new();
        collect_entries(dir, dir, &mut entries)?;
        entries.sort();

        let tmp = tempfile::NamedTempFile::new()
            .map_err(|e| PspfError::resource(format!("failed to create tar staging file: {e}")))?;
        {
            let mut builder = tar::Builder::new(tmp.reopen().map_err(|e| {
                PspfError::resource(format!("failed to reopen tar staging file: {e}"))
            })?);
            builder.mode(tar::HeaderMode::Deterministic);

            for rel_path in &entries {
                let abs_path = dir.join(rel_path);
                let mut header = tar::Header::new_gnu();
                let metadata = std::fs::symlink_metadata(&abs_path)?;
                header.set_metadata_in_mode(&metadata, tar::HeaderMode::Deterministic);
                header.set_mtime(0);
                header.set_uid(0);
                header.set_gid(0);

                if metadata.is_dir() {
                    builder.append_data(&mut header, rel_path, std::io::empty())?;
                } else {
                    let mut file = File::open(&abs_path)?;
                    header.set_size(metadata.len());
                    builder.append_data(&mut header, rel_path, &mut file)?;
                }
            }
            builder
                .into_inner()
                .map_err(|e| PspfError::resource(format!("failed to finish tar stream: {e}")))?;
        }

        let path = tmp.path().to_path_buf();
        self.tar_staging.push(tmp);
        Ok(path)
    }

    fn calculate_slot_checksums(&self, slot_path: &Path, index: usize) -> Result<(u64, String, u64)> {
        let slot_file = File::open(slot_path)
            .map_err(|e| PspfError::resource(format!("failed to open slot {}: {e}", slot_path.display())))?;

        let file_metadata = slot_file.metadata()?;
        let file_size = file_metadata.len();
        trace!("slot {index} size: {file_size} bytes");

        let checksum_timer = Instant::now();
        let mut reader = BufReader::with_capacity(8 * 1024 * 1024, slot_file);
        let sha256_checksum_str = calculate_checksum(&mut reader, ChecksumAlgorithm::Sha256)
            .map_err(|e| PspfError::resource(format!("failed to calculate SHA-256 for slot {index}: {e}")))?;

        let sha256_bytes = sha256_checksum_str
            .strip_prefix("sha256:")
            .and_then(|hex_str| hex::decode(hex_str).ok())
            .ok_or_else(|| PspfError::format(format!("invalid SHA-256 checksum format: {sha256_checksum_str}")))?;

        let sha256_u64 = u64::from_le_bytes(
            sha256_bytes[..8]
                .try_into()
                .map_err(|_| PspfError::format("SHA-256 hash too short".to_string()))?,
        );

        trace!("checksums calculated in {:?}", checksum_timer.elapsed());
        debug!("slot {index}: sha256 u64 (first 8 bytes): {sha256_u64:016x}");

        Ok((file_size, sha256_checksum_str, sha256_u64))
    }

    fn create_slot_descriptor(
        &self,
        index: usize,
        slot: &ManifestSlot,
        operations: &[u8],
        file_size: u64,
        sha256_checksum: u64,
    ) -> Result<SlotDescriptor> {
        let mut descriptor = SlotDescriptor::new(index as u64);
        descriptor = descriptor.with_name(&slot.id);
        descriptor.size = file_size;
        descriptor.original_size = file_size;
        descriptor.checksum = sha256_checksum;
        descriptor.operations = pack_operations(operations)
            .map_err(|e| PspfError::config(format!("slot '{}': {e}", slot.id)))?;
        descriptor.purpose = purpose_byte(&slot.purpose);
        descriptor.lifecycle = lifecycle_byte(&slot.lifecycle);

        let perms = if let Some(ref perm_str) = slot.permissions {
            u16::from_str_radix(perm_str.trim_start_matches('0'), 8).unwrap_or(DEFAULT_FILE_PERMS)
        } else {
            DEFAULT_FILE_PERMS
        };
        descriptor.permissions = (perms & 0xFF) as u8;
        descriptor.permissions_high = ((perms >> 8) & 0xFF) as u8;

        debug!(
            "slot {index}: {} size {file_size} bytes, checksum {sha256_checksum:016x}",
            slot.id
        );

        Ok(descriptor)
    }
}

/// Parse a slot's `operations` manifest string, accepting both named chains
/// (`"tgz"`, `"tar.gz"`) and comma-separated opcode names (`"tar,gzip"`).
fn parse_operations(operations_str: &str) -> Result<Vec<u8>> {
    if operations_str.is_empty() || operations_str == "none" || operations_str == "raw" {
        return Ok(vec![]);
    }

    if let Ok(packed) = string_to_operations(operations_str) {
        return Ok(super::super::operations::unpack_operations(packed));
    }

    let mut ops = Vec::new();
    for part in operations_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let packed = string_to_operations(part)
            .map_err(|e| PspfError::config(format!("unknown operation '{part}': {e}")))?;
        ops.extend(super::super::operations::unpack_operations(packed));
    }
    Ok(ops)
}

fn collect_entries(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .map_err(|e| PspfError::resource(format!("failed to relativize {path:?}: {e}")))?
            .to_path_buf();
        out.push(rel);
        if path.is_dir() {
            collect_entries(root, &path, out)?;
        }
    }
    Ok(())
}
