// helpers/flavor-rs/src/psp/format_2025/index.rs
// PSPF 2025 Index Block - 8192-byte Header

use super::constants::{HEADER_SIZE, PSPF_VERSION, SIGNATURE_SIZE};
use crate::exceptions::{PspfError, Result};

/// PSPF/2025 index structure (8192 bytes total)
#[repr(C, packed)]
#[derive(Clone, Debug)]
pub struct Index {
    // Core identification (8 bytes)
    pub format_version: u32, // 0x20250001
    pub index_checksum: u32, // Adler-32 of index block (with this field as 0)

    // File structure (48 bytes)
    pub package_size: u64,      // Total file size
    pub launcher_size: u64,     // Size of launcher binary
    pub metadata_offset: u64,   // Offset to metadata archive
    pub metadata_size: u64,     // Size of metadata archive
    pub slot_table_offset: u64, // Offset to slot table
    pub slot_table_size: u64,   // Size of slot table

    // Slot information (4 bytes)
    pub slot_count: u32, // Number of slots

    // Security
    pub capabilities: u64,                      // Capability flags
    pub public_key: [u8; 32],                   // Ed25519 public key for signature verification
    pub metadata_checksum: [u8; 32],             // SHA-256 of the (compressed) metadata blob
    pub integrity_signature: [u8; SIGNATURE_SIZE], // Ed25519 detached signature over the canonical range

    // Performance hints
    pub access_mode: u8,    // 0=auto, 1=mmap, 2=file, 3=stream
    pub cache_strategy: u8, // 0=none, 1=lazy, 2=eager, 3=critical
    pub page_size: u32,     // Optimal page size for alignment
    pub max_memory: u64,    // Suggested maximum memory usage
    pub min_memory: u64,    // Minimum required memory

    // Build/compatibility
    pub build_timestamp: u64,  // Unix timestamp of build
    pub protocol_version: u32, // Protocol version for negotiation
    pub compatibility: u32,    // Minimum reader version

    // Reserved for future use, zero-padded to fill the block
    pub reserved: [u8; 7958],
}

impl Index {
    /// Create a new index with defaults
    pub fn new() -> Self {
        Index {
            format_version: PSPF_VERSION,
            index_checksum: 0,
            package_size: 0,
            launcher_size: 0,
            metadata_offset: 0,
            metadata_size: 0,
            slot_table_offset: 0,
            slot_table_size: 0,
            slot_count: 0,
            capabilities: 0,
            public_key: [0; 32],
            metadata_checksum: [0; 32],
            integrity_signature: [0; SIGNATURE_SIZE],
            access_mode: 0,
            cache_strategy: 0,
            page_size: 4096,
            max_memory: 0,
            min_memory: 0,
            build_timestamp: 0,
            protocol_version: 1,
            compatibility: PSPF_VERSION,
            reserved: [0; 7958],
        }
    }

    /// Unpack index from bytes
    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != HEADER_SIZE {
            return Err(PspfError::Generic(format!(
                "Invalid index size: {} != {}",
                data.len(),
                HEADER_SIZE
            )));
        }

        // Parse fields manually to ensure correct byte order
        use log::debug;
        use std::convert::TryInto;

        let mut index = Index::new();
        index.format_version = u32::from_le_bytes(
            data[0..4]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid format version bytes".into()))?,
        );
        index.index_checksum = u32::from_le_bytes(
            data[4..8]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid index checksum bytes".into()))?,
        );
        index.package_size = u64::from_le_bytes(
            data[8..16]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid package size bytes".into()))?,
        );
        index.launcher_size = u64::from_le_bytes(
            data[16..24]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid launcher size bytes".into()))?,
        );

        // Debug: Log the raw bytes we're parsing for metadata offset and size
        debug!(
            "Raw bytes at offset 24-32 (metadata_offset): {:02x?}",
            &data[24..32]
        );
        debug!(
            "Raw bytes at offset 32-40 (metadata_size): {:02x?}",
            &data[32..40]
        );

        index.metadata_offset = u64::from_le_bytes(
            data[24..32]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid metadata offset bytes".into()))?,
        );
        index.metadata_size = u64::from_le_bytes(
            data[32..40]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid metadata size bytes".into()))?,
        );

        // Copy to locals before logging to avoid alignment issues
        let meta_off = index.metadata_offset;
        let meta_sz = index.metadata_size;
        debug!("Parsed metadata_offset: 0x{:016x} ({})", meta_off, meta_off);
        debug!("Parsed metadata_size: {} bytes", meta_sz);
        index.slot_table_offset = u64::from_le_bytes(
            data[40..48]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid slot table offset bytes".into()))?,
        );
        index.slot_table_size = u64::from_le_bytes(
            data[48..56]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid slot table size bytes".into()))?,
        );
        index.slot_count = u32::from_le_bytes(
            data[56..60]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid slot count bytes".into()))?,
        );
        index.capabilities = u64::from_le_bytes(
            data[60..68]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid capabilities bytes".into()))?,
        );
        index.public_key.copy_from_slice(&data[68..100]);
        index.metadata_checksum.copy_from_slice(&data[100..132]);
        index
            .integrity_signature
            .copy_from_slice(&data[132..132 + SIGNATURE_SIZE]);

        let mut off = 132 + SIGNATURE_SIZE;
        index.access_mode = data[off];
        index.cache_strategy = data[off + 1];
        off += 2;
        index.page_size = u32::from_le_bytes(
            data[off..off + 4]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid page size bytes".into()))?,
        );
        off += 4;
        index.max_memory = u64::from_le_bytes(
            data[off..off + 8]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid max memory bytes".into()))?,
        );
        off += 8;
        index.min_memory = u64::from_le_bytes(
            data[off..off + 8]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid min memory bytes".into()))?,
        );
        off += 8;
        index.build_timestamp = u64::from_le_bytes(
            data[off..off + 8]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid build timestamp bytes".into()))?,
        );
        off += 8;
        index.protocol_version = u32::from_le_bytes(
            data[off..off + 4]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid protocol version bytes".into()))?,
        );
        off += 4;
        index.compatibility = u32::from_le_bytes(
            data[off..off + 4]
                .try_into()
                .map_err(|_| PspfError::Generic("Invalid compatibility bytes".into()))?,
        );
        off += 4;

        index.reserved.copy_from_slice(&data[off..HEADER_SIZE]);

        Ok(index)
    }

    /// Pack index to bytes
    pub fn pack(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];

        // Pack fields manually to ensure correct byte order
        bytes[0..4].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.index_checksum.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.package_size.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.launcher_size.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.metadata_offset.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.metadata_size.to_le_bytes());
        bytes[40..48].copy_from_slice(&self.slot_table_offset.to_le_bytes());
        bytes[48..56].copy_from_slice(&self.slot_table_size.to_le_bytes());
        bytes[56..60].copy_from_slice(&self.slot_count.to_le_bytes());
        bytes[60..68].copy_from_slice(&self.capabilities.to_le_bytes());
        bytes[68..100].copy_from_slice(&self.public_key);
        bytes[100..132].copy_from_slice(&self.metadata_checksum);
        bytes[132..132 + SIGNATURE_SIZE].copy_from_slice(&self.integrity_signature);

        let mut off = 132 + SIGNATURE_SIZE;
        bytes[off] = self.access_mode;
        bytes[off + 1] = self.cache_strategy;
        off += 2;
        bytes[off..off + 4].copy_from_slice(&self.page_size.to_le_bytes());
        off += 4;
        bytes[off..off + 8].copy_from_slice(&self.max_memory.to_le_bytes());
        off += 8;
        bytes[off..off + 8].copy_from_slice(&self.min_memory.to_le_bytes());
        off += 8;
        bytes[off..off + 8].copy_from_slice(&self.build_timestamp.to_le_bytes());
        off += 8;
        bytes[off..off + 4].copy_from_slice(&self.protocol_version.to_le_bytes());
        off += 4;
        bytes[off..off + 4].copy_from_slice(&self.compatibility.to_le_bytes());
        off += 4;

        bytes[off..HEADER_SIZE].copy_from_slice(&self.reserved);

        // Calculate and update checksum (with checksum field zeroed)
        bytes[4..8].copy_from_slice(&[0, 0, 0, 0]);
        let checksum = adler::adler32_slice(&bytes[..]);
        bytes[4..8].copy_from_slice(&checksum.to_le_bytes());

        bytes
    }

    /// Verify index checksum against raw data
    pub fn verify_checksum_raw(&self, raw_data: &[u8]) -> bool {
        use log::debug;

        if raw_data.len() != HEADER_SIZE {
            let size = raw_data.len();
            debug!("Index size mismatch: {} != {}", size, HEADER_SIZE);
            return false;
        }

        // Make a copy to zero out checksum field
        let mut data_copy = raw_data.to_vec();

        // Log the checksum bytes before zeroing
        let checksum_bytes = &raw_data[4..8];
        debug!(
            "Checksum bytes in index: {:02x} {:02x} {:02x} {:02x}",
            checksum_bytes[0], checksum_bytes[1], checksum_bytes[2], checksum_bytes[3]
        );

        data_copy[4..8].copy_from_slice(&[0, 0, 0, 0]);

        let calculated = adler::adler32_slice(&data_copy);
        let expected = self.index_checksum;
        debug!(
            "Checksum verification - Expected: {} (0x{:08x}), Calculated: {} (0x{:08x})",
            expected, expected, calculated, calculated
        );
        calculated == expected
    }

    /// Verify index checksum (deprecated - use verify_checksum_raw)
    pub fn verify_checksum(&self) -> bool {
        let mut bytes = self.pack();

        // Zero out checksum field (bytes 4-8)
        bytes[4..8].copy_from_slice(&[0, 0, 0, 0]);

        let calculated = adler::adler32_slice(&bytes[..]);
        calculated == self.index_checksum
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_is_exactly_header_size() {
        let idx = Index::new();
        assert_eq!(idx.pack().len(), HEADER_SIZE);
        assert_eq!(HEADER_SIZE, 8192);
    }

    #[test]
    fn pack_unpack_round_trips_defined_fields_and_reserved() {
        let mut idx = Index::new();
        idx.package_size = 123_456;
        idx.launcher_size = 4096;
        idx.metadata_offset = 4096;
        idx.metadata_size = 512;
        idx.slot_table_offset = 4608;
        idx.slot_table_size = 128;
        idx.slot_count = 2;
        idx.capabilities = 0xCAFE_BABE;
        idx.page_size = 16384;
        idx.build_timestamp = 1_700_000_000;
        idx.reserved[0] = 0xAB;
        idx.reserved[7957] = 0xCD;

        let packed = idx.pack();
        let unpacked = Index::unpack(&packed).expect("unpack must succeed");

        assert_eq!(unpacked.package_size, idx.package_size);
        assert_eq!(unpacked.launcher_size, idx.launcher_size);
        assert_eq!(unpacked.metadata_offset, idx.metadata_offset);
        assert_eq!(unpacked.metadata_size, idx.metadata_size);
        assert_eq!(unpacked.slot_table_offset, idx.slot_table_offset);
        assert_eq!(unpacked.slot_table_size, idx.slot_table_size);
        assert_eq!(unpacked.slot_count, idx.slot_count);
        assert_eq!(unpacked.capabilities, idx.capabilities);
        assert_eq!(unpacked.page_size, idx.page_size);
        assert_eq!(unpacked.build_timestamp, idx.build_timestamp);
        assert_eq!(unpacked.reserved[0], 0xAB);
        assert_eq!(unpacked.reserved[7957], 0xCD);
    }

    #[test]
    fn checksum_is_computed_with_field_zeroed_and_verifies() {
        let mut idx = Index::new();
        idx.package_size = 99;
        let packed = idx.pack();

        // stored checksum field must not itself be zero for a non-trivial index
        assert_ne!(&packed[4..8], &[0, 0, 0, 0]);

        let unpacked = Index::unpack(&packed).unwrap();
        assert!(unpacked.verify_checksum_raw(&packed));
    }

    #[test]
    fn corrupted_byte_fails_checksum_verification() {
        let idx = Index::new();
        let mut packed = idx.pack();
        let unpacked = Index::unpack(&packed).unwrap();
        assert!(unpacked.verify_checksum_raw(&packed));

        // flip a byte well outside the checksum field itself
        packed[200] ^= 0xFF;
        assert!(!unpacked.verify_checksum_raw(&packed));
    }

    #[test]
    fn unpack_rejects_wrong_length() {
        assert!(Index::unpack(&[0u8; HEADER_SIZE - 1]).is_err());
        assert!(Index::unpack(&[0u8; HEADER_SIZE + 1]).is_err());
    }
}

// 📦🔧🏗️🪄
