//! Package format implementations.

pub mod format_2025;

use crate::exceptions::{PspfError, Result};
use std::path::Path;

/// Supported package formats.
#[derive(Debug, Clone, Copy)]
pub enum PackageFormat {
    /// The PSPF/2025 container format (the only format this engine emits).
    PSPF2025,
}

/// Detect the format of a package by reading its magic trailer.
pub fn detect_format(package_path: &Path) -> Result<PackageFormat> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    log::trace!("detecting format for: {:?}", package_path);
    let mut file = File::open(package_path)?;
    let file_size = file.metadata()?.len();
    log::trace!("file size: {} bytes", file_size);

    if file_size >= format_2025::constants::MAGIC_TRAILER_SIZE as u64 {
        file.seek(SeekFrom::End(-4))?;
        let mut magic_wand = [0u8; 4];
        file.read_exact(&mut magic_wand)?;

        if magic_wand == *format_2025::constants::MAGIC_WAND_EMOJI_BYTES {
            file.seek(SeekFrom::End(
                -(format_2025::constants::MAGIC_TRAILER_SIZE as i64),
            ))?;
            let mut package_emoji = [0u8; 4];
            file.read_exact(&mut package_emoji)?;

            if package_emoji == *format_2025::constants::PACKAGE_EMOJI_BYTES {
                log::debug!("found valid magic trailer at end of file");
                return Ok(PackageFormat::PSPF2025);
            }
        }
        log::trace!("no valid magic trailer found");
    }

    Err(PspfError::UnsupportedFormat(
        "not a PSPF package".to_string(),
    ))
}
