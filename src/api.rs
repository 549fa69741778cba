//! High-level entry points for building, launching, and verifying packages.

use crate::exceptions::{PspfError, Result};
use crate::psp::{self, PackageFormat};
use std::path::Path;

/// Options for building a package.
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Path to launcher binary.
    pub launcher_bin: Option<std::path::PathBuf>,
    /// Skip verification after building.
    pub skip_verification: bool,
    /// Path to private key file (PEM format).
    pub private_key_path: Option<std::path::PathBuf>,
    /// Path to public key file (PEM format).
    pub public_key_path: Option<std::path::PathBuf>,
    /// Seed for deterministic key generation.
    pub key_seed: Option<String>,
    /// Base directory for workenv resolution.
    pub workenv_base: Option<std::path::PathBuf>,
}

/// Options for launching a package.
#[derive(Debug, Default)]
pub struct LaunchOptions {
    /// Working directory for extraction.
    pub workdir: Option<String>,
}

/// Result of package verification.
#[derive(Debug)]
pub struct VerifyResult {
    /// Format identifier, e.g. `"PSPF/2025"`.
    pub format: String,
    /// Format version string.
    pub version: String,
    /// Whether the Ed25519 integrity seal validated.
    pub signature_valid: bool,
    /// Number of slots recorded in the index.
    pub slot_count: usize,
    /// Package name from metadata.
    pub package_name: String,
    /// Package version from metadata.
    pub package_version: String,
}

/// Build a PSPF package from a manifest.
pub fn build_package(
    manifest_path: &Path,
    output_path: &Path,
    options: BuildOptions,
) -> Result<()> {
    let manifest_data = std::fs::read_to_string(manifest_path)?;
    let manifest: serde_json::Value = serde_json::from_str(&manifest_data)?;

    let format = manifest
        .get("format")
        .and_then(|f| f.as_str())
        .unwrap_or("PSPF/2025");

    match format {
        "PSPF/2025" => psp::format_2025::build(manifest_path, output_path, options),
        _ => Err(PspfError::UnsupportedFormat(format.to_string())),
    }
}

/// Launch a PSPF package, replacing or spawning the current process per
/// `FLAVOR_EXEC_MODE`.
pub fn launch_package(package_path: &Path, args: &[String], options: LaunchOptions) -> Result<i32> {
    let format = detect_package_format(package_path)?;

    match format {
        PackageFormat::PSPF2025 => psp::format_2025::launch(package_path, args, options),
    }
}

/// Verify a PSPF package's structural and cryptographic integrity.
pub fn verify_package(package_path: &Path) -> Result<VerifyResult> {
    let format = detect_package_format(package_path)?;

    match format {
        PackageFormat::PSPF2025 => psp::format_2025::verify(package_path),
    }
}

/// Detect the format of a package by reading its magic trailer.
fn detect_package_format(package_path: &Path) -> Result<PackageFormat> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    let mut file = File::open(package_path)?;
    let file_size = file.metadata()?.len();

    if file_size >= psp::format_2025::constants::MAGIC_TRAILER_SIZE as u64 {
        file.seek(SeekFrom::End(-4))?;
        let mut magic_wand = [0u8; 4];
        file.read_exact(&mut magic_wand)?;

        if magic_wand == *psp::format_2025::constants::MAGIC_WAND_EMOJI_BYTES {
            file.seek(SeekFrom::End(
                -(psp::format_2025::constants::MAGIC_TRAILER_SIZE as i64),
            ))?;
            let mut package_emoji = [0u8; 4];
            file.read_exact(&mut package_emoji)?;

            if package_emoji == *psp::format_2025::constants::PACKAGE_EMOJI_BYTES {
                return Ok(PackageFormat::PSPF2025);
            }
        }
    }

    Err(PspfError::UnsupportedFormat(
        "unknown package format".to_string(),
    ))
}
