//! Work environment management

use super::super::defaults::DEFAULT_DISK_SPACE_MULTIPLIER;
use super::super::metadata::{Metadata, WorkenvInfo};
use super::super::paths::WorkenvPaths;
use crate::exceptions::{PspfError, Result};
use crate::utils::get_cache_dir;
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Applies `workenv.umask` for the lifetime of directory creation, restoring
/// the process umask on drop regardless of which exit path is taken.
#[cfg(unix)]
struct UmaskGuard {
    previous: libc::mode_t,
}

#[cfg(unix)]
impl UmaskGuard {
    #[allow(unsafe_code)] // umask(2) FFI call, no safe wrapper exists
    fn apply(mode: u32) -> Self {
        let previous = unsafe { libc::umask(mode as libc::mode_t) };
        Self { previous }
    }
}

#[cfg(unix)]
impl Drop for UmaskGuard {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            libc::umask(self.previous);
        }
    }
}

/// Expand the `{os}`, `{arch}`, and `{platform}` tokens a workenv directory
/// path may contain into normalized, process-native values.
fn normalize_platform_tokens(path: &str) -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    path.replace("{os}", os)
        .replace("{arch}", arch)
        .replace("{platform}", &format!("{os}-{arch}"))
}

/// Calculate a deterministic cache path for a package
pub(super) fn get_workenv_paths(package_path: &Path) -> WorkenvPaths {
    let cache_base = get_cache_dir();
    WorkenvPaths::new(cache_base, package_path)
}

/// Check if there's enough disk space for extraction
pub(super) fn check_disk_space(_paths: &WorkenvPaths, metadata: &Metadata) -> Result<()> {
    // Calculate total size needed (compressed size * DISK_SPACE_MULTIPLIER for safety)
    let _total_size_needed: u64 = metadata
        .slots
        .iter()
        .map(|slot| slot.size as u64 * DEFAULT_DISK_SPACE_MULTIPLIER)
        .sum();

    // Get available disk space
    #[cfg(unix)]
    {
        use crate::exceptions::PspfError;

        // Safe disk space check using fs2 crate alternative or simplified check
        let workenv_path = _paths.workenv();

        // Try to create a small test file to check if we can write
        // This is a simpler but less precise check than statvfs
        let test_file = workenv_path.join(".space_test");
        match std::fs::create_dir_all(&workenv_path) {
            Ok(_) => {
                match std::fs::write(&test_file, b"test") {
                    Ok(_) => {
                        let _ = std::fs::remove_file(&test_file);
                        debug!("✅ Disk space check passed (write test successful)");
                    }
                    Err(e) => {
                        warn!("⚠️ Disk write test failed: {}", e);
                        // Don't fail the process, just warn
                    }
                }
            }
            Err(e) => {
                warn!("⚠️ Could not create workenv directory: {}", e);
                return Err(PspfError::Generic(format!(
                    "Cannot create workenv directory: {}",
                    e
                )));
            }
        }
    }

    #[cfg(not(unix))]
    {
        warn!("⚠️ Disk space check not implemented for this platform");
    }

    Ok(())
}

/// Setup workenv directories with proper permissions
pub(super) fn setup_workenv_directories(
    workenv_path: &Path,
    workenv_info: &WorkenvInfo,
) -> Result<()> {
    #[cfg(unix)]
    let _umask_guard = workenv_info
        .umask
        .as_deref()
        .and_then(|mask| u32::from_str_radix(mask.trim_start_matches('0'), 8).ok())
        .map(UmaskGuard::apply);

    if let Some(ref directories) = workenv_info.directories {
        for dir_spec in directories {
            let expanded_path = normalize_platform_tokens(&dir_spec.path);

            // Every declared directory must live under {workenv}; this is the
            // only path base the launcher creates or sets permissions on.
            let path_str = if expanded_path.starts_with("{workenv}/") {
                &expanded_path["{workenv}/".len()..]
            } else if expanded_path == "{workenv}" {
                ""
            } else {
                return Err(PspfError::policy(format!(
                    "workenv directory path {:?} does not start with {{workenv}}",
                    dir_spec.path
                )));
            };

            let dir_path = if path_str.is_empty() {
                workenv_path.to_path_buf()
            } else {
                workenv_path.join(path_str)
            };
            debug!("📁 Creating directory: {:?}", dir_path);
            fs::create_dir_all(&dir_path)?;

            // Set permissions on Unix systems
            #[cfg(unix)]
            {
                use super::super::defaults::DEFAULT_DIR_PERMS;
                use std::os::unix::fs::PermissionsExt;

                // Use specified mode or default to 0700 (user-only access)
                let mode_str = dir_spec.mode.as_deref().unwrap_or("0700");

                // Parse octal mode string (e.g., "0700")
                if let Ok(mode) = u32::from_str_radix(mode_str.trim_start_matches('0'), 8) {
                    let permissions = fs::Permissions::from_mode(mode);
                    fs::set_permissions(&dir_path, permissions)?;
                    debug!("🔒 Set permissions {} on {:?}", mode_str, dir_path);
                } else {
                    // Fallback to default dir permissions if parsing fails
                    let permissions = fs::Permissions::from_mode(DEFAULT_DIR_PERMS as u32);
                    fs::set_permissions(&dir_path, permissions)?;
                    debug!(
                        "🔒 Set default permissions {} on {:?}",
                        DEFAULT_DIR_PERMS, dir_path
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::super::metadata::DirectorySpec;

    #[test]
    fn directory_path_missing_workenv_prefix_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let info = WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "tmp".to_string(),
                mode: None,
            }]),
            env: None,
            umask: None,
        };
        let err = setup_workenv_directories(tmp.path(), &info).unwrap_err();
        assert!(matches!(err, PspfError::Policy(_)));
    }

    #[test]
    fn directory_path_with_workenv_prefix_is_created() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let info = WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "{workenv}/logs".to_string(),
                mode: Some("0755".to_string()),
            }]),
            env: None,
            umask: None,
        };
        setup_workenv_directories(tmp.path(), &info).expect("setup should succeed");
        assert!(tmp.path().join("logs").is_dir());
    }

    #[test]
    fn os_and_arch_tokens_expand_before_the_workenv_prefix_check() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let info = WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "{workenv}/cache/{os}/{arch}".to_string(),
                mode: None,
            }]),
            env: None,
            umask: None,
        };
        setup_workenv_directories(tmp.path(), &info).expect("setup should succeed");
        let expected = tmp
            .path()
            .join("cache")
            .join(std::env::consts::OS)
            .join(std::env::consts::ARCH);
        assert!(expected.is_dir());
    }

    #[test]
    fn bare_workenv_placeholder_resolves_to_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let info = WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "{workenv}".to_string(),
                mode: None,
            }]),
            env: None,
            umask: None,
        };
        setup_workenv_directories(tmp.path(), &info).expect("setup should succeed");
        assert!(tmp.path().is_dir());
    }
}
