//! Placeholder substitution utilities

use super::super::metadata::{Metadata, PackageInfo};
use log::warn;
use std::path::{Path, PathBuf};

/// Substitute the generic `{workenv}`, `{package_name}`, `{version}`,
/// `{os}`, `{arch}`, `{platform}` placeholders. Used for workenv directory
/// specs, setup commands, and anywhere the full slot table isn't in scope.
pub fn substitute_placeholders(text: &str, workenv_dir: &Path, package: &PackageInfo) -> String {
    let workenv_string;
    let workenv_str = if let Some(s) = workenv_dir.to_str() {
        s
    } else {
        warn!("Work environment path contains non-UTF8 characters, using lossy conversion");
        workenv_string = workenv_dir.to_string_lossy().into_owned();
        &workenv_string
    };
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    text.replace("{workenv}", workenv_str)
        .replace("{package_name}", &package.name)
        .replace("{version}", &package.version)
        .replace("{os}", os)
        .replace("{arch}", arch)
        .replace("{platform}", &format!("{os}-{arch}"))
}

/// Resolve the on-disk path a slot's extracted content lives at. A slot whose
/// `target` is empty or `.` expanded directly into the workenv root (the
/// typical case for a top-level `tar` slot), so its path *is* `workenv_dir`.
fn slot_target_path(workenv_dir: &Path, target: &str) -> PathBuf {
    if target.is_empty() || target == "." {
        workenv_dir.to_path_buf()
    } else {
        workenv_dir.join(target)
    }
}

/// Substitute every placeholder recognized by `execution.command` and
/// `execution.env`: `{primary}`, `{slot:N}` for each slot index, then the
/// generic `{workenv}` / `{package_name}` / `{version}` / `{os}` / `{arch}`
/// / `{platform}` placeholders.
pub fn substitute_command_placeholders(text: &str, workenv_dir: &Path, metadata: &Metadata) -> String {
    let mut result = text.to_string();

    if let Some(primary) = metadata.slots.get(metadata.execution.primary_slot) {
        let primary_path = slot_target_path(workenv_dir, &primary.target);
        result = result.replace("{primary}", &primary_path.to_string_lossy());
    }

    for slot in &metadata.slots {
        let placeholder = format!("{{slot:{}}}", slot.index);
        if result.contains(&placeholder) {
            let slot_path = slot_target_path(workenv_dir, &slot.target);
            result = result.replace(&placeholder, &slot_path.to_string_lossy());
        }
    }

    substitute_placeholders(&result, workenv_dir, &metadata.package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psp::format_2025::metadata::Metadata;

    fn metadata_fixture() -> Metadata {
        serde_json::from_value(serde_json::json!({
            "format": "PSPF/2025",
            "package": {"name": "demo", "version": "1.2.3"},
            "slots": [
                {
                    "slot": 0, "id": "payload", "source": "payload/", "target": ".",
                    "size": 10, "checksum": "sha256:aa", "operations": "tar.gz",
                    "purpose": "payload", "lifecycle": "runtime"
                },
                {
                    "slot": 1, "id": "config", "source": "app.toml", "target": "config/app.toml",
                    "size": 4, "checksum": "sha256:bb", "operations": "raw",
                    "purpose": "config", "lifecycle": "runtime"
                }
            ],
            "execution": {
                "primary_slot": 0,
                "command": "{primary}/bin/run --config {slot:1}",
                "env": {}
            }
        }))
        .expect("fixture metadata must deserialize")
    }

    #[test]
    fn primary_placeholder_resolves_to_workenv_root_for_dot_target() {
        let metadata = metadata_fixture();
        let workenv = Path::new("/cache/demo_1.2.3");
        let resolved = substitute_command_placeholders(
            &metadata.execution.command,
            workenv,
            &metadata,
        );
        assert_eq!(
            resolved,
            "/cache/demo_1.2.3/bin/run --config /cache/demo_1.2.3/config/app.toml"
        );
    }

    #[test]
    fn generic_placeholders_still_substitute() {
        let metadata = metadata_fixture();
        let workenv = Path::new("/cache/demo_1.2.3");
        let resolved =
            substitute_command_placeholders("{package_name}@{version} in {workenv}", workenv, &metadata);
        assert_eq!(resolved, "demo@1.2.3 in /cache/demo_1.2.3");
    }
}
