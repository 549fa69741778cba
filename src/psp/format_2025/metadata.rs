//! PSPF/2025 metadata structures and types

use crate::exceptions::{PspfError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Main metadata structure for a PSPF package
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    pub package: PackageInfo,
    pub slots: Vec<SlotMetadata>,
    pub execution: ExecutionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher: Option<LauncherInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_validation: Option<CacheValidationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workenv: Option<WorkenvInfo>,
    #[serde(default)]
    pub setup_commands: Vec<Value>,
}

/// Package information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

/// Slot metadata for each data slot in the package
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotMetadata {
    #[serde(rename = "slot")]
    pub index: usize, // Position validator
    pub id: String,     // Arbitrary identifier
    pub source: String, // Source path
    pub target: String, // Destination in workenv
    pub size: i64,      // Size as stored in package
    pub checksum: String,
    pub operations: String, // Operation chain (e.g., "gzip", "tar|gzip")
    pub purpose: String,
    pub lifecycle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>, // Unix permissions as octal string (e.g., "0755")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>, // When to resolve: build|runtime|lazy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_ref: Option<bool>, // Self-referential slot (references launcher itself)
}

/// Execution configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutionInfo {
    pub primary_slot: usize,
    pub command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Catches the deprecated `environment` spelling (and any other
    /// unrecognized key) so [`Metadata::validate`] can reject it.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Verification information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationInfo {
    pub integrity_seal: IntegritySealInfo,
    #[serde(default)]
    pub signed: bool,
    #[serde(default = "default_true")]
    pub require_verification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_signatures: Option<TrustSignaturesInfo>,
}

fn default_true() -> bool {
    true
}

/// Integrity seal configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegritySealInfo {
    pub required: bool,
    pub algorithm: String,
}

/// Trust signatures configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustSignaturesInfo {
    pub required: bool,
    #[serde(default)]
    pub signers: Vec<SignerInfo>,
}

/// Signer information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerInfo {
    pub name: String,
    pub key_id: String,
    pub algorithm: String,
}

/// Build information (optional)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildInfo {
    pub tool: String,
    pub tool_version: String,
    pub timestamp: String,
    #[serde(default)]
    pub deterministic: bool,
    pub platform: PlatformInfo,
}

/// Platform information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub host: String,
}

/// Launcher information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LauncherInfo {
    pub tool: String,
    pub tool_version: String,
    pub size: i64,
    pub checksum: String,
    pub capabilities: Vec<String>,
}

/// Compatibility information
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompatibilityInfo {
    pub min_format_version: String,
    pub features: Vec<String>,
}

/// Cache validation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheValidationInfo {
    pub check_file: String,
    pub expected_content: String,
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<RuntimeEnv>,
}

/// Runtime environment configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeEnv {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unset: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<Vec<String>>,
    /// Any sub-key other than `unset`/`map`/`set`/`pass`; presence of
    /// anything here is an `UnknownField` policy violation.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Work environment configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkenvInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<DirectorySpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Octal umask string applied while creating the directory tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umask: Option<String>,
}

/// Directory specification for workenv
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectorySpec {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>, // Unix permission mode like "0700"
}

fn is_valid_octal(value: &str) -> bool {
    u32::from_str_radix(value.trim_start_matches('0'), 8).is_ok() || value.trim_start_matches('0').is_empty()
}

impl Metadata {
    /// Check the schema rules a package's metadata must satisfy, independent
    /// of whether it came from a freshly-assembled build or a package read
    /// back off disk for verification.
    pub fn validate(&self) -> Result<()> {
        if self.format != "PSPF/2025" {
            return Err(PspfError::format(format!(
                "unsupported metadata format {:?}, expected \"PSPF/2025\"",
                self.format
            )));
        }

        if self.execution.extra.contains_key("environment") {
            return Err(PspfError::policy(
                "execution.environment is deprecated; use execution.env",
            ));
        }

        if let Some(ref workenv) = self.workenv {
            if let Some(ref umask) = workenv.umask {
                if !is_valid_octal(umask) {
                    return Err(PspfError::config(format!(
                        "workenv.umask {umask:?} is not a valid octal string"
                    )));
                }
            }

            if let Some(ref directories) = workenv.directories {
                for dir in directories {
                    if !dir.path.starts_with("{workenv}") {
                        return Err(PspfError::policy(format!(
                            "workenv directory path {:?} does not start with {{workenv}}",
                            dir.path
                        )));
                    }
                    if let Some(ref mode) = dir.mode {
                        if !is_valid_octal(mode) {
                            return Err(PspfError::config(format!(
                                "workenv directory mode {mode:?} is not a valid octal string"
                            )));
                        }
                    }
                }
            }
        }

        if let Some(ref runtime) = self.runtime {
            if let Some(ref env) = runtime.env {
                if let Some(unknown) = env.extra.keys().next() {
                    return Err(PspfError::policy(format!(
                        "runtime.env has unknown key {unknown:?}, expected one of unset/pass/map/set"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_metadata() -> Metadata {
        serde_json::from_value(serde_json::json!({
            "format": "PSPF/2025",
            "package": {"name": "demo", "version": "1.0.0"},
            "slots": [],
            "execution": {"primary_slot": 0, "command": "run", "env": {}}
        }))
        .expect("base metadata must deserialize")
    }

    #[test]
    fn base_metadata_validates() {
        assert!(base_metadata().validate().is_ok());
    }

    #[test]
    fn wrong_format_string_is_rejected() {
        let mut m = base_metadata();
        m.format = "PSPF/2024".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn deprecated_execution_environment_key_is_rejected() {
        let mut m = base_metadata();
        m.execution
            .extra
            .insert("environment".to_string(), serde_json::json!({}));
        assert!(m.validate().is_err());
    }

    #[test]
    fn workenv_directory_path_without_prefix_is_rejected() {
        let mut m = base_metadata();
        m.workenv = Some(WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "tmp".to_string(),
                mode: None,
            }]),
            env: None,
            umask: None,
        });
        let err = m.validate().unwrap_err();
        assert!(matches!(err, PspfError::Policy(_)));
    }

    #[test]
    fn workenv_directory_path_with_prefix_is_accepted() {
        let mut m = base_metadata();
        m.workenv = Some(WorkenvInfo {
            directories: Some(vec![DirectorySpec {
                path: "{workenv}/logs".to_string(),
                mode: Some("0750".to_string()),
            }]),
            env: None,
            umask: Some("0022".to_string()),
        });
        assert!(m.validate().is_ok());
    }

    #[test]
    fn invalid_umask_octal_is_rejected() {
        let mut m = base_metadata();
        m.workenv = Some(WorkenvInfo {
            directories: None,
            env: None,
            umask: Some("not-octal".to_string()),
        });
        let err = m.validate().unwrap_err();
        assert!(matches!(err, PspfError::Config(_)));
    }

    #[test]
    fn unknown_runtime_env_key_is_rejected() {
        let mut m = base_metadata();
        m.runtime = Some(serde_json::from_value(serde_json::json!({
            "env": {"unset": ["SECRET"], "bogus": true}
        }))
        .expect("runtime fixture must deserialize"));
        let err = m.validate().unwrap_err();
        assert!(matches!(err, PspfError::Policy(_)));
    }
}
