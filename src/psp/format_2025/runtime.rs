//! Runtime environment processing for PSPF/2025
//!
//! This module handles the runtime.env configuration from PSPF metadata,
//! allowing packages to control their execution environment through
//! environment variable operations.
//!
//! The implementation has been refactored into sub-modules for better
//! maintainability and reduced cognitive complexity.

// Use RuntimeEnv from metadata module
use super::metadata::RuntimeEnv;

// Re-export the refactored runtime module components
pub use runtime_impl::process_runtime_env;

// Implementation modules
mod runtime_impl {
    use super::RuntimeEnv;
    use operations::{MapOperation, SetOperation, UnsetOperation};
    use patterns::PatternProcessor;

    use log::{debug, trace};
    use std::collections::HashMap;

    /// Process runtime environment configuration
    ///
    /// Operations are processed in this order (the four-layer security filter):
    /// 1. `unset` - Remove every variable matching an unset pattern.
    /// 2. `pass` - If non-empty, reduce the environment to that allowlist
    ///    (glob patterns permitted); on Windows a fixed set of loader-critical
    ///    variables is always retained regardless of the allowlist.
    /// 3. `map` - Rename variables (OLD -> NEW).
    /// 4. `set` - Assign literal values, overriding anything still present.
    ///
    /// # Arguments
    ///
    /// * `env_map` - Mutable reference to environment variables
    /// * `runtime_env` - Runtime environment configuration
    pub fn process_runtime_env(env_map: &mut HashMap<String, String>, runtime_env: &RuntimeEnv) {
        debug!("🔧 Processing runtime environment configuration");

        // 1. unset - pure removal, independent of the pass allowlist.
        if let Some(unset_patterns) = &runtime_env.unset {
            if unset_patterns.is_empty() {
                debug!("📭 No unset patterns (empty list)");
            } else {
                debug!("📋 Unset patterns found: {:?}", unset_patterns);
                UnsetOperation::new(unset_patterns).execute(env_map);
            }
        } else {
            debug!("📭 No unset patterns configured");
        }

        // 2. pass - reduce to allowlist, only when one is configured.
        let configured_pass = runtime_env.pass.clone().unwrap_or_default();
        if !configured_pass.is_empty() {
            let mut pass_patterns = configured_pass;

            // On Windows, loader-critical variables are always retained
            // regardless of the allowlist so the child process can start.
            #[cfg(target_os = "windows")]
            {
                let windows_critical_vars = [
                    "SYSTEMROOT",
                    "WINDIR",
                    "TEMP",
                    "TMP",
                    "PATHEXT",
                    "COMSPEC",
                    "PATH",
                ];
                for var in windows_critical_vars {
                    if !pass_patterns.iter().any(|p| p == var) {
                        debug!("💻 Auto-retaining Windows critical variable: {}", var);
                        pass_patterns.push(var.to_string());
                    }
                }
            }

            let pattern_processor = PatternProcessor::new(&pass_patterns);
            reduce_to_allowlist(env_map, &pattern_processor);
        }

        // 3. map - rename variables.
        if let Some(map_ops) = &runtime_env.map {
            if !map_ops.is_empty() {
                let map_strings: Vec<String> = map_ops
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                MapOperation::new(&map_strings).execute(env_map);
            }
        }

        // 4. set - assign literal overrides.
        if let Some(set_ops) = &runtime_env.set {
            if !set_ops.is_empty() {
                let set_strings: Vec<String> = set_ops
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                SetOperation::new(&set_strings).execute(env_map);
            }
        }

        debug!("✅ Runtime environment processing complete");
    }

    /// Keep only the entries matching one of `processor`'s patterns.
    fn reduce_to_allowlist(env_map: &mut HashMap<String, String>, processor: &PatternProcessor) {
        let dropped: Vec<String> = env_map
            .keys()
            .filter(|k| !processor.should_preserve(k))
            .cloned()
            .collect();
        for key in dropped {
            env_map.remove(&key);
            trace!("🗑️ Dropped (not on pass allowlist): {}", key);
        }
    }

    mod patterns {
        use glob::Pattern;
        use log::{debug, trace};
        use std::collections::HashSet;

        /// Handles pattern matching for environment variable preservation
        pub(super) struct PatternProcessor {
            patterns: Vec<CompiledPattern>,
            exact_matches: HashSet<String>,
        }

        enum CompiledPattern {
            Exact(String),
            Glob(Pattern),
        }

        impl PatternProcessor {
            pub(super) fn new(pass_patterns: &[String]) -> Self {
                let mut patterns = Vec::new();
                let mut exact_matches = HashSet::new();

                for pattern in pass_patterns {
                    if pattern.contains('*') || pattern.contains('?') {
                        if let Ok(p) = Pattern::new(pattern) {
                            patterns.push(CompiledPattern::Glob(p));
                        } else {
                            exact_matches.insert(pattern.clone());
                            patterns.push(CompiledPattern::Exact(pattern.clone()));
                        }
                    } else {
                        exact_matches.insert(pattern.clone());
                        patterns.push(CompiledPattern::Exact(pattern.clone()));
                    }
                }

                debug!(
                    "📋 Pattern processor: {} patterns ({} exact)",
                    patterns.len(),
                    exact_matches.len()
                );

                Self {
                    patterns,
                    exact_matches,
                }
            }

            pub(super) fn should_preserve(&self, key: &str) -> bool {
                if self.exact_matches.contains(key) {
                    trace!("✅ Variable '{}' matches exact pattern", key);
                    return true;
                }

                for pattern in &self.patterns {
                    if let CompiledPattern::Glob(glob) = pattern {
                        if glob.matches(key) {
                            trace!("✅ Variable '{}' matches glob pattern: {}", key, glob);
                            return true;
                        }
                    }
                }

                trace!("❌ Variable '{}' does not match any preserve pattern", key);
                false
            }
        }
    }

    mod operations {
        use glob::Pattern;
        use log::{debug, trace, warn};
        use std::collections::HashMap;

        /// Handles unset operations on environment variables. Pure removal:
        /// the `pass` allowlist is applied as a separate later stage, so it
        /// does not protect a variable from being unset here.
        pub(super) struct UnsetOperation<'a> {
            patterns: &'a [String],
        }

        impl<'a> UnsetOperation<'a> {
            pub(super) fn new(patterns: &'a [String]) -> Self {
                Self { patterns }
            }

            pub(super) fn execute(&self, env_map: &mut HashMap<String, String>) {
                debug!("🗑️ Processing {} unset patterns", self.patterns.len());

                for pattern in self.patterns {
                    debug!("  Processing unset pattern: '{}'", pattern);
                    if pattern == "*" {
                        debug!("  Match: unset all");
                        let all_keys: Vec<String> = env_map.keys().cloned().collect();
                        for key in all_keys {
                            env_map.remove(&key);
                        }
                    } else if pattern.contains('*') || pattern.contains('?') {
                        debug!("  Match: glob pattern");
                        self.unset_glob_pattern(pattern, env_map);
                    } else {
                        debug!("  Match: exact pattern");
                        if env_map.remove(pattern.as_str()).is_some() {
                            trace!("  🗑️ Unset: {}", pattern);
                        }
                    }
                }
            }

            fn unset_glob_pattern(&self, pattern: &str, env_map: &mut HashMap<String, String>) {
                let glob_pattern = match Pattern::new(pattern) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("⚠️ Invalid glob pattern '{}': {}", pattern, e);
                        return;
                    }
                };

                let matching_keys: Vec<String> = env_map
                    .keys()
                    .filter(|k| glob_pattern.matches(k))
                    .cloned()
                    .collect();

                for key in matching_keys {
                    env_map.remove(&key);
                    trace!("  🗑️ Unset (glob): {}", key);
                }
            }
        }

        /// Handles map (rename) operations on environment variables.
        pub(super) struct MapOperation<'a> {
            mappings: &'a [String],
        }

        impl<'a> MapOperation<'a> {
            pub(super) fn new(mappings: &'a [String]) -> Self {
                Self { mappings }
            }

            pub(super) fn execute(&self, env_map: &mut HashMap<String, String>) {
                debug!("🔄 Processing {} map operations", self.mappings.len());

                for mapping in self.mappings {
                    let parts: Vec<&str> = mapping.splitn(2, '=').collect();

                    if parts.len() != 2 {
                        warn!("⚠️ Invalid map format '{}'", mapping);
                        continue;
                    }

                    let (old_key, new_key) = (parts[0], parts[1]);

                    if let Some(value) = env_map.remove(old_key) {
                        debug!("🔄 Mapped: {} -> {}", old_key, new_key);
                        env_map.insert(new_key.to_string(), value);
                    }
                }
            }
        }

        /// Handles set (literal assignment) operations on environment variables.
        pub(super) struct SetOperation<'a> {
            assignments: &'a [String],
        }

        impl<'a> SetOperation<'a> {
            pub(super) fn new(assignments: &'a [String]) -> Self {
                Self { assignments }
            }

            pub(super) fn execute(&self, env_map: &mut HashMap<String, String>) {
                debug!("📝 Processing {} set operations", self.assignments.len());

                for assignment in self.assignments {
                    let parts: Vec<&str> = assignment.splitn(2, '=').collect();

                    if parts.len() != 2 {
                        warn!("⚠️ Invalid set format '{}'", assignment);
                        continue;
                    }

                    let (key, value) = (parts[0], parts[1]);
                    debug!("📝 Set: {} = '{}'", key, value);
                    env_map.insert(key.to_string(), value.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unset_removes_exact_and_glob_matches() {
        let mut e = env(&[("SECRET", "1"), ("AWS_KEY", "2"), ("PATH", "/bin")]);
        let runtime_env = RuntimeEnv {
            unset: Some(vec!["SECRET".to_string(), "AWS_*".to_string()]),
            map: None,
            set: None,
            pass: None,
            extra: HashMap::new(),
        };
        process_runtime_env(&mut e, &runtime_env);
        assert!(!e.contains_key("SECRET"));
        assert!(!e.contains_key("AWS_KEY"));
        assert!(e.contains_key("PATH"));
    }

    #[test]
    fn non_empty_pass_reduces_to_allowlist() {
        let mut e = env(&[("PATH", "/bin"), ("SECRET", "1"), ("HOME", "/root")]);
        let runtime_env = RuntimeEnv {
            unset: None,
            map: None,
            set: None,
            pass: Some(vec!["PATH".to_string()]),
            extra: HashMap::new(),
        };
        process_runtime_env(&mut e, &runtime_env);
        assert_eq!(e.len(), 1);
        assert_eq!(e.get("PATH"), Some(&"/bin".to_string()));
    }

    #[test]
    fn empty_pass_keeps_everything_not_unset() {
        let mut e = env(&[("PATH", "/bin"), ("HOME", "/root")]);
        let runtime_env = RuntimeEnv {
            unset: None,
            map: None,
            set: None,
            pass: None,
            extra: HashMap::new(),
        };
        process_runtime_env(&mut e, &runtime_env);
        assert_eq!(e.len(), 2);
    }

    #[test]
    fn map_then_set_apply_after_pass_reduction() {
        let mut e = env(&[("OLD_NAME", "v1"), ("DROP_ME", "x")]);
        let mut set = HashMap::new();
        set.insert("EXTRA".to_string(), "added".to_string());
        let mut map = HashMap::new();
        map.insert("OLD_NAME".to_string(), "NEW_NAME".to_string());

        let runtime_env = RuntimeEnv {
            unset: None,
            map: Some(map),
            set: Some(set),
            pass: Some(vec!["OLD_NAME".to_string()]),
            extra: HashMap::new(),
        };
        process_runtime_env(&mut e, &runtime_env);

        assert!(!e.contains_key("DROP_ME"));
        assert_eq!(e.get("NEW_NAME"), Some(&"v1".to_string()));
        assert_eq!(e.get("EXTRA"), Some(&"added".to_string()));
    }

    #[test]
    fn set_overrides_existing_value() {
        let mut e = env(&[("FOO", "old")]);
        let mut set = HashMap::new();
        set.insert("FOO".to_string(), "new".to_string());
        let runtime_env = RuntimeEnv {
            unset: None,
            map: None,
            set: Some(set),
            pass: None,
            extra: HashMap::new(),
        };
        process_runtime_env(&mut e, &runtime_env);
        assert_eq!(e.get("FOO"), Some(&"new".to_string()));
    }
}
