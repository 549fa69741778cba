//! PSPF - Progressive Secure Package Format engine
//!
//! This crate provides functionality for building, launching, and verifying
//! self-executing PSPF containers, with support for multiple format versions.

// Enforce strict code quality and reliability
#![deny(
    // Safety
    unsafe_code,

    // Correctness
    missing_debug_implementations,
    unreachable_pub,

    // Future compatibility
    future_incompatible,

    // Rust 2018 idioms
    rust_2018_idioms,

    // All warnings must be fixed
    warnings,
)]
#![warn(
    // Documentation
    missing_docs,

    // Error handling best practices
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_enum_variant,

    // Code clarity and maintainability
    clippy::cognitive_complexity,
    clippy::too_many_arguments,
    clippy::type_complexity,

    // Best practices
    clippy::clone_on_ref_ptr,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::if_not_else,
    clippy::single_match_else,
    clippy::needless_continue,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
)]
#![allow(
    // Temporarily allowed but should be fixed
    clippy::too_many_arguments,  // Some functions need refactoring
    missing_docs,  // TODO: Complete documentation
)]

pub mod api;
pub mod exceptions;
pub mod exit_codes;
pub mod logger;
pub mod psp;
pub mod utils;
pub mod version;

use std::sync::atomic::AtomicU32;

// Re-export main API functions
pub use api::{BuildOptions, LaunchOptions, build_package, launch_package, verify_package};
pub use exceptions::PspfError;
pub use utils::get_platform_string;

// Re-export format-specific types for advanced usage
pub use psp::PackageFormat;
pub use psp::format_2025;

/// PID of a child process spawned in `FLAVOR_EXEC_MODE=spawn` mode.
///
/// Set by the launcher binary immediately after spawning; a zero value means
/// no child is currently running. The launcher's signal handler reads this to
/// forward SIGTERM/SIGINT to the child instead of only killing itself.
pub static CHILD_PID: AtomicU32 = AtomicU32::new(0);
