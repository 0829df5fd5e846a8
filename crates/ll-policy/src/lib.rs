//! Landlock policies for unprivileged processes.
//!
//! A policy is a [`Config`] naming the rights to restrict, plus [`Rule`]s
//! granting some of them back beneath given paths or on given ports.
//! Enforcing it is irreversible and covers every thread of the process,
//! designed to be used right before exec.
//!
//! # Architecture
//!
//! 1. Rules are checked against the config, without touching the kernel
//! 2. The kernel's Landlock ABI version is probed
//! 3. Best-effort configs are narrowed to that version; strict ones must fit it
//! 4. The ruleset is built, then enforced with no-new-privileges set
//!
//! # Usage
//!
//! ```no_run
//! use ll_policy::rule::{ro_dirs, rw_dirs};
//! use ll_policy::Config;
//!
//! let enforced = Config::V5
//!     .best_effort()
//!     .restrict([ro_dirs(["/usr", "/etc"]), rw_dirs(["/tmp"])])
//!     .expect("Landlock enforcement failed");
//! // Everything else beneath / is now off limits
//! println!("{enforced}");
//! ```

pub mod abi;
pub mod access;
pub mod config;
pub mod downgrade;
pub mod error;
pub mod groups;
pub mod kernel;
pub mod policy;
pub mod restrict;
pub mod rule;

pub use abi::AbiInfo;
pub use access::{AccessFs, AccessNet, RestrictFlags, Scope};
pub use config::{Config, ConfigArg, ConfigError};
pub use error::Error;
pub use kernel::{Kernel, Syscalls};
pub use policy::Policy;
pub use restrict::Enforced;
pub use rule::Rule;
