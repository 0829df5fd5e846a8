//! Low-level Landlock syscall wrappers.
//!
//! This crate is the only place that talks to the kernel directly. The
//! policy logic in `ll-policy` reaches it through a narrow trait, so
//! everything here stays a thin, mechanical translation of the kernel ABI.
//!
//! ## Modules
//!
//! - **landlock** - ABI constants, attribute structs and the three syscalls
//! - **threads** - applying a per-thread syscall to every thread of the process
//!
//! On targets other than Linux every call fails with `ENOSYS`, which the
//! policy layer reads as "Landlock ABI version 0".
//!
//! # Safety
//!
//! The kernel ABI is expressed in raw integers and packed structs. Casts
//! between integer types are unavoidable at this boundary.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod landlock;
pub mod threads;

pub use nix::errno::Errno;
pub use threads::{all_threads, ThreadOp};
