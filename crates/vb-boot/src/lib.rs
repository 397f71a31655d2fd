// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Verified-Boot Kernel Selection Library
//!
//! This crate decides which kernel the platform boots:
//!
//! - **Dispatcher**: Runs the Normal, Developer or Recovery handler and
//!   applies mode transitions
//! - **Loader**: Finds, authenticates and ranks kernel candidates on disk
//! - **Confirm**: Waits for trusted user confirmation
//! - **EC Sync**: Brings embedded-controller firmware to the expected version
//! - **Rollback**: Keeps the anti-rollback floor moving forward only
//! - **Boot Log**: Records security-relevant boot events
//!
//! Hardware, cryptography and partition parsing are reached through the
//! traits in [`platform`].

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod platform;
pub mod context;
pub mod verify;
pub mod rollback;
pub mod loader;
pub mod confirm;
pub mod ec_sync;
pub mod normal;
pub mod developer;
pub mod recovery;
pub mod dispatcher;
pub mod boot_log;

#[cfg(feature = "sim")]
pub mod sim;

pub use context::{TrustContext, TrustFlags};
pub use dispatcher::{sync_ec_firmware, BootDispatcher, BootError, BootOutcome, Transition};
pub use loader::{try_load_kernel, KernelHandle, LoadParams};
pub use confirm::{user_confirms, ConfirmRequest, ConfirmResult};
pub use ec_sync::{EcSyncRequest, EcSyncStatus, EcSyncError};
pub use platform::BootServices;
pub use recovery::RecoveryReason;
pub use boot_log::{BootEvent, BootEventLog, EventKind};
pub use normal::run_normal_boot;
pub use developer::run_developer_boot;
pub use recovery::run_recovery_boot;
