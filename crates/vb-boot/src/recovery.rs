// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Recovery Boot Mode
//!
//! Recovery mode is entered when:
//!
//! 1. The recovery button is held at power-on (manual recovery)
//! 2. Normal boot found no disk or no valid kernel
//! 3. EC software sync, secure storage or the trust record failed
//! 4. The user declined developer mode and asked not to return to Normal
//!
//! # Behavior
//!
//! Only removable media is scanned, and only kernels signed with the
//! recovery key set are accepted. The handler polls for media until a
//! kernel verifies, shutdown is requested, or too many invalid media have
//! been inserted. While waiting between scans it watches for Ctrl+D, which
//! (after a trusted confirmation) requests Developer mode.
//!
//! When recovery was not requested manually and the configuration demands
//! it, the handler does not boot media at all and only waits for shutdown.

use vb_common::{disk_flags, log_info, log_trace, log_warn, BootMode, Error};

use crate::confirm::{confirm_flags, user_confirms, ConfirmRequest, ConfirmResult};
use crate::context::TrustContext;
use crate::dispatcher::{sync_ec_non_fatal, BootError, BootOutcome, Transition};
use crate::loader::{try_load_kernel, LoadError, LoadParams};
use crate::platform::{keys, BootServices};
use crate::verify::VerificationPolicy;

// ============================================================================
// Recovery Reason
// ============================================================================

/// Reason for entering recovery mode, persisted in the trust record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecoveryReason {
    /// No recovery requested
    NotRequested = 0x00,
    /// Recovery button held at power-on
    RoManual = 0x02,
    /// EC did not respond during software sync
    EcSoftwareSync = 0x22,
    /// No expected EC image
    EcExpectedImage = 0x25,
    /// EC flash failed
    EcUpdate = 0x26,
    /// EC not running the expected image after update
    EcJumpRw = 0x27,
    /// EC write protect failed
    EcProtect = 0x28,
    /// Replacement EC image failed verification
    EcExpectedHash = 0x29,
    /// Secure storage read failed
    TpmReadError = 0x47,
    /// Secure storage write failed
    TpmWriteError = 0x48,
    /// Secure storage lock failed
    TpmLockError = 0x49,
    /// Trust record failed validation
    TrustStateCorrupted = 0x4A,
    /// No disk for normal boot
    RwNoDisk = 0x5A,
    /// No valid kernel for normal boot
    RwNoKernel = 0x5B,
    /// Unknown or unspecified reason
    Unspecified = 0x7F,
}

impl From<u8> for RecoveryReason {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::NotRequested,
            0x02 => Self::RoManual,
            0x22 => Self::EcSoftwareSync,
            0x25 => Self::EcExpectedImage,
            0x26 => Self::EcUpdate,
            0x27 => Self::EcJumpRw,
            0x28 => Self::EcProtect,
            0x29 => Self::EcExpectedHash,
            0x47 => Self::TpmReadError,
            0x48 => Self::TpmWriteError,
            0x49 => Self::TpmLockError,
            0x4A => Self::TrustStateCorrupted,
            0x5A => Self::RwNoDisk,
            0x5B => Self::RwNoKernel,
            _ => Self::Unspecified,
        }
    }
}

impl RecoveryReason {
    /// Reason for a failed kernel load outside Recovery
    #[must_use]
    pub const fn for_load_error(e: LoadError) -> Self {
        match e {
            LoadError::NoDiskFound => Self::RwNoDisk,
            LoadError::VerificationFailed => Self::RwNoKernel,
            LoadError::InternalFault => Self::Unspecified,
        }
    }
}

// ============================================================================
// Recovery Boot
// ============================================================================

/// Handle a recovery-mode boot
pub fn run_recovery_boot(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    params: &mut LoadParams,
) -> BootOutcome {
    if ctx.mode != BootMode::Recovery {
        return BootOutcome::Failed(BootError::InternalFault(Error::InvalidBootMode));
    }

    let cfg = svc.config.recovery;
    let step_ms = cfg.key_poll_interval_ms.max(1);
    let steps = (cfg.disk_poll_interval_ms / step_ms).max(1);

    log_info!(
        svc.log,
        svc.platform.millis(),
        "recovery",
        "reason 0x{:02X} manual {}",
        ctx.recovery_reason as u8,
        ctx.flags.manual_recovery
    );

    if cfg.require_manual_for_media && !ctx.flags.manual_recovery {
        log_warn!(svc.log, svc.platform.millis(), "recovery", "not manual; waiting for shutdown");
        loop {
            if svc.platform.shutdown_requested() {
                return BootOutcome::Failed(BootError::ShutdownRequested);
            }
            svc.platform.sleep_ms(step_ms);
        }
    }

    let policy = VerificationPolicy::Recovery;
    let mut invalid_insertions = 0u32;
    let mut invalid_present = false;

    loop {
        if svc.platform.shutdown_requested() {
            return BootOutcome::Failed(BootError::ShutdownRequested);
        }

        params.disk_class = disk_flags::REMOVABLE;
        match try_load_kernel(ctx, svc, params, policy) {
            Ok(()) => {
                sync_ec_non_fatal(ctx, svc);
                return match params.take_handle() {
                    Some(handle) => BootOutcome::Selected(handle),
                    None => BootOutcome::Failed(BootError::InternalFault(Error::InternalError)),
                };
            }
            Err(LoadError::InternalFault) => {
                return BootOutcome::Failed(BootError::InternalFault(Error::InternalFault));
            }
            Err(LoadError::NoDiskFound) => invalid_present = false,
            Err(LoadError::VerificationFailed) => {
                // Count each insertion once, not each scan
                if !invalid_present {
                    invalid_insertions += 1;
                    log_warn!(
                        svc.log,
                        svc.platform.millis(),
                        "recovery",
                        "invalid media ({})",
                        invalid_insertions
                    );
                    if cfg
                        .max_invalid_insertions
                        .is_some_and(|max| invalid_insertions >= max)
                    {
                        return BootOutcome::Failed(BootError::ShutdownRequested);
                    }
                }
                invalid_present = true;
            }
        }

        for _ in 0..steps {
            if svc.platform.shutdown_requested() {
                return BootOutcome::Failed(BootError::ShutdownRequested);
            }
            if let Some(press) = svc.platform.read_key() {
                log_trace!(svc.log, svc.platform.millis(), "recovery", "key 0x{:02X}", press.key);
                if press.key == keys::CTRL_D {
                    if let Some(outcome) = request_developer(ctx, svc) {
                        return outcome;
                    }
                }
            }
            svc.platform.sleep_ms(step_ms);
        }
    }
}

/// Ctrl+D: switch to Developer mode after a trusted confirmation
fn request_developer(ctx: &TrustContext, svc: &mut BootServices<'_>) -> Option<BootOutcome> {
    if !svc.config.recovery.allow_dev_switch || !ctx.flags.manual_recovery {
        log_info!(svc.log, svc.platform.millis(), "recovery", "developer switch not allowed");
        return None;
    }

    let req = ConfirmRequest::new(
        confirm_flags::MUST_TRUST_KEYBOARD | confirm_flags::SPACE_MEANS_NO,
    );
    match user_confirms(ctx, svc, req) {
        ConfirmResult::Yes(_) => {
            log_info!(svc.log, svc.platform.millis(), "recovery", "developer mode requested");
            Some(BootOutcome::Transition(Transition {
                to: BootMode::Developer,
                reason: RecoveryReason::NotRequested,
                cause: None,
            }))
        }
        ConfirmResult::No => None,
        ConfirmResult::ShutdownRequested => Some(BootOutcome::Failed(BootError::ShutdownRequested)),
    }
}
