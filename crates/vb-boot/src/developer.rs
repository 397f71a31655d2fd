// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Developer Boot Mode
//!
//! Relaxed verification gated by user confirmation:
//!
//! 1. The user must confirm developer mode before anything is loaded
//! 2. Fixed and removable disks are tried in configured order for a number
//!    of rounds; each removable attempt is confirmed separately
//! 3. When every round fails, the user chooses between returning to Normal
//!    mode and entering Recovery
//!
//! EC sync failures are logged and recorded but do not stop the boot.

use heapless::Vec;
use vb_common::{log_info, log_warn, BootMode, DevBootTarget, Error};

use crate::confirm::{confirm_flags, user_confirms, ConfirmRequest, ConfirmResult};
use crate::context::TrustContext;
use crate::dispatcher::{sync_ec_non_fatal, BootError, BootOutcome, Transition};
use crate::loader::{try_load_kernel, LoadError, LoadParams};
use crate::platform::BootServices;
use crate::recovery::RecoveryReason;
use crate::verify::VerificationPolicy;

/// Handle a developer-mode boot
pub fn run_developer_boot(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    params: &mut LoadParams,
) -> BootOutcome {
    if ctx.mode != BootMode::Developer {
        return BootOutcome::Failed(BootError::InternalFault(Error::InvalidBootMode));
    }

    let dev = svc.config.developer;
    let req = ConfirmRequest::trusted_unless(
        ctx.flags.keyboard_trusted,
        confirm_flags::SPACE_MEANS_NO,
    );

    match user_confirms(ctx, svc, req) {
        ConfirmResult::Yes(_) => {}
        ConfirmResult::No => {
            log_info!(svc.log, svc.platform.millis(), "developer", "declined");
            return BootOutcome::Failed(BootError::UserAborted);
        }
        ConfirmResult::ShutdownRequested => {
            return BootOutcome::Failed(BootError::ShutdownRequested);
        }
    }

    let mut targets: Vec<DevBootTarget, 2> = Vec::new();
    for target in [dev.default_target, dev.default_target.other()] {
        if target == DevBootTarget::Removable && !dev.allow_removable {
            continue;
        }
        let _ = targets.push(target);
    }

    let policy = VerificationPolicy::for_mode(BootMode::Developer, &dev);
    let mut last_error = LoadError::NoDiskFound;

    for round in 0..dev.load_attempts.max(1) {
        for &target in &targets {
            if target == DevBootTarget::Removable {
                match user_confirms(ctx, svc, req) {
                    ConfirmResult::Yes(_) => {}
                    ConfirmResult::No => {
                        log_info!(svc.log, svc.platform.millis(), "developer", "removable skipped");
                        continue;
                    }
                    ConfirmResult::ShutdownRequested => {
                        return BootOutcome::Failed(BootError::ShutdownRequested);
                    }
                }
            }

            params.disk_class = target.disk_class();
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
                Err(e) => {
                    log_warn!(
                        svc.log,
                        svc.platform.millis(),
                        "developer",
                        "round {} {:?}: {:?}",
                        round,
                        target,
                        e
                    );
                    last_error = e;
                }
            }
        }
    }

    // Nothing booted: offer the way back to Normal mode
    match user_confirms(ctx, svc, req) {
        ConfirmResult::Yes(_) => BootOutcome::Transition(Transition {
            to: BootMode::Normal,
            reason: RecoveryReason::NotRequested,
            cause: Some(last_error.into()),
        }),
        ConfirmResult::No => BootOutcome::Transition(Transition {
            to: BootMode::Recovery,
            reason: RecoveryReason::for_load_error(last_error),
            cause: Some(last_error.into()),
        }),
        ConfirmResult::ShutdownRequested => BootOutcome::Failed(BootError::ShutdownRequested),
    }
}
