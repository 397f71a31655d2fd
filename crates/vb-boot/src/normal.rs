// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Normal boot: strict verification from the internal disk.

use vb_common::{disk_flags, log_info, log_warn, BootMode, Error};

use crate::context::TrustContext;
use crate::dispatcher::{sync_all_ec, BootError, BootOutcome, Transition};
use crate::loader::{try_load_kernel, LoadError, LoadParams};
use crate::platform::BootServices;
use crate::verify::VerificationPolicy;

/// Handle a normal-mode boot
///
/// Any load or EC sync failure becomes a transition to Recovery; this
/// handler never retries.
pub fn run_normal_boot(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    params: &mut LoadParams,
) -> BootOutcome {
    if ctx.mode != BootMode::Normal {
        return BootOutcome::Failed(BootError::InternalFault(Error::InvalidBootMode));
    }

    params.disk_class = disk_flags::FIXED;
    match try_load_kernel(ctx, svc, params, VerificationPolicy::Strict) {
        Ok(()) => {}
        Err(LoadError::InternalFault) => {
            return BootOutcome::Failed(BootError::InternalFault(Error::InternalFault));
        }
        Err(e) => {
            log_warn!(svc.log, svc.platform.millis(), "normal", "load failed: {:?}", e);
            let e = BootError::from(e);
            return BootOutcome::Transition(Transition {
                to: BootMode::Recovery,
                reason: e.recovery_reason(),
                cause: Some(e.into()),
            });
        }
    }

    if let Err(e) = sync_all_ec(ctx, svc) {
        params.out.clear();
        return BootOutcome::Transition(Transition {
            to: BootMode::Recovery,
            reason: e.recovery_reason(),
            cause: Some(e.into()),
        });
    }

    match params.take_handle() {
        Some(handle) => {
            log_info!(svc.log, svc.platform.millis(), "normal", "kernel ready");
            BootOutcome::Selected(handle)
        }
        None => BootOutcome::Failed(BootError::InternalFault(Error::InternalError)),
    }
}
