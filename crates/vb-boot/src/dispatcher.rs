// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot Mode Dispatcher
//!
//! Owns the trust context and runs the handler for the current mode until a
//! kernel is selected or the boot ends.
//!
//! # State Machine
//!
//! ```text
//!            NoDisk / NoKernel / EC sync / storage
//!   Normal ──────────────────────────────────────▶ Recovery
//!     ▲                                             │  ▲
//!     │ to-normal confirmed                Ctrl+D   │  │ declined to-normal
//!     │                                             ▼  │
//!   Developer ◀─────────────────────────────────────┘  │
//!     └────────────────────────────────────────────────┘
//! ```
//!
//! Handlers report one [`BootOutcome`]. Only this module changes
//! `TrustContext::mode`, once per transition, and persists the change
//! before the next handler runs. The number of transitions per boot is
//! bounded by configuration.

use vb_common::{log_error, log_info, log_warn, BootMode, Error, KernelVersion};
use zeroize::Zeroize;

use crate::boot_log::{BootEvent, EventKind};
use crate::context::{TrustContext, TrustFlags};
use crate::developer::run_developer_boot;
use crate::ec_sync::{request_for, sync_ec, EcSyncError, EcSyncStatus};
use crate::loader::{KernelHandle, LoadError, LoadParams};
use crate::normal::run_normal_boot;
use crate::platform::BootServices;
use crate::recovery::{run_recovery_boot, RecoveryReason};
use crate::rollback::{commit_floor, is_allowed, lock_floor, FloorUpdate};

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal boot error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// No usable disk
    NoDiskFound,
    /// No kernel verified
    VerificationFailed,
    /// EC sync failed
    EcSyncFailed(EcSyncError),
    /// User declined
    UserAborted,
    /// Shutdown requested
    ShutdownRequested,
    /// Trust assumptions may be violated; no fallback
    InternalFault(Error),
}

impl BootError {
    /// Recovery reason recorded when this error forces Recovery mode
    #[must_use]
    pub const fn recovery_reason(&self) -> RecoveryReason {
        match self {
            Self::NoDiskFound => RecoveryReason::RwNoDisk,
            Self::VerificationFailed => RecoveryReason::RwNoKernel,
            Self::EcSyncFailed(kind) => kind.recovery_reason(),
            _ => RecoveryReason::Unspecified,
        }
    }
}

impl From<LoadError> for BootError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NoDiskFound => Self::NoDiskFound,
            LoadError::VerificationFailed => Self::VerificationFailed,
            LoadError::InternalFault => Self::InternalFault(Error::InternalFault),
        }
    }
}

impl From<BootError> for Error {
    fn from(e: BootError) -> Self {
        match e {
            BootError::NoDiskFound => Error::NoDiskFound,
            BootError::VerificationFailed => Error::VerificationFailed,
            BootError::EcSyncFailed(kind) => kind.into(),
            BootError::UserAborted => Error::UserAborted,
            BootError::ShutdownRequested => Error::ShutdownRequested,
            BootError::InternalFault(inner) => inner,
        }
    }
}

/// Mode change requested by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Target mode
    pub to: BootMode,
    /// Recovery reason (`NotRequested` unless entering Recovery)
    pub reason: RecoveryReason,
    /// Error that caused the change, if any
    pub cause: Option<Error>,
}

/// Result of one handler run
#[derive(Debug)]
pub enum BootOutcome {
    /// Kernel verified under the current mode's policy
    Selected(KernelHandle),
    /// Change mode and run another handler
    Transition(Transition),
    /// Stop
    Failed(BootError),
}

// ============================================================================
// EC Sync Entry Points
// ============================================================================

/// Synchronize EC device `devidx` to its expected firmware
///
/// Failures are logged, recorded in the event log and reported as
/// [`BootError::EcSyncFailed`]; the caller decides what they mean for the
/// current mode.
pub fn sync_ec_firmware(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    devidx: u8,
) -> Result<EcSyncStatus, BootError> {
    let result = request_for(svc, devidx).and_then(|req| sync_ec(svc, &req));

    match result {
        Ok(status) => {
            log_info!(svc.log, svc.platform.millis(), "ec_sync", "ec{}: {:?}", devidx, status);
        }
        Err(e) => {
            log_warn!(svc.log, svc.platform.millis(), "ec_sync", "ec{}: {:?}", devidx, e);
            let event = BootEvent::in_mode(EventKind::EcSyncFailed, ctx.mode, svc.platform.millis())
                .with_error(e.into())
                .with_detail(devidx);
            svc.events.record(event);
        }
    }

    result.map_err(BootError::EcSyncFailed)
}

/// Synchronize every configured EC device, stopping at the first failure
pub fn sync_all_ec(ctx: &TrustContext, svc: &mut BootServices<'_>) -> Result<(), BootError> {
    if !svc.config.ec_sync.enabled {
        return Ok(());
    }
    for devidx in 0..svc.config.ec_sync.device_count {
        sync_ec_firmware(ctx, svc, devidx)?;
    }
    Ok(())
}

/// EC sync outside Normal mode: failures are reported, never fatal
pub(crate) fn sync_ec_non_fatal(ctx: &TrustContext, svc: &mut BootServices<'_>) {
    if !svc.config.ec_sync.enabled {
        return;
    }
    let mut failed = 0u8;
    for devidx in 0..svc.config.ec_sync.device_count {
        if sync_ec_firmware(ctx, svc, devidx).is_err() {
            failed += 1;
        }
    }
    if failed > 0 {
        log_warn!(
            svc.log,
            svc.platform.millis(),
            "ec_sync",
            "{} device(s) not in sync, continuing in {}",
            failed,
            ctx.mode
        );
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs mode handlers until a kernel is selected or the boot stops
pub struct BootDispatcher<'a> {
    ctx: TrustContext,
    svc: BootServices<'a>,
    transitions: u8,
}

impl<'a> BootDispatcher<'a> {
    /// Dispatcher over an explicit context
    pub fn new(ctx: TrustContext, svc: BootServices<'a>) -> Self {
        Self {
            ctx,
            svc,
            transitions: 0,
        }
    }

    /// Dispatcher with the context loaded from secure storage
    pub fn start(mut svc: BootServices<'a>, flags: TrustFlags) -> Self {
        let ctx = TrustContext::load(&mut svc, flags);
        Self::new(ctx, svc)
    }

    /// Current trust context
    #[must_use]
    pub const fn context(&self) -> &TrustContext {
        &self.ctx
    }

    /// Collaborators and logs
    #[must_use]
    pub const fn services(&self) -> &BootServices<'a> {
        &self.svc
    }

    /// Mode transitions taken so far in this boot
    #[must_use]
    pub const fn transitions(&self) -> u8 {
        self.transitions
    }

    /// Release the context and collaborators
    pub fn into_parts(self) -> (TrustContext, BootServices<'a>) {
        (self.ctx, self.svc)
    }

    /// Run until a kernel is selected or the boot stops
    pub fn run(&mut self) -> Result<KernelHandle, BootError> {
        loop {
            let mut params = LoadParams::default();
            let outcome = match self.ctx.mode {
                BootMode::Normal => run_normal_boot(&self.ctx, &mut self.svc, &mut params),
                BootMode::Developer => run_developer_boot(&self.ctx, &mut self.svc, &mut params),
                BootMode::Recovery => run_recovery_boot(&self.ctx, &mut self.svc, &mut params),
            };
            params.out.clear();

            let transition = match outcome {
                BootOutcome::Selected(handle) => match self.finalize(handle) {
                    Ok(handle) => return Ok(handle),
                    Err(t) => t,
                },
                BootOutcome::Transition(t) => t,
                BootOutcome::Failed(e) => {
                    log_error!(
                        self.svc.log,
                        self.svc.platform.millis(),
                        "dispatcher",
                        "{} boot failed: {:?}",
                        self.ctx.mode,
                        e
                    );
                    return Err(e);
                }
            };

            self.apply(transition)?;
        }
    }

    /// Rollback floor and trust record bookkeeping before handoff
    fn finalize(&mut self, mut handle: KernelHandle) -> Result<KernelHandle, Transition> {
        let mode = self.ctx.mode;

        if handle.official && !is_allowed(self.ctx.rollback_floor, handle.version) {
            // The loader admitted a kernel below the floor
            handle.zeroize();
            return Err(Transition {
                to: BootMode::Recovery,
                reason: RecoveryReason::Unspecified,
                cause: Some(Error::RollbackAttempted),
            });
        }

        if mode == BootMode::Normal {
            if let Some(target) = handle.lowest_version {
                if let Err(e) = self.advance_floor(target) {
                    handle.zeroize();
                    return Err(Transition {
                        to: BootMode::Recovery,
                        reason: RecoveryReason::TpmWriteError,
                        cause: Some(e),
                    });
                }
            }
        }

        if mode != BootMode::Recovery {
            if let Err(e) = lock_floor(&mut *self.svc.storage) {
                handle.zeroize();
                return Err(Transition {
                    to: BootMode::Recovery,
                    reason: RecoveryReason::TpmLockError,
                    cause: Some(e.into()),
                });
            }
        } else if self.ctx.recovery_reason != RecoveryReason::NotRequested {
            // Recovery served its purpose; next boot starts from the base mode
            self.ctx.recovery_reason = RecoveryReason::NotRequested;
            self.persist();
        }

        log_info!(
            self.svc.log,
            self.svc.platform.millis(),
            "dispatcher",
            "{} boot: {} part {} v{}",
            mode,
            handle.disk,
            handle.partition,
            handle.version
        );
        let event = BootEvent::in_mode(EventKind::KernelSelected, mode, self.svc.platform.millis())
            .with_detail(handle.partition);
        self.svc.events.record(event);

        Ok(handle)
    }

    fn advance_floor(&mut self, target: KernelVersion) -> Result<(), Error> {
        match commit_floor(&mut *self.svc.storage, self.ctx.rollback_floor, target) {
            Ok(FloorUpdate::Unchanged) => Ok(()),
            Ok(FloorUpdate::Advanced { from, to }) => {
                log_info!(
                    self.svc.log,
                    self.svc.platform.millis(),
                    "rollback",
                    "floor {} -> {}",
                    from,
                    to
                );
                let event = BootEvent::in_mode(
                    EventKind::RollbackAdvanced,
                    self.ctx.mode,
                    self.svc.platform.millis(),
                );
                self.svc.events.record(event);
                self.ctx.rollback_floor = to;
                Ok(())
            }
            Err(e) => {
                log_error!(
                    self.svc.log,
                    self.svc.platform.millis(),
                    "rollback",
                    "floor commit failed: {:?}",
                    e
                );
                Err(e.into())
            }
        }
    }

    /// Switch mode once and persist the change
    fn apply(&mut self, t: Transition) -> Result<(), BootError> {
        let from = self.ctx.mode;

        if t.to == from {
            log_error!(
                self.svc.log,
                self.svc.platform.millis(),
                "dispatcher",
                "transition to current mode {}",
                from
            );
            return Err(BootError::InternalFault(Error::InvalidBootMode));
        }

        self.transitions = self.transitions.saturating_add(1);
        if self.transitions > self.svc.config.max_mode_transitions {
            log_error!(
                self.svc.log,
                self.svc.platform.millis(),
                "dispatcher",
                "transition limit reached"
            );
            return Err(BootError::InternalFault(Error::TransitionLimitExceeded));
        }

        let reason = if t.to == BootMode::Recovery {
            t.reason
        } else {
            RecoveryReason::NotRequested
        };

        log_warn!(
            self.svc.log,
            self.svc.platform.millis(),
            "dispatcher",
            "{} -> {} reason 0x{:02X}",
            from,
            t.to,
            reason as u8
        );

        let now = self.svc.platform.millis();
        let mut event = BootEvent::in_mode(EventKind::ModeTransition, from, now);
        event.to = t.to;
        event.reason = reason as u8;
        if let Some(cause) = t.cause {
            event = event.with_error(cause);
        }
        self.svc.events.record(event);

        self.ctx.mode = t.to;
        self.ctx.recovery_reason = reason;
        match t.to {
            BootMode::Normal => self.ctx.developer_enabled = false,
            BootMode::Developer => self.ctx.developer_enabled = true,
            BootMode::Recovery => {}
        }
        self.ctx.transitions = self.ctx.transitions.wrapping_add(1);
        self.persist();

        Ok(())
    }

    fn persist(&mut self) {
        let bytes = self.ctx.record().encode();
        if let Err(e) = self.svc.storage.write_trust_record(&bytes) {
            log_warn!(
                self.svc.log,
                self.svc.platform.millis(),
                "dispatcher",
                "trust record write failed: {:?}",
                e
            );
        }
    }
}
