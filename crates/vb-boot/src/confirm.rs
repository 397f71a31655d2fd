// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Confirmation Gate
//!
//! Blocks until the user answers a yes/no question or shutdown is
//! requested. ENTER means yes, ESC means no, SPACE means no only when the
//! caller says so. When the answer must come from a trusted source, ENTER on
//! an untrusted keyboard is ignored; a press-and-release of the physical
//! recovery button always counts as a trusted yes.
//!
//! There is no timeout. The shutdown signal is polled on every iteration.

use vb_common::{log_debug, log_info, log_warn};

use crate::boot_log::{BootEvent, EventKind};
use crate::context::TrustContext;
use crate::platform::{keys, BootServices};

/// Confirmation flags
pub mod confirm_flags {
    /// Only accept a yes from a trusted source
    pub const MUST_TRUST_KEYBOARD: u32 = 1 << 0;
    /// SPACE answers no
    pub const SPACE_MEANS_NO: u32 = 1 << 1;
    /// ESC requests shutdown instead of answering no
    pub const ESC_MEANS_SHUTDOWN: u32 = 1 << 2;
}

/// One confirmation question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfirmRequest {
    flags: u32,
}

impl ConfirmRequest {
    /// Request with the given [`confirm_flags`]
    #[must_use]
    pub const fn new(flags: u32) -> Self {
        Self { flags }
    }

    /// Request that needs a trusted source unless the keyboard itself is
    /// trusted
    #[must_use]
    pub const fn trusted_unless(keyboard_trusted: bool, flags: u32) -> Self {
        if keyboard_trusted {
            Self::new(flags)
        } else {
            Self::new(flags | confirm_flags::MUST_TRUST_KEYBOARD)
        }
    }

    /// Check a flag
    #[must_use]
    pub const fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Where a yes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InputSource {
    /// Keyboard the platform trusts
    TrustedKeyboard = 1,
    /// Keyboard the platform does not trust (e.g. USB)
    UntrustedKeyboard = 2,
    /// Physical recovery button
    RecoveryButton = 3,
}

impl InputSource {
    /// Source is trusted
    #[must_use]
    pub const fn is_trusted(&self) -> bool {
        !matches!(self, Self::UntrustedKeyboard)
    }
}

/// Answer to a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmResult {
    /// Confirmed
    Yes(InputSource),
    /// Declined
    No,
    /// Shutdown was requested while waiting
    ShutdownRequested,
}

/// Wait for the user to answer `req`
pub fn user_confirms(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    req: ConfirmRequest,
) -> ConfirmResult {
    let must_trust = req.has(confirm_flags::MUST_TRUST_KEYBOARD);
    let mut button_held = false;

    loop {
        if svc.platform.shutdown_requested() {
            log_info!(svc.log, svc.platform.millis(), "confirm", "shutdown while waiting");
            return ConfirmResult::ShutdownRequested;
        }

        if let Some(press) = svc.platform.read_key() {
            let trusted = press.trusted || ctx.flags.keyboard_trusted;
            match press.key {
                keys::ENTER if must_trust && !trusted => {
                    log_debug!(
                        svc.log,
                        svc.platform.millis(),
                        "confirm",
                        "untrusted ENTER ignored"
                    );
                }
                keys::ENTER => {
                    let source = if trusted {
                        InputSource::TrustedKeyboard
                    } else {
                        InputSource::UntrustedKeyboard
                    };
                    return confirmed(ctx, svc, source);
                }
                keys::ESC if req.has(confirm_flags::ESC_MEANS_SHUTDOWN) => {
                    return ConfirmResult::ShutdownRequested;
                }
                keys::ESC => return ConfirmResult::No,
                keys::SPACE if req.has(confirm_flags::SPACE_MEANS_NO) => {
                    return ConfirmResult::No;
                }
                _ => {}
            }
        }

        // Yes on release, not on press
        let pressed = svc.platform.recovery_button_pressed();
        if button_held && !pressed {
            return confirmed(ctx, svc, InputSource::RecoveryButton);
        }
        button_held = pressed;

        svc.platform.sleep_ms(svc.config.confirm_poll_ms);
    }
}

fn confirmed(ctx: &TrustContext, svc: &mut BootServices<'_>, source: InputSource) -> ConfirmResult {
    if source.is_trusted() {
        log_info!(svc.log, svc.platform.millis(), "confirm", "yes ({:?})", source);
    } else {
        log_warn!(svc.log, svc.platform.millis(), "confirm", "yes from untrusted keyboard");
        let now = svc.platform.millis();
        let event = BootEvent::in_mode(EventKind::UntrustedConfirmation, ctx.mode, now)
            .with_detail(source as u8);
        svc.events.record(event);
    }
    ConfirmResult::Yes(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_unless() {
        let req = ConfirmRequest::trusted_unless(false, confirm_flags::SPACE_MEANS_NO);
        assert!(req.has(confirm_flags::MUST_TRUST_KEYBOARD));
        assert!(req.has(confirm_flags::SPACE_MEANS_NO));

        let req = ConfirmRequest::trusted_unless(true, confirm_flags::SPACE_MEANS_NO);
        assert!(!req.has(confirm_flags::MUST_TRUST_KEYBOARD));
    }

    #[test]
    fn test_source_trust() {
        assert!(InputSource::RecoveryButton.is_trusted());
        assert!(InputSource::TrustedKeyboard.is_trusted());
        assert!(!InputSource::UntrustedKeyboard.is_trusted());
    }
}
