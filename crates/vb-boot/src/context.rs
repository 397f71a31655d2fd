// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Trust context
//!
//! The per-boot view of what the platform trusts. It is built once from the
//! persisted trust record and the rollback floor, then owned by the
//! dispatcher; components only ever see it by shared reference.
//!
//! # Trust Record Layout
//!
//! ```text
//! Offset  Size    Description
//! 0x00    4       Magic (0x5642_5452 "VBTR")
//! 0x04    1       Record version
//! 0x05    1       Flags (bit 0: developer mode enabled)
//! 0x06    1       Pending recovery reason (0 = none)
//! 0x07    1       Reserved (0)
//! 0x08    4       Mode transitions recorded so far (little-endian)
//! 0x0C    4       CRC32 of bytes 0x00..0x0C
//! ```

use vb_common::{log_info, log_warn, BootMode, Error, KernelVersion};

use crate::boot_log::{crc32, BootEvent, EventKind};
use crate::platform::{BootServices, TRUST_RECORD_SIZE};
use crate::recovery::RecoveryReason;

/// Trust record magic
const RECORD_MAGIC: u32 = 0x5642_5452; // "VBTR"

/// Trust record format version
const RECORD_VERSION: u8 = 1;

/// Record flag: developer mode enabled
const FLAG_DEVELOPER: u8 = 1 << 0;

/// Platform-reported trust flags, fixed for the whole boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustFlags {
    /// Built-in keyboard is trusted for confirmations
    pub keyboard_trusted: bool,
    /// Recovery was requested with the physical recovery button
    pub manual_recovery: bool,
}

/// Persisted part of the trust state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustRecord {
    /// Developer mode is enabled
    pub developer: bool,
    /// Pending recovery request
    pub recovery_reason: RecoveryReason,
    /// Mode transitions recorded across boots
    pub transitions: u32,
}

/// Why a trust record could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Storage has never been written
    Blank,
    /// Magic, version or CRC mismatch
    Corrupt,
}

impl TrustRecord {
    /// Factory state: normal mode, nothing pending
    pub const FACTORY: Self = Self {
        developer: false,
        recovery_reason: RecoveryReason::NotRequested,
        transitions: 0,
    };

    /// Serialize with CRC
    #[must_use]
    pub fn encode(&self) -> [u8; TRUST_RECORD_SIZE] {
        let mut out = [0u8; TRUST_RECORD_SIZE];
        out[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        out[4] = RECORD_VERSION;
        out[5] = if self.developer { FLAG_DEVELOPER } else { 0 };
        out[6] = self.recovery_reason as u8;
        out[8..12].copy_from_slice(&self.transitions.to_le_bytes());
        let crc = crc32(&out[..12]);
        out[12..16].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parse and validate a stored record
    pub fn decode(bytes: &[u8; TRUST_RECORD_SIZE]) -> Result<Self, RecordError> {
        if bytes.iter().all(|&b| b == 0) || bytes.iter().all(|&b| b == 0xFF) {
            return Err(RecordError::Blank);
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let crc = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if magic != RECORD_MAGIC || bytes[4] != RECORD_VERSION || crc != crc32(&bytes[..12]) {
            return Err(RecordError::Corrupt);
        }
        if bytes[5] & !FLAG_DEVELOPER != 0 {
            return Err(RecordError::Corrupt);
        }

        Ok(Self {
            developer: bytes[5] & FLAG_DEVELOPER != 0,
            recovery_reason: RecoveryReason::from(bytes[6]),
            transitions: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Trust state for one boot attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustContext {
    /// Current boot mode
    pub mode: BootMode,
    /// Why recovery was entered (`NotRequested` outside Recovery)
    pub recovery_reason: RecoveryReason,
    /// Platform trust flags
    pub flags: TrustFlags,
    /// Rollback floor as read at boot start (advanced by the dispatcher)
    pub rollback_floor: KernelVersion,
    /// Persisted developer-mode flag
    pub developer_enabled: bool,
    /// Persisted transition counter
    pub transitions: u32,
}

impl TrustContext {
    /// Context with explicit values, for callers that manage persistence
    /// themselves
    #[must_use]
    pub const fn new(mode: BootMode, flags: TrustFlags, rollback_floor: KernelVersion) -> Self {
        Self {
            mode,
            recovery_reason: RecoveryReason::NotRequested,
            flags,
            rollback_floor,
            developer_enabled: matches!(mode, BootMode::Developer),
            transitions: 0,
        }
    }

    /// Build the context from secure storage
    ///
    /// Never fails: any storage problem selects Recovery mode with a reason
    /// describing what went wrong.
    pub fn load(svc: &mut BootServices<'_>, flags: TrustFlags) -> Self {
        let mut raw = [0u8; TRUST_RECORD_SIZE];
        let mut rejected = None;
        let (record, mut reason) = match svc.storage.read_trust_record(&mut raw) {
            Ok(()) => match TrustRecord::decode(&raw) {
                Ok(r) => (r, r.recovery_reason),
                Err(RecordError::Blank) => (TrustRecord::FACTORY, RecoveryReason::NotRequested),
                Err(RecordError::Corrupt) => {
                    log_warn!(svc.log, svc.platform.millis(), "context", "trust record corrupt");
                    rejected = Some(Error::TrustStateCorrupted);
                    (TrustRecord::FACTORY, RecoveryReason::TrustStateCorrupted)
                }
            },
            Err(_) => {
                log_warn!(svc.log, svc.platform.millis(), "context", "trust record unreadable");
                rejected = Some(Error::StorageReadFailed);
                (TrustRecord::FACTORY, RecoveryReason::TpmReadError)
            }
        };

        let rollback_floor = match svc.storage.read_rollback_floor() {
            Ok(v) => v,
            Err(_) => {
                log_warn!(svc.log, svc.platform.millis(), "context", "rollback floor unreadable");
                if reason == RecoveryReason::NotRequested {
                    reason = RecoveryReason::TpmReadError;
                }
                KernelVersion::ZERO
            }
        };

        if flags.manual_recovery {
            reason = RecoveryReason::RoManual;
        }

        let mode = if reason != RecoveryReason::NotRequested {
            BootMode::Recovery
        } else if record.developer {
            BootMode::Developer
        } else {
            BootMode::Normal
        };

        if let Some(cause) = rejected {
            let now = svc.platform.millis();
            let mut event =
                BootEvent::in_mode(EventKind::TrustRecordRejected, mode, now).with_error(cause);
            event.reason = reason as u8;
            svc.events.record(event);
        }

        log_info!(
            svc.log,
            svc.platform.millis(),
            "context",
            "mode {} reason 0x{:02X} floor {}",
            mode,
            reason as u8,
            rollback_floor
        );

        Self {
            mode,
            recovery_reason: reason,
            flags,
            rollback_floor,
            developer_enabled: record.developer,
            transitions: record.transitions,
        }
    }

    /// Persisted part of this context
    #[must_use]
    pub const fn record(&self) -> TrustRecord {
        TrustRecord {
            developer: self.developer_enabled,
            recovery_reason: self.recovery_reason,
            transitions: self.transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_encode_decode() {
        let record = TrustRecord {
            developer: true,
            recovery_reason: RecoveryReason::RwNoKernel,
            transitions: 9,
        };
        assert_eq!(TrustRecord::decode(&record.encode()), Ok(record));
    }

    #[test]
    fn test_blank_record() {
        assert_eq!(
            TrustRecord::decode(&[0; TRUST_RECORD_SIZE]),
            Err(RecordError::Blank)
        );
        assert_eq!(
            TrustRecord::decode(&[0xFF; TRUST_RECORD_SIZE]),
            Err(RecordError::Blank)
        );
    }

    #[test]
    fn test_corrupt_record() {
        let mut bytes = TrustRecord::FACTORY.encode();
        bytes[5] = FLAG_DEVELOPER;
        assert_eq!(TrustRecord::decode(&bytes), Err(RecordError::Corrupt));

        let mut bytes = TrustRecord::FACTORY.encode();
        bytes[4] = RECORD_VERSION + 1;
        assert_eq!(TrustRecord::decode(&bytes), Err(RecordError::Corrupt));
    }

    #[test]
    fn test_unknown_reason_stays_in_recovery() {
        let mut record = TrustRecord::FACTORY;
        record.recovery_reason = RecoveryReason::from(0xEE);
        assert_ne!(record.recovery_reason, RecoveryReason::NotRequested);
    }
}
