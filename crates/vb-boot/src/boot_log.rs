// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot Security Event Log
//!
//! Records the decisions that change what the platform trusts: mode
//! transitions, confirmations taken from an untrusted input, EC sync
//! failures and rollback floor advances. The log is a fixed ring of
//! self-validating records that the platform can export into persistent
//! storage or a diagnostics screen.
//!
//! # Record Format
//!
//! ```text
//! Offset  Size    Description
//! 0x00    1       Magic (0xBE)
//! 0x01    1       Event kind
//! 0x02    1       Mode before
//! 0x03    1       Mode after
//! 0x04    1       Recovery reason
//! 0x05    1       Detail byte (input source, EC device, ...)
//! 0x06    2       Error code (little-endian, 0 = none)
//! 0x08    4       Timestamp in ms (little-endian)
//! 0x0C    4       CRC32 of bytes 0x00..0x0C
//! ```

use vb_common::{BootMode, Error};

// ============================================================================
// Constants
// ============================================================================

/// Record magic byte
const RECORD_MAGIC: u8 = 0xBE;

/// Size of one encoded record
pub const EVENT_RECORD_SIZE: usize = 16;

/// Number of records kept (older ones are overwritten)
pub const MAX_EVENTS: usize = 16;

// ============================================================================
// Event Kind
// ============================================================================

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Dispatcher changed boot mode
    ModeTransition = 1,
    /// A confirmation from an untrusted keyboard was used to proceed
    UntrustedConfirmation = 2,
    /// EC software sync failed
    EcSyncFailed = 3,
    /// Rollback floor advanced
    RollbackAdvanced = 4,
    /// Kernel handed off
    KernelSelected = 5,
    /// Trust record could not be used and was replaced by the factory record
    TrustRecordRejected = 6,
    /// Unknown kind
    Unknown = 255,
}

impl From<u8> for EventKind {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::ModeTransition,
            2 => Self::UntrustedConfirmation,
            3 => Self::EcSyncFailed,
            4 => Self::RollbackAdvanced,
            5 => Self::KernelSelected,
            6 => Self::TrustRecordRejected,
            _ => Self::Unknown,
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// One decoded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootEvent {
    /// Event kind
    pub kind: EventKind,
    /// Mode in effect before the event
    pub from: BootMode,
    /// Mode in effect after the event
    pub to: BootMode,
    /// Recovery reason code (0 when not applicable)
    pub reason: u8,
    /// Kind-specific detail
    pub detail: u8,
    /// Error code of the cause (0 when none)
    pub code: u16,
    /// Milliseconds since boot start
    pub timestamp: u32,
}

impl BootEvent {
    /// Event that does not change mode
    #[must_use]
    pub const fn in_mode(kind: EventKind, mode: BootMode, timestamp: u32) -> Self {
        Self {
            kind,
            from: mode,
            to: mode,
            reason: 0,
            detail: 0,
            code: 0,
            timestamp,
        }
    }

    /// Attach a cause
    #[must_use]
    pub const fn with_error(mut self, error: Error) -> Self {
        self.code = error.code();
        self
    }

    /// Attach a detail byte
    #[must_use]
    pub const fn with_detail(mut self, detail: u8) -> Self {
        self.detail = detail;
        self
    }

    /// Encode into a self-validating record
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut out = [0u8; EVENT_RECORD_SIZE];
        out[0] = RECORD_MAGIC;
        out[1] = self.kind as u8;
        out[2] = self.from as u8;
        out[3] = self.to as u8;
        out[4] = self.reason;
        out[5] = self.detail;
        out[6..8].copy_from_slice(&self.code.to_le_bytes());
        out[8..12].copy_from_slice(&self.timestamp.to_le_bytes());
        let crc = crc32(&out[..12]);
        out[12..16].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a record; `None` if magic, CRC or mode bytes are invalid
    #[must_use]
    pub fn decode(bytes: &[u8; EVENT_RECORD_SIZE]) -> Option<Self> {
        if bytes[0] != RECORD_MAGIC {
            return None;
        }
        let stored = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if stored != crc32(&bytes[..12]) {
            return None;
        }

        Some(Self {
            kind: EventKind::from(bytes[1]),
            from: BootMode::try_from(bytes[2]).ok()?,
            to: BootMode::try_from(bytes[3]).ok()?,
            reason: bytes[4],
            detail: bytes[5],
            code: u16::from_le_bytes([bytes[6], bytes[7]]),
            timestamp: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

// ============================================================================
// Event Log
// ============================================================================

/// Ring of encoded events
pub struct BootEventLog {
    records: [[u8; EVENT_RECORD_SIZE]; MAX_EVENTS],
    write_index: usize,
    count: usize,
    total: u32,
}

impl BootEventLog {
    /// Create an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [[0; EVENT_RECORD_SIZE]; MAX_EVENTS],
            write_index: 0,
            count: 0,
            total: 0,
        }
    }

    /// Append an event, overwriting the oldest when full
    pub fn record(&mut self, event: BootEvent) {
        self.records[self.write_index] = event.encode();
        self.write_index = (self.write_index + 1) % MAX_EVENTS;
        if self.count < MAX_EVENTS {
            self.count += 1;
        }
        self.total = self.total.wrapping_add(1);
    }

    /// Number of retained events
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// No events retained
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Events ever recorded, including overwritten ones
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Iterate retained events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = BootEvent> + '_ {
        let start = if self.count < MAX_EVENTS {
            0
        } else {
            self.write_index
        };
        (0..self.count)
            .filter_map(move |i| BootEvent::decode(&self.records[(start + i) % MAX_EVENTS]))
    }

    /// Count retained events of one kind
    #[must_use]
    pub fn count_of(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Copy retained records, oldest first, into `out`
    ///
    /// Returns the number of bytes written.
    pub fn export(&self, out: &mut [u8]) -> Result<usize, Error> {
        let needed = self.count * EVENT_RECORD_SIZE;
        if out.len() < needed {
            return Err(Error::BufferTooSmall);
        }

        let start = if self.count < MAX_EVENTS {
            0
        } else {
            self.write_index
        };
        for (i, chunk) in out[..needed].chunks_exact_mut(EVENT_RECORD_SIZE).enumerate() {
            chunk.copy_from_slice(&self.records[(start + i) % MAX_EVENTS]);
        }

        Ok(needed)
    }
}

impl Default for BootEventLog {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CRC32
// ============================================================================

/// CRC32 (IEEE 802.3, reflected)
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;

    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}
