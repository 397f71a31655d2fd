// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the verified-boot core
//!
//! This module defines the unified error type used throughout the boot stage.
//! All errors are no_std compatible and carry a stable 16-bit code that is
//! recorded in boot diagnostics.

use core::fmt;

/// Result type alias for verified-boot operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the verified-boot core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Disk Errors (0x01xx)
    // =========================================================================
    /// No disk of the requested class is present
    NoDiskFound,
    /// Disk enumeration layer failed
    DiskEnumerationFailed,
    /// Partition table could not be parsed
    PartitionTableInvalid,
    /// Disk read failed
    DiskReadFailed,

    // =========================================================================
    // Verification Errors (0x02xx)
    // =========================================================================
    /// No candidate kernel passed verification
    VerificationFailed,
    /// Signature verification failed
    InvalidSignature,
    /// Keyblock is malformed or its hash does not match
    InvalidKeyblock,
    /// Version rollback attempted (blocked)
    RollbackAttempted,
    /// Kernel body hash mismatch
    HashMismatch,
    /// Keyblock flags do not allow the current boot mode
    KeyblockModeMismatch,

    // =========================================================================
    // Secure Storage Errors (0x03xx)
    // =========================================================================
    /// Secure storage read failed
    StorageReadFailed,
    /// Secure storage write failed
    StorageWriteFailed,
    /// Write to secure storage did not persist
    StorageNotDurable,
    /// Secure storage lock failed
    StorageLockFailed,
    /// Persisted trust record is corrupted
    TrustStateCorrupted,

    // =========================================================================
    // EC Sync Errors (0x04xx)
    // =========================================================================
    /// Embedded controller did not respond
    EcUnavailable,
    /// No expected EC image descriptor available
    EcNoExpectedImage,
    /// Replacement EC image failed verification (never flashed)
    EcImageVerificationFailed,
    /// EC flash write/apply failed
    EcFlashFailed,
    /// EC running version does not match after update
    EcPostSyncMismatch,
    /// EC write protection could not be enabled
    EcProtectFailed,

    // =========================================================================
    // User Errors (0x05xx)
    // =========================================================================
    /// User declined to continue
    UserAborted,
    /// Shutdown requested (power button, lid, or user)
    ShutdownRequested,

    // =========================================================================
    // Boot Errors (0x06xx)
    // =========================================================================
    /// Handler invoked in the wrong boot mode
    InvalidBootMode,
    /// Too many mode transitions in one boot attempt
    TransitionLimitExceeded,
    /// Collaborator misbehaved; trust assumptions may be violated
    InternalFault,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Buffer is too small for operation
    BufferTooSmall,
    /// Invalid parameter provided
    InvalidParameter,
    /// Internal error (should not occur)
    InternalError,
}

impl Error {
    /// Get the error code for this error
    ///
    /// Error codes are organized by category:
    /// - 0x01xx: Disk errors
    /// - 0x02xx: Verification errors
    /// - 0x03xx: Secure storage errors
    /// - 0x04xx: EC sync errors
    /// - 0x05xx: User errors
    /// - 0x06xx: Boot errors
    /// - 0xFFxx: General errors
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            // Disk errors (0x01xx)
            Self::NoDiskFound => 0x0101,
            Self::DiskEnumerationFailed => 0x0102,
            Self::PartitionTableInvalid => 0x0103,
            Self::DiskReadFailed => 0x0104,

            // Verification errors (0x02xx)
            Self::VerificationFailed => 0x0201,
            Self::InvalidSignature => 0x0202,
            Self::InvalidKeyblock => 0x0203,
            Self::RollbackAttempted => 0x0204,
            Self::HashMismatch => 0x0205,
            Self::KeyblockModeMismatch => 0x0206,

            // Storage errors (0x03xx)
            Self::StorageReadFailed => 0x0301,
            Self::StorageWriteFailed => 0x0302,
            Self::StorageNotDurable => 0x0303,
            Self::StorageLockFailed => 0x0304,
            Self::TrustStateCorrupted => 0x0305,

            // EC errors (0x04xx)
            Self::EcUnavailable => 0x0401,
            Self::EcNoExpectedImage => 0x0402,
            Self::EcImageVerificationFailed => 0x0403,
            Self::EcFlashFailed => 0x0404,
            Self::EcPostSyncMismatch => 0x0405,
            Self::EcProtectFailed => 0x0406,

            // User errors (0x05xx)
            Self::UserAborted => 0x0501,
            Self::ShutdownRequested => 0x0502,

            // Boot errors (0x06xx)
            Self::InvalidBootMode => 0x0601,
            Self::TransitionLimitExceeded => 0x0602,
            Self::InternalFault => 0x0603,

            // General errors (0xFFxx)
            Self::BufferTooSmall => 0xFF01,
            Self::InvalidParameter => 0xFF02,
            Self::InternalError => 0xFFFF,
        }
    }

    /// Check if this is a security-critical error
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::InvalidKeyblock
                | Self::RollbackAttempted
                | Self::HashMismatch
                | Self::KeyblockModeMismatch
                | Self::StorageNotDurable
                | Self::TrustStateCorrupted
                | Self::EcImageVerificationFailed
                | Self::EcPostSyncMismatch
                | Self::InternalFault
        )
    }

    /// Check if the error ends the boot attempt without any mode fallback
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UserAborted
                | Self::ShutdownRequested
                | Self::InternalFault
                | Self::TransitionLimitExceeded
        )
    }

    /// Get a short description of the error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NoDiskFound => "no disk found",
            Self::DiskEnumerationFailed => "disk enumeration failed",
            Self::PartitionTableInvalid => "partition table invalid",
            Self::DiskReadFailed => "disk read failed",
            Self::VerificationFailed => "kernel verification failed",
            Self::InvalidSignature => "signature verification failed",
            Self::InvalidKeyblock => "invalid keyblock",
            Self::RollbackAttempted => "rollback attempted",
            Self::HashMismatch => "hash mismatch",
            Self::KeyblockModeMismatch => "keyblock not valid for boot mode",
            Self::StorageReadFailed => "secure storage read failed",
            Self::StorageWriteFailed => "secure storage write failed",
            Self::StorageNotDurable => "secure storage write not durable",
            Self::StorageLockFailed => "secure storage lock failed",
            Self::TrustStateCorrupted => "trust state corrupted",
            Self::EcUnavailable => "EC unavailable",
            Self::EcNoExpectedImage => "no expected EC image",
            Self::EcImageVerificationFailed => "EC image verification failed",
            Self::EcFlashFailed => "EC flash failed",
            Self::EcPostSyncMismatch => "EC version mismatch after sync",
            Self::EcProtectFailed => "EC protect failed",
            Self::UserAborted => "user aborted",
            Self::ShutdownRequested => "shutdown requested",
            Self::InvalidBootMode => "invalid boot mode",
            Self::TransitionLimitExceeded => "too many mode transitions",
            Self::InternalFault => "internal fault",
            Self::BufferTooSmall => "buffer too small",
            Self::InvalidParameter => "invalid parameter",
            Self::InternalError => "internal error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "[0x{:04X}] {}", self.code(), self.description());
    }
}
