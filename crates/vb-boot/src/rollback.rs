// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Anti-Rollback Floor
//!
//! The kernel rollback floor is a combined version kept in secure storage.
//! Official kernels below it are never selected.
//!
//! # Update Rules
//!
//! 1. The floor only moves up; a lower target is a no-op
//! 2. Every write is confirmed by reading the value back
//! 3. After the handoff decision the floor is locked until next reset
//!
//! Only the dispatcher calls into this module, and only in Normal mode does
//! it advance the floor.

use vb_common::{Error, KernelVersion};

use crate::platform::{SecureStorage, StorageError};

/// Rollback floor error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackError {
    /// Floor could not be read
    ReadFailed,
    /// Floor could not be written
    WriteFailed,
    /// Write reported success but read-back disagrees
    NotDurable,
    /// Lock failed
    LockFailed,
}

impl From<RollbackError> for Error {
    fn from(e: RollbackError) -> Self {
        match e {
            RollbackError::ReadFailed => Error::StorageReadFailed,
            RollbackError::WriteFailed => Error::StorageWriteFailed,
            RollbackError::NotDurable => Error::StorageNotDurable,
            RollbackError::LockFailed => Error::StorageLockFailed,
        }
    }
}

/// Result of a floor commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorUpdate {
    /// Target was not above the current floor
    Unchanged,
    /// Floor advanced
    Advanced {
        /// Previous floor
        from: KernelVersion,
        /// New floor
        to: KernelVersion,
    },
}

/// Check a combined version against the floor
#[must_use]
pub fn is_allowed(floor: KernelVersion, version: KernelVersion) -> bool {
    version.key_version() >= floor.key_version() && version >= floor
}

/// Raise the floor to `target` if it is above `current`
///
/// `current` is the caller's snapshot of the stored floor.
pub fn commit_floor(
    storage: &mut dyn SecureStorage,
    current: KernelVersion,
    target: KernelVersion,
) -> Result<FloorUpdate, RollbackError> {
    if target <= current {
        return Ok(FloorUpdate::Unchanged);
    }

    storage
        .write_rollback_floor(target)
        .map_err(|_| RollbackError::WriteFailed)?;

    let stored = storage
        .read_rollback_floor()
        .map_err(|_| RollbackError::ReadFailed)?;
    if stored != target {
        return Err(RollbackError::NotDurable);
    }

    Ok(FloorUpdate::Advanced {
        from: current,
        to: target,
    })
}

/// Lock the floor for the rest of this boot
pub fn lock_floor(storage: &mut dyn SecureStorage) -> Result<(), RollbackError> {
    match storage.lock_rollback_floor() {
        Ok(()) | Err(StorageError::Locked) => Ok(()),
        Err(StorageError::Io) => Err(RollbackError::LockFailed),
    }
}
