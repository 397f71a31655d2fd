// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! EC Software Sync
//!
//! Brings the embedded controller's running firmware to the version the
//! verified boot stage expects.
//!
//! # Sync Process
//!
//! 1. Read running version and hash; if they match the expected descriptor,
//!    only write-protect and return
//! 2. Hash the replacement image (SHA3-256) in chunks and compare against
//!    the expected hash in constant time
//! 3. Have the EC layer verify the image signature over that digest
//! 4. Flash, then re-read the running firmware; it must now match
//! 5. Write-protect until next reset
//!
//! Nothing is flashed unless steps 2 and 3 succeed.

use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use vb_common::Error;

use crate::platform::{BootServices, EcError, DIGEST_SIZE};
use crate::recovery::RecoveryReason;

/// Chunk size for image reads
pub const EC_READ_CHUNK: usize = 256;

/// Running or expected EC firmware identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcFirmwareId {
    /// Firmware version
    pub version: u32,
    /// SHA3-256 of the image
    pub hash: [u8; DIGEST_SIZE],
}

impl EcFirmwareId {
    /// Same version and hash (hash compared in constant time)
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let hash_eq: bool = self.hash[..].ct_eq(&other.hash[..]).into();
        hash_eq && self.version == other.version
    }
}

/// Expected EC firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcDescriptor {
    /// Identity the EC must end up running
    pub id: EcFirmwareId,
    /// Replacement image size in bytes
    pub image_size: u32,
}

/// One sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcSyncRequest {
    /// EC device index
    pub devidx: u8,
    /// Expected firmware
    pub expected: EcDescriptor,
}

/// Successful sync outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcSyncStatus {
    /// Running firmware already matched
    UpToDate,
    /// Firmware was replaced
    Updated,
}

/// Sync failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcSyncError {
    /// No expected image for this device
    NoExpectedImage,
    /// EC did not respond
    Unavailable,
    /// Replacement image failed hash or signature check (not flashed)
    VerificationFailed,
    /// Flash write failed
    FlashFailed,
    /// Running firmware does not match after the update
    PostSyncMismatch,
    /// Write protect failed
    ProtectFailed,
}

impl EcSyncError {
    /// Recovery reason recorded when this failure forces Recovery mode
    #[must_use]
    pub const fn recovery_reason(&self) -> RecoveryReason {
        match self {
            Self::NoExpectedImage => RecoveryReason::EcExpectedImage,
            Self::Unavailable => RecoveryReason::EcSoftwareSync,
            Self::VerificationFailed => RecoveryReason::EcExpectedHash,
            Self::FlashFailed => RecoveryReason::EcUpdate,
            Self::PostSyncMismatch => RecoveryReason::EcJumpRw,
            Self::ProtectFailed => RecoveryReason::EcProtect,
        }
    }
}

impl From<EcSyncError> for Error {
    fn from(e: EcSyncError) -> Self {
        match e {
            EcSyncError::NoExpectedImage => Error::EcNoExpectedImage,
            EcSyncError::Unavailable => Error::EcUnavailable,
            EcSyncError::VerificationFailed => Error::EcImageVerificationFailed,
            EcSyncError::FlashFailed => Error::EcFlashFailed,
            EcSyncError::PostSyncMismatch => Error::EcPostSyncMismatch,
            EcSyncError::ProtectFailed => Error::EcProtectFailed,
        }
    }
}

/// Build the request for `devidx` from the EC layer's expected descriptor
pub fn request_for(svc: &mut BootServices<'_>, devidx: u8) -> Result<EcSyncRequest, EcSyncError> {
    match svc.ec.expected_firmware(devidx) {
        Ok(expected) => Ok(EcSyncRequest { devidx, expected }),
        Err(EcError::NoImage) => Err(EcSyncError::NoExpectedImage),
        Err(_) => Err(EcSyncError::Unavailable),
    }
}

/// Synchronize one EC to its expected firmware
pub fn sync_ec(
    svc: &mut BootServices<'_>,
    req: &EcSyncRequest,
) -> Result<EcSyncStatus, EcSyncError> {
    let dev = req.devidx;
    let expected = &req.expected.id;

    let running = svc
        .ec
        .running_firmware(dev)
        .map_err(|_| EcSyncError::Unavailable)?;

    if running.matches(expected) {
        protect(svc, dev)?;
        return Ok(EcSyncStatus::UpToDate);
    }

    let digest = hash_image(svc, dev, req.expected.image_size)?;
    let hash_ok: bool = digest[..].ct_eq(&expected.hash[..]).into();
    if !hash_ok {
        return Err(EcSyncError::VerificationFailed);
    }
    svc.ec
        .verify_image(dev, &digest)
        .map_err(|_| EcSyncError::VerificationFailed)?;

    svc.ec
        .flash_image(dev)
        .map_err(|_| EcSyncError::FlashFailed)?;

    let after = svc
        .ec
        .recheck_version(dev)
        .map_err(|_| EcSyncError::PostSyncMismatch)?;
    if !after.matches(expected) {
        return Err(EcSyncError::PostSyncMismatch);
    }

    protect(svc, dev)?;
    Ok(EcSyncStatus::Updated)
}

fn protect(svc: &mut BootServices<'_>, dev: u8) -> Result<(), EcSyncError> {
    svc.ec.protect(dev).map_err(|_| EcSyncError::ProtectFailed)
}

/// SHA3-256 of the replacement image, read in chunks
fn hash_image(
    svc: &mut BootServices<'_>,
    dev: u8,
    size: u32,
) -> Result<[u8; DIGEST_SIZE], EcSyncError> {
    let mut hasher = Sha3_256::new();
    let mut buf = [0u8; EC_READ_CHUNK];
    let mut offset = 0u32;

    while offset < size {
        let want = EC_READ_CHUNK.min((size - offset) as usize);
        let n = svc
            .ec
            .read_image(dev, offset, &mut buf[..want])
            .map_err(|_| EcSyncError::VerificationFailed)?;
        if n == 0 || n > want {
            return Err(EcSyncError::VerificationFailed);
        }
        hasher.update(&buf[..n]);
        offset += n as u32;
    }

    Ok(hasher.finalize().into())
}
