// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Platform collaborator interfaces
//!
//! The boot core never touches hardware directly. Disk access, partition
//! table parsing, signature checking, secure storage, the embedded
//! controller and the keyboard are all reached through the traits in this
//! module, bundled together in [`BootServices`].

use heapless::Vec;
use vb_common::log::LogBuffer;
use vb_common::{BootConfig, DiskHandle, Error, KernelVersion};
use zeroize::Zeroize;

use crate::boot_log::BootEventLog;
use crate::ec_sync::{EcDescriptor, EcFirmwareId};

// ============================================================================
// Limits
// ============================================================================

/// Maximum number of disks reported by one enumeration
pub const MAX_DISKS: usize = 8;

/// Maximum number of kernel partitions considered per disk
pub const MAX_KERNEL_PARTITIONS: usize = 8;

/// Minimum usable sector size in bytes
pub const MIN_SECTOR_SIZE: u64 = 512;

/// Minimum usable disk size in sectors (protective MBR + GPT header + entries)
pub const MIN_DISK_SECTORS: u64 = 16;

/// Size of the persisted trust record
pub const TRUST_RECORD_SIZE: usize = 16;

/// SHA3-256 digest size
pub const DIGEST_SIZE: usize = 32;

// ============================================================================
// Disk Types
// ============================================================================

/// Disk description returned by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    /// Handle for further access
    pub handle: DiskHandle,
    /// Sector size in bytes
    pub bytes_per_lba: u64,
    /// Disk size in sectors
    pub lba_count: u64,
    /// Class bits (see [`vb_common::disk_flags`])
    pub flags: u32,
}

impl DiskInfo {
    /// Check whether the disk can hold a partition table and belongs to one
    /// of the requested classes
    #[must_use]
    pub const fn is_usable(&self, class: u32) -> bool {
        let class_ok = self.flags & class & vb_common::disk_flags::CLASS_MASK != 0;
        let sector_ok =
            self.bytes_per_lba >= MIN_SECTOR_SIZE && self.bytes_per_lba.is_power_of_two();
        class_ok && sector_ok && self.lba_count >= MIN_DISK_SECTORS
    }
}

/// Kernel partition entry with its GPT boot attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPartition {
    /// 1-based partition number
    pub index: u8,
    /// First sector
    pub start_lba: u64,
    /// Size in sectors
    pub size_lba: u64,
    /// Boot priority (0 = never boot)
    pub priority: u8,
    /// Remaining trial boots
    pub tries: u8,
    /// Partition has booted successfully before
    pub successful: bool,
}

impl KernelPartition {
    /// A partition is bootable when it has nonzero priority and either has
    /// booted successfully or still has tries left
    #[must_use]
    pub const fn is_bootable(&self) -> bool {
        self.priority > 0 && (self.successful || self.tries > 0)
    }
}

/// Disk layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    /// Read or write failed
    Io,
    /// Partition table is malformed
    Parse,
}

impl From<DiskError> for Error {
    fn from(e: DiskError) -> Self {
        match e {
            DiskError::Io => Error::DiskReadFailed,
            DiskError::Parse => Error::PartitionTableInvalid,
        }
    }
}

// ============================================================================
// Kernel Image Types
// ============================================================================

/// Keyblock flags restricting the boot modes a kernel may run in
pub mod keyblock_flags {
    /// Valid when developer switch is off
    pub const DEVELOPER_0: u32 = 1 << 0;
    /// Valid when developer switch is on
    pub const DEVELOPER_1: u32 = 1 << 1;
    /// Valid when not in recovery mode
    pub const RECOVERY_0: u32 = 1 << 2;
    /// Valid in recovery mode
    pub const RECOVERY_1: u32 = 1 << 3;
}

/// Key set a kernel keyblock is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySet {
    /// Kernel subkey from the verified firmware
    Kernel,
    /// Recovery key from read-only firmware
    Recovery,
}

/// How a preamble was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    /// Keyblock signature chains to the requested key set
    Signed,
    /// Only the keyblock hash matched (self-signed)
    HashOnly,
}

/// Authenticated kernel preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPreamble {
    /// Data key version from the keyblock
    pub key_version: u16,
    /// Kernel version from the preamble
    pub kernel_version: u16,
    /// Keyblock mode flags
    pub keyblock_flags: u32,
    /// Authentication strength
    pub signature: SignatureKind,
    /// Body size in bytes
    pub body_size: u32,
    /// Body load address
    pub body_load_address: u64,
    /// Bootloader address within the body
    pub bootloader_address: u64,
    /// Bootloader size in bytes
    pub bootloader_size: u32,
}

impl KernelPreamble {
    /// Combined anti-rollback version
    #[must_use]
    pub const fn version(&self) -> KernelVersion {
        KernelVersion::new(self.key_version, self.kernel_version)
    }
}

/// Descriptor of a kernel body that has been loaded and hash-verified
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub struct KernelBody {
    /// Load address
    pub load_address: u64,
    /// Body size in bytes
    pub size: u32,
    /// Bootloader address
    pub bootloader_address: u64,
    /// Bootloader size in bytes
    pub bootloader_size: u32,
    /// Verified body digest
    pub digest: [u8; DIGEST_SIZE],
}

/// Kernel image verification error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// Could not read the partition
    Io,
    /// Keyblock or preamble malformed
    Malformed,
    /// Signature did not verify
    BadSignature,
    /// Keyblock hash did not match
    BadKeyblockHash,
    /// Body hash did not match the preamble
    BodyHashMismatch,
    /// Body does not fit the load region
    BodyTooLarge,
}

impl From<ImageError> for Error {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Io => Error::DiskReadFailed,
            ImageError::Malformed | ImageError::BadKeyblockHash => Error::InvalidKeyblock,
            ImageError::BadSignature => Error::InvalidSignature,
            ImageError::BodyHashMismatch => Error::HashMismatch,
            ImageError::BodyTooLarge => Error::BufferTooSmall,
        }
    }
}

// ============================================================================
// Storage Types
// ============================================================================

/// Secure storage error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Read or write failed
    Io,
    /// Space is locked for this boot
    Locked,
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io => Error::StorageReadFailed,
            StorageError::Locked => Error::StorageLockFailed,
        }
    }
}

// ============================================================================
// EC Types
// ============================================================================

/// EC transfer layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcError {
    /// EC did not respond
    Unavailable,
    /// No expected image for this device
    NoImage,
    /// Image read failed
    Io,
    /// Image signature rejected
    BadSignature,
    /// Flash write failed
    FlashFailed,
    /// Write protect could not be enabled
    ProtectFailed,
}

impl From<EcError> for Error {
    fn from(e: EcError) -> Self {
        match e {
            EcError::Unavailable | EcError::Io => Error::EcUnavailable,
            EcError::NoImage => Error::EcNoExpectedImage,
            EcError::BadSignature => Error::EcImageVerificationFailed,
            EcError::FlashFailed => Error::EcFlashFailed,
            EcError::ProtectFailed => Error::EcProtectFailed,
        }
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// Key codes understood by the boot core
pub mod keys {
    /// Ctrl+D
    pub const CTRL_D: u32 = 0x04;
    /// Enter
    pub const ENTER: u32 = 0x0D;
    /// Escape
    pub const ESC: u32 = 0x1B;
    /// Space
    pub const SPACE: u32 = 0x20;
}

/// One key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    /// Key code (see [`keys`])
    pub key: u32,
    /// Came from a keyboard the platform trusts (built-in, not USB)
    pub trusted: bool,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Raw disk enumeration
pub trait DiskEnumerator {
    /// Fill `out` with disks matching `class`; an empty result means no disk
    fn enumerate(
        &mut self,
        class: u32,
        scan_flags: u32,
        out: &mut Vec<DiskInfo, MAX_DISKS>,
    ) -> Result<(), DiskError>;

    /// Release every disk from the last enumeration except `keep`
    fn release(&mut self, keep: Option<DiskHandle>);
}

/// GPT access for kernel partitions
pub trait PartitionTable {
    /// Read the kernel partitions of `disk`
    fn kernel_partitions(
        &mut self,
        disk: &DiskInfo,
        out: &mut Vec<KernelPartition, MAX_KERNEL_PARTITIONS>,
    ) -> Result<(), DiskError>;

    /// Mark a partition as not bootable
    fn mark_bad(&mut self, disk: DiskHandle, index: u8) -> Result<(), DiskError>;

    /// Consume one trial boot of a partition
    fn mark_tried(&mut self, disk: DiskHandle, index: u8) -> Result<(), DiskError>;
}

/// Kernel keyblock/preamble/body verification
pub trait KernelVerifier {
    /// Authenticate the keyblock and preamble of a partition against `keys`
    fn verify_preamble(
        &mut self,
        disk: &DiskInfo,
        part: &KernelPartition,
        keys: KeySet,
    ) -> Result<KernelPreamble, ImageError>;

    /// Load the body and check it against the preamble hash
    fn load_body(
        &mut self,
        disk: &DiskInfo,
        part: &KernelPartition,
        preamble: &KernelPreamble,
    ) -> Result<KernelBody, ImageError>;
}

/// Persisted secure counters and trust record
pub trait SecureStorage {
    /// Read the kernel rollback floor
    fn read_rollback_floor(&mut self) -> Result<KernelVersion, StorageError>;

    /// Write the kernel rollback floor
    fn write_rollback_floor(&mut self, version: KernelVersion) -> Result<(), StorageError>;

    /// Lock the rollback floor against writes until next reset
    fn lock_rollback_floor(&mut self) -> Result<(), StorageError>;

    /// Read the trust record
    fn read_trust_record(&mut self, out: &mut [u8; TRUST_RECORD_SIZE])
        -> Result<(), StorageError>;

    /// Write the trust record
    fn write_trust_record(&mut self, data: &[u8; TRUST_RECORD_SIZE]) -> Result<(), StorageError>;
}

/// Embedded controller image transfer and flash
pub trait EcFlasher {
    /// Descriptor of the image the EC is expected to run
    fn expected_firmware(&mut self, devidx: u8) -> Result<EcDescriptor, EcError>;

    /// Version and hash of the image the EC is running
    fn running_firmware(&mut self, devidx: u8) -> Result<EcFirmwareId, EcError>;

    /// Read part of the replacement image; returns bytes read
    fn read_image(&mut self, devidx: u8, offset: u32, buf: &mut [u8]) -> Result<usize, EcError>;

    /// Check the replacement image signature over its digest
    fn verify_image(&mut self, devidx: u8, digest: &[u8; DIGEST_SIZE]) -> Result<(), EcError>;

    /// Write the replacement image to the EC
    fn flash_image(&mut self, devidx: u8) -> Result<(), EcError>;

    /// Re-read the running firmware after an update
    fn recheck_version(&mut self, devidx: u8) -> Result<EcFirmwareId, EcError>;

    /// Write-protect the EC image until next reset
    fn protect(&mut self, devidx: u8) -> Result<(), EcError>;
}

/// Keyboard, switches and timing
pub trait BootPlatform {
    /// Power button, lid close or other shutdown request pending
    fn shutdown_requested(&mut self) -> bool;

    /// Next key press, if any
    fn read_key(&mut self) -> Option<KeyPress>;

    /// Physical recovery button currently held
    fn recovery_button_pressed(&mut self) -> bool;

    /// Block for `ms` milliseconds
    fn sleep_ms(&mut self, ms: u32);

    /// Milliseconds since boot start
    fn millis(&self) -> u32;
}

// ============================================================================
// Service Bundle
// ============================================================================

/// Every collaborator the boot core needs, plus its log sinks
pub struct BootServices<'a> {
    /// Disk enumeration
    pub disks: &'a mut dyn DiskEnumerator,
    /// Partition tables
    pub gpt: &'a mut dyn PartitionTable,
    /// Kernel verification
    pub verifier: &'a mut dyn KernelVerifier,
    /// Secure storage
    pub storage: &'a mut dyn SecureStorage,
    /// Embedded controller
    pub ec: &'a mut dyn EcFlasher,
    /// Keyboard, switches, timing
    pub platform: &'a mut dyn BootPlatform,
    /// Provisioned configuration
    pub config: BootConfig,
    /// Diagnostic log
    pub log: LogBuffer,
    /// Security event log
    pub events: BootEventLog,
}

impl<'a> BootServices<'a> {
    /// Bundle collaborators with a configuration
    pub fn new(
        disks: &'a mut dyn DiskEnumerator,
        gpt: &'a mut dyn PartitionTable,
        verifier: &'a mut dyn KernelVerifier,
        storage: &'a mut dyn SecureStorage,
        ec: &'a mut dyn EcFlasher,
        platform: &'a mut dyn BootPlatform,
        config: BootConfig,
    ) -> Self {
        Self {
            disks,
            gpt,
            verifier,
            storage,
            ec,
            platform,
            config,
            log: LogBuffer::new(),
            events: BootEventLog::new(),
        }
    }
}
