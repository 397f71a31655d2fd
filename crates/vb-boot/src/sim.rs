// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated platform
//!
//! Host-side implementations of every collaborator trait, for tests and
//! board bring-up. Disks, partitions and kernel images live in one
//! [`SimMedia`] behind a `RefCell`, shared by the enumerator, GPT and
//! verifier views so that GPT updates are visible to later scans.
//!
//! ```ignore
//! let media = RefCell::new(SimMedia::new().with_disk(
//!     SimDisk::fixed(0).with_kernel(SimKernel::signed(2, 1, 1, 5)),
//! ));
//! let mut board = SimBoard::new(&media, SimStorage::new(floor), ec, SimPlatform::new());
//! let mut dispatcher = BootDispatcher::start(board.services(config), flags);
//! ```

use core::cell::RefCell;

use heapless::{Deque, Vec};
use sha3::{Digest, Sha3_256};
use vb_common::{disk_flags, BootConfig, DiskHandle, KernelVersion};

use crate::context::{RecordError, TrustRecord};
use crate::ec_sync::{EcDescriptor, EcFirmwareId};
use crate::platform::{
    keyblock_flags, BootPlatform, BootServices, DiskEnumerator, DiskError, DiskInfo, EcError,
    EcFlasher, ImageError, KernelBody, KernelPartition, KernelPreamble, KernelVerifier, KeyPress,
    KeySet, PartitionTable, SecureStorage, SignatureKind, StorageError, DIGEST_SIZE, MAX_DISKS,
    MAX_KERNEL_PARTITIONS, TRUST_RECORD_SIZE,
};

/// Body size of every simulated kernel
pub const SIM_BODY_SIZE: u32 = 0x4000;

/// Load address of every simulated kernel
pub const SIM_LOAD_ADDRESS: u64 = 0x10_0000;

/// Largest simulated EC image
pub const SIM_EC_IMAGE_MAX: usize = 1024;

/// Scripted input queue depth
pub const SIM_INPUT_DEPTH: usize = 64;

// ============================================================================
// Media
// ============================================================================

/// One kernel partition and the image stored in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimKernel {
    /// Partition number
    pub index: u8,
    /// GPT priority
    pub priority: u8,
    /// GPT tries
    pub tries: u8,
    /// GPT successful bit
    pub successful: bool,
    /// Keyblock data key version
    pub key_version: u16,
    /// Preamble kernel version
    pub kernel_version: u16,
    /// Keyblock flags
    pub keyblock_flags: u32,
    /// Key set that signed the keyblock (`None` = self-signed)
    pub signed_by: Option<KeySet>,
    /// Keyblock and preamble verify
    pub preamble_ok: bool,
    /// Body hash matches
    pub body_ok: bool,
    /// Body descriptor disagrees with the preamble
    pub inconsistent_body: bool,
    /// Marked bad by the loader
    pub marked_bad: bool,
    /// Trial boots consumed by the loader
    pub tries_consumed: u8,
}

impl SimKernel {
    const NORMAL_FLAGS: u32 =
        keyblock_flags::DEVELOPER_0 | keyblock_flags::DEVELOPER_1 | keyblock_flags::RECOVERY_0;
    const RECOVERY_FLAGS: u32 =
        keyblock_flags::DEVELOPER_0 | keyblock_flags::DEVELOPER_1 | keyblock_flags::RECOVERY_1;

    /// Kernel signed with the kernel key set, already booted successfully
    #[must_use]
    pub const fn signed(index: u8, priority: u8, key_version: u16, kernel_version: u16) -> Self {
        Self {
            index,
            priority,
            tries: 0,
            successful: true,
            key_version,
            kernel_version,
            keyblock_flags: Self::NORMAL_FLAGS,
            signed_by: Some(KeySet::Kernel),
            preamble_ok: true,
            body_ok: true,
            inconsistent_body: false,
            marked_bad: false,
            tries_consumed: 0,
        }
    }

    /// Kernel signed with the recovery key set
    #[must_use]
    pub const fn recovery(index: u8, priority: u8, key_version: u16, kernel_version: u16) -> Self {
        let mut k = Self::signed(index, priority, key_version, kernel_version);
        k.keyblock_flags = Self::RECOVERY_FLAGS;
        k.signed_by = Some(KeySet::Recovery);
        k
    }

    /// Self-signed developer kernel
    #[must_use]
    pub const fn self_signed(index: u8, priority: u8) -> Self {
        let mut k = Self::signed(index, priority, 0, 0);
        k.signed_by = None;
        k
    }

    /// Fresh partition with `tries` trial boots
    #[must_use]
    pub const fn on_trial(mut self, tries: u8) -> Self {
        self.successful = false;
        self.tries = tries;
        self
    }

    /// Override keyblock flags
    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.keyblock_flags = flags;
        self
    }

    /// Keyblock signature fails
    #[must_use]
    pub const fn bad_preamble(mut self) -> Self {
        self.preamble_ok = false;
        self
    }

    /// Body hash fails
    #[must_use]
    pub const fn bad_body(mut self) -> Self {
        self.body_ok = false;
        self
    }

    /// Verifier returns a body that disagrees with the preamble
    #[must_use]
    pub const fn inconsistent_body(mut self) -> Self {
        self.inconsistent_body = true;
        self
    }

    fn partition(&self) -> KernelPartition {
        KernelPartition {
            index: self.index,
            start_lba: 64 + u64::from(self.index) * 0x8000,
            size_lba: 0x8000,
            priority: if self.marked_bad { 0 } else { self.priority },
            tries: self.tries,
            successful: self.successful,
        }
    }

    fn preamble(&self, signature: SignatureKind) -> KernelPreamble {
        KernelPreamble {
            key_version: self.key_version,
            kernel_version: self.kernel_version,
            keyblock_flags: self.keyblock_flags,
            signature,
            body_size: SIM_BODY_SIZE,
            body_load_address: SIM_LOAD_ADDRESS,
            bootloader_address: SIM_LOAD_ADDRESS + 0x3000,
            bootloader_size: 0x800,
        }
    }
}

/// One simulated disk
#[derive(Debug, Clone)]
pub struct SimDisk {
    /// Geometry and class
    pub info: DiskInfo,
    /// Kernel partitions
    pub kernels: Vec<SimKernel, MAX_KERNEL_PARTITIONS>,
    /// First enumeration (0-based) that reports the disk
    pub appears_at_scan: u32,
    /// First enumeration that no longer reports the disk
    pub removed_at_scan: Option<u32>,
    /// Partition table parses
    pub gpt_ok: bool,
}

impl SimDisk {
    fn with_class(handle: u32, flags: u32) -> Self {
        Self {
            info: DiskInfo {
                handle: DiskHandle(handle),
                bytes_per_lba: 512,
                lba_count: 1 << 22,
                flags,
            },
            kernels: Vec::new(),
            appears_at_scan: 0,
            removed_at_scan: None,
            gpt_ok: true,
        }
    }

    /// Internal disk
    #[must_use]
    pub fn fixed(handle: u32) -> Self {
        Self::with_class(handle, disk_flags::FIXED)
    }

    /// USB stick or SD card
    #[must_use]
    pub fn removable(handle: u32) -> Self {
        Self::with_class(handle, disk_flags::REMOVABLE)
    }

    /// Add a kernel partition (ignored beyond capacity)
    #[must_use]
    pub fn with_kernel(mut self, kernel: SimKernel) -> Self {
        let _ = self.kernels.push(kernel);
        self
    }

    /// Override geometry
    #[must_use]
    pub fn with_geometry(mut self, bytes_per_lba: u64, lba_count: u64) -> Self {
        self.info.bytes_per_lba = bytes_per_lba;
        self.info.lba_count = lba_count;
        self
    }

    /// Report the disk only from enumeration `scan` onwards
    #[must_use]
    pub fn appearing_at(mut self, scan: u32) -> Self {
        self.appears_at_scan = scan;
        self
    }

    /// Stop reporting the disk from enumeration `scan` onwards
    #[must_use]
    pub fn removed_at(mut self, scan: u32) -> Self {
        self.removed_at_scan = Some(scan);
        self
    }

    fn present_at(&self, scan: u32) -> bool {
        self.appears_at_scan <= scan && self.removed_at_scan.map_or(true, |r| scan < r)
    }

    /// Partition table does not parse
    #[must_use]
    pub fn with_corrupt_gpt(mut self) -> Self {
        self.gpt_ok = false;
        self
    }
}

/// All simulated disks plus access counters
#[derive(Debug, Default)]
pub struct SimMedia {
    disks: Vec<SimDisk, MAX_DISKS>,
    /// Enumerations performed
    pub scans: u32,
    /// Argument of the last `release` call
    pub last_release: Option<Option<DiskHandle>>,
    /// Preamble verifications performed
    pub preamble_checks: u32,
    /// Body loads performed
    pub body_loads: u32,
    /// Every enumeration fails with an I/O error
    pub fail_enumeration: bool,
}

impl SimMedia {
    /// No disks
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disk (ignored beyond capacity)
    #[must_use]
    pub fn with_disk(mut self, disk: SimDisk) -> Self {
        let _ = self.disks.push(disk);
        self
    }

    /// Make every enumeration fail with an I/O error
    #[must_use]
    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Kernel state after the boot, for assertions
    #[must_use]
    pub fn kernel(&self, disk: u32, index: u8) -> Option<&SimKernel> {
        self.disk(DiskHandle(disk))?
            .kernels
            .iter()
            .find(|k| k.index == index)
    }

    fn disk(&self, handle: DiskHandle) -> Option<&SimDisk> {
        self.disks.iter().find(|d| d.info.handle == handle)
    }

    fn kernel_mut(&mut self, handle: DiskHandle, index: u8) -> Option<&mut SimKernel> {
        self.disks
            .iter_mut()
            .find(|d| d.info.handle == handle)?
            .kernels
            .iter_mut()
            .find(|k| k.index == index)
    }
}

/// Disk enumeration view of [`SimMedia`]
pub struct SimEnumerator<'m> {
    media: &'m RefCell<SimMedia>,
}

impl DiskEnumerator for SimEnumerator<'_> {
    fn enumerate(
        &mut self,
        class: u32,
        _scan_flags: u32,
        out: &mut Vec<DiskInfo, MAX_DISKS>,
    ) -> Result<(), DiskError> {
        let mut media = self.media.borrow_mut();
        let scan = media.scans;
        media.scans += 1;

        out.clear();
        if media.fail_enumeration {
            return Err(DiskError::Io);
        }
        for disk in media.disks.iter().filter(|d| d.present_at(scan)) {
            if disk.info.flags & class & disk_flags::CLASS_MASK != 0 {
                let _ = out.push(disk.info);
            }
        }
        Ok(())
    }

    fn release(&mut self, keep: Option<DiskHandle>) {
        self.media.borrow_mut().last_release = Some(keep);
    }
}

/// GPT view of [`SimMedia`]
pub struct SimGpt<'m> {
    media: &'m RefCell<SimMedia>,
}

impl PartitionTable for SimGpt<'_> {
    fn kernel_partitions(
        &mut self,
        disk: &DiskInfo,
        out: &mut Vec<KernelPartition, MAX_KERNEL_PARTITIONS>,
    ) -> Result<(), DiskError> {
        let media = self.media.borrow();
        let disk = media.disk(disk.handle).ok_or(DiskError::Io)?;
        if !disk.gpt_ok {
            return Err(DiskError::Parse);
        }

        out.clear();
        for k in &disk.kernels {
            let _ = out.push(k.partition());
        }
        Ok(())
    }

    fn mark_bad(&mut self, disk: DiskHandle, index: u8) -> Result<(), DiskError> {
        let mut media = self.media.borrow_mut();
        let k = media.kernel_mut(disk, index).ok_or(DiskError::Io)?;
        k.marked_bad = true;
        Ok(())
    }

    fn mark_tried(&mut self, disk: DiskHandle, index: u8) -> Result<(), DiskError> {
        let mut media = self.media.borrow_mut();
        let k = media.kernel_mut(disk, index).ok_or(DiskError::Io)?;
        k.tries = k.tries.saturating_sub(1);
        k.tries_consumed += 1;
        Ok(())
    }
}

/// Kernel verification view of [`SimMedia`]
pub struct SimVerifier<'m> {
    media: &'m RefCell<SimMedia>,
}

impl KernelVerifier for SimVerifier<'_> {
    fn verify_preamble(
        &mut self,
        disk: &DiskInfo,
        part: &KernelPartition,
        keys: KeySet,
    ) -> Result<KernelPreamble, ImageError> {
        let mut media = self.media.borrow_mut();
        media.preamble_checks += 1;
        let k = *media.kernel_mut(disk.handle, part.index).ok_or(ImageError::Io)?;
        if !k.preamble_ok {
            return Err(ImageError::BadSignature);
        }

        let signature = match k.signed_by {
            Some(set) if set == keys => SignatureKind::Signed,
            // Any intact keyblock passes the hash check, but the recovery
            // key set never accepts it
            _ if keys == KeySet::Kernel => SignatureKind::HashOnly,
            _ => return Err(ImageError::BadSignature),
        };
        Ok(k.preamble(signature))
    }

    fn load_body(
        &mut self,
        disk: &DiskInfo,
        part: &KernelPartition,
        preamble: &KernelPreamble,
    ) -> Result<KernelBody, ImageError> {
        let mut media = self.media.borrow_mut();
        media.body_loads += 1;
        let k = *media.kernel_mut(disk.handle, part.index).ok_or(ImageError::Io)?;
        if !k.body_ok {
            return Err(ImageError::BodyHashMismatch);
        }

        let size = if k.inconsistent_body {
            preamble.body_size + 1
        } else {
            preamble.body_size
        };
        Ok(KernelBody {
            load_address: preamble.body_load_address,
            size,
            bootloader_address: preamble.bootloader_address,
            bootloader_size: preamble.bootloader_size,
            digest: [k.index; DIGEST_SIZE],
        })
    }
}

// ============================================================================
// Secure Storage
// ============================================================================

/// Simulated secure storage with fault switches
#[derive(Debug, Clone)]
pub struct SimStorage {
    /// Stored rollback floor
    pub floor: KernelVersion,
    /// Stored trust record bytes
    pub record: [u8; TRUST_RECORD_SIZE],
    /// Floor reads fail
    pub fail_floor_read: bool,
    /// Floor writes fail
    pub fail_floor_write: bool,
    /// Floor writes report success but are lost
    pub lose_floor_writes: bool,
    /// Lock fails
    pub fail_lock: bool,
    /// Trust record reads fail
    pub fail_record_read: bool,
    /// Floor is locked
    pub locked: bool,
    /// Floor writes performed
    pub floor_writes: u32,
    /// Trust record writes performed
    pub record_writes: u32,
}

impl SimStorage {
    /// Blank trust record with the given floor
    #[must_use]
    pub const fn new(floor: KernelVersion) -> Self {
        Self {
            floor,
            record: [0; TRUST_RECORD_SIZE],
            fail_floor_read: false,
            fail_floor_write: false,
            lose_floor_writes: false,
            fail_lock: false,
            fail_record_read: false,
            locked: false,
            floor_writes: 0,
            record_writes: 0,
        }
    }

    /// Preload a trust record
    #[must_use]
    pub fn with_record(mut self, record: TrustRecord) -> Self {
        self.record = record.encode();
        self
    }

    /// Decode the stored trust record
    pub fn trust_record(&self) -> Result<TrustRecord, RecordError> {
        TrustRecord::decode(&self.record)
    }
}

impl SecureStorage for SimStorage {
    fn read_rollback_floor(&mut self) -> Result<KernelVersion, StorageError> {
        if self.fail_floor_read {
            return Err(StorageError::Io);
        }
        Ok(self.floor)
    }

    fn write_rollback_floor(&mut self, version: KernelVersion) -> Result<(), StorageError> {
        if self.locked {
            return Err(StorageError::Locked);
        }
        if self.fail_floor_write {
            return Err(StorageError::Io);
        }
        self.floor_writes += 1;
        if !self.lose_floor_writes {
            self.floor = version;
        }
        Ok(())
    }

    fn lock_rollback_floor(&mut self) -> Result<(), StorageError> {
        if self.fail_lock {
            return Err(StorageError::Io);
        }
        self.locked = true;
        Ok(())
    }

    fn read_trust_record(&mut self, out: &mut [u8; TRUST_RECORD_SIZE]) -> Result<(), StorageError> {
        if self.fail_record_read {
            return Err(StorageError::Io);
        }
        *out = self.record;
        Ok(())
    }

    fn write_trust_record(&mut self, data: &[u8; TRUST_RECORD_SIZE]) -> Result<(), StorageError> {
        self.record = *data;
        self.record_writes += 1;
        Ok(())
    }
}

// ============================================================================
// Embedded Controller
// ============================================================================

/// Simulated EC with one replacement image
#[derive(Debug, Clone)]
pub struct SimEc {
    /// Expected firmware (`None` = no image shipped)
    pub expected: Option<EcDescriptor>,
    /// Currently running firmware
    pub running: EcFirmwareId,
    /// Replacement image bytes
    pub image: Vec<u8, SIM_EC_IMAGE_MAX>,
    /// Firmware the EC runs after a flash (`None` = the expected one)
    pub after_flash: Option<EcFirmwareId>,
    /// EC does not respond
    pub unavailable: bool,
    /// Signature check rejects the image
    pub reject_signature: bool,
    /// Flash write fails
    pub fail_flash: bool,
    /// Write protect fails
    pub fail_protect: bool,
    /// Flash writes performed
    pub flash_count: u32,
    /// Signature checks performed
    pub verify_count: u32,
    /// Write protects performed
    pub protect_count: u32,
}

impl SimEc {
    /// SHA3-256 of an image
    #[must_use]
    pub fn digest(image: &[u8]) -> [u8; DIGEST_SIZE] {
        Sha3_256::digest(image).into()
    }

    /// EC already running `image` as `version`
    #[must_use]
    pub fn in_sync(version: u32, image: &[u8]) -> Self {
        let id = EcFirmwareId {
            version,
            hash: Self::digest(image),
        };
        let mut bytes: Vec<u8, SIM_EC_IMAGE_MAX> = Vec::new();
        let _ = bytes.extend_from_slice(&image[..image.len().min(SIM_EC_IMAGE_MAX)]);
        Self {
            expected: Some(EcDescriptor {
                id,
                image_size: bytes.len() as u32,
            }),
            running: id,
            image: bytes,
            after_flash: None,
            unavailable: false,
            reject_signature: false,
            fail_flash: false,
            fail_protect: false,
            flash_count: 0,
            verify_count: 0,
            protect_count: 0,
        }
    }

    /// EC running an older `running_version` while `image` is expected
    #[must_use]
    pub fn stale(running_version: u32, version: u32, image: &[u8]) -> Self {
        let mut ec = Self::in_sync(version, image);
        ec.running = EcFirmwareId {
            version: running_version,
            hash: [0; DIGEST_SIZE],
        };
        ec
    }
}

impl EcFlasher for SimEc {
    fn expected_firmware(&mut self, _devidx: u8) -> Result<EcDescriptor, EcError> {
        self.expected.ok_or(EcError::NoImage)
    }

    fn running_firmware(&mut self, _devidx: u8) -> Result<EcFirmwareId, EcError> {
        if self.unavailable {
            return Err(EcError::Unavailable);
        }
        Ok(self.running)
    }

    fn read_image(&mut self, _devidx: u8, offset: u32, buf: &mut [u8]) -> Result<usize, EcError> {
        let start = offset as usize;
        if start >= self.image.len() {
            return Err(EcError::Io);
        }
        let n = buf.len().min(self.image.len() - start);
        buf[..n].copy_from_slice(&self.image[start..start + n]);
        Ok(n)
    }

    fn verify_image(&mut self, _devidx: u8, _digest: &[u8; DIGEST_SIZE]) -> Result<(), EcError> {
        self.verify_count += 1;
        if self.reject_signature {
            return Err(EcError::BadSignature);
        }
        Ok(())
    }

    fn flash_image(&mut self, _devidx: u8) -> Result<(), EcError> {
        if self.fail_flash {
            return Err(EcError::FlashFailed);
        }
        let expected = self.expected.ok_or(EcError::NoImage)?;
        self.flash_count += 1;
        self.running = self.after_flash.unwrap_or(expected.id);
        Ok(())
    }

    fn recheck_version(&mut self, devidx: u8) -> Result<EcFirmwareId, EcError> {
        self.running_firmware(devidx)
    }

    fn protect(&mut self, _devidx: u8) -> Result<(), EcError> {
        if self.fail_protect {
            return Err(EcError::ProtectFailed);
        }
        self.protect_count += 1;
        Ok(())
    }
}

// ============================================================================
// Keyboard, Switches, Timing
// ============================================================================

/// Scripted keyboard, recovery button and shutdown signal
#[derive(Debug, Default)]
pub struct SimPlatform {
    keys: Deque<Option<KeyPress>, SIM_INPUT_DEPTH>,
    button: Deque<bool, SIM_INPUT_DEPTH>,
    /// Shutdown is requested once this many polls have returned false
    pub shutdown_after: Option<u32>,
    /// Shutdown polls performed
    pub shutdown_polls: u32,
    /// Simulated clock
    pub now_ms: u32,
    /// Sleeps performed
    pub sleeps: u32,
}

impl SimPlatform {
    /// No input, never shuts down
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key press
    #[must_use]
    pub fn press(mut self, key: u32, trusted: bool) -> Self {
        let _ = self.keys.push_back(Some(KeyPress { key, trusted }));
        self
    }

    /// Queue `polls` empty keyboard reads
    #[must_use]
    pub fn idle(mut self, polls: usize) -> Self {
        for _ in 0..polls {
            let _ = self.keys.push_back(None);
        }
        self
    }

    /// Queue a press-and-release of the recovery button
    #[must_use]
    pub fn button_tap(mut self) -> Self {
        let _ = self.button.push_back(true);
        let _ = self.button.push_back(false);
        self
    }

    /// Request shutdown after `polls` polls
    #[must_use]
    pub fn shutdown_after(mut self, polls: u32) -> Self {
        self.shutdown_after = Some(polls);
        self
    }

    /// Keys not yet consumed
    #[must_use]
    pub fn pending_keys(&self) -> usize {
        self.keys.len()
    }
}

impl BootPlatform for SimPlatform {
    fn shutdown_requested(&mut self) -> bool {
        let requested = self.shutdown_after.is_some_and(|n| self.shutdown_polls >= n);
        self.shutdown_polls += 1;
        requested
    }

    fn read_key(&mut self) -> Option<KeyPress> {
        self.keys.pop_front().flatten()
    }

    fn recovery_button_pressed(&mut self) -> bool {
        self.button.pop_front().unwrap_or(false)
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(ms);
        self.sleeps += 1;
    }

    fn millis(&self) -> u32 {
        self.now_ms
    }
}

// ============================================================================
// Board
// ============================================================================

/// Every simulated collaborator for one boot
pub struct SimBoard<'m> {
    enumerator: SimEnumerator<'m>,
    gpt: SimGpt<'m>,
    verifier: SimVerifier<'m>,
    /// Secure storage
    pub storage: SimStorage,
    /// Embedded controller
    pub ec: SimEc,
    /// Keyboard, switches, timing
    pub platform: SimPlatform,
}

impl<'m> SimBoard<'m> {
    /// Board over shared media
    #[must_use]
    pub fn new(
        media: &'m RefCell<SimMedia>,
        storage: SimStorage,
        ec: SimEc,
        platform: SimPlatform,
    ) -> Self {
        Self {
            enumerator: SimEnumerator { media },
            gpt: SimGpt { media },
            verifier: SimVerifier { media },
            storage,
            ec,
            platform,
        }
    }

    /// Borrow every collaborator as a service bundle
    pub fn services(&mut self, config: BootConfig) -> BootServices<'_> {
        BootServices::new(
            &mut self.enumerator,
            &mut self.gpt,
            &mut self.verifier,
            &mut self.storage,
            &mut self.ec,
            &mut self.platform,
            config,
        )
    }
}
