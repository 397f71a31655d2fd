// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Kernel Loader
//!
//! Finds, authenticates and selects one kernel from the disks of a class.
//!
//! # Selection Process
//!
//! 1. Enumerate disks of the requested class; skip unusable geometry
//! 2. Read the kernel partitions of each disk; skip non-bootable entries
//! 3. Verify every candidate preamble and apply the mode policy
//! 4. Rank admitted candidates from all disks together: priority desc,
//!    version desc, then disk order and partition index asc
//! 5. Load bodies in rank order; the first that verifies is selected
//!
//! A failed enumeration is reported as `VerificationFailed`, the same as a
//! disk whose kernels all fail, so an unreadable disk cannot be told apart
//! from a bad signature.
//!
//! The loader never touches the rollback floor; it only reports the lowest
//! official version it saw on the selected disk.

use heapless::Vec;
use vb_common::{log_debug, log_info, log_warn, DiskHandle, Error, KernelVersion};
use zeroize::Zeroize;

use crate::context::TrustContext;
use crate::platform::{
    BootServices, DiskInfo, KernelBody, KernelPartition, KernelPreamble, MAX_DISKS,
    MAX_KERNEL_PARTITIONS,
};
use crate::verify::{admit, Admission, VerificationPolicy};

/// Loader error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// No usable disk of the requested class
    NoDiskFound,
    /// Disks present, but no kernel verified
    VerificationFailed,
    /// A collaborator returned inconsistent data
    InternalFault,
}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NoDiskFound => Error::NoDiskFound,
            LoadError::VerificationFailed => Error::VerificationFailed,
            LoadError::InternalFault => Error::InternalFault,
        }
    }
}

/// Kernel chosen for handoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelHandle {
    /// Disk holding the kernel
    pub disk: DiskHandle,
    /// Partition number
    pub partition: u8,
    /// Combined version
    pub version: KernelVersion,
    /// Signed by the mode's key set with matching flags
    pub official: bool,
    /// Lowest official version among valid kernels on the same disk
    pub lowest_version: Option<KernelVersion>,
    /// Verified body descriptor
    pub body: KernelBody,
}

impl Zeroize for KernelHandle {
    fn zeroize(&mut self) {
        self.body.zeroize();
        self.version = KernelVersion::ZERO;
        self.lowest_version = None;
        self.official = false;
    }
}

/// Output slots of one load attempt
#[derive(Debug, Default)]
pub struct LoadOutput {
    /// Selected kernel, if any
    pub selected: Option<KernelHandle>,
}

impl LoadOutput {
    /// Wipe any selection
    pub fn clear(&mut self) {
        if let Some(handle) = self.selected.as_mut() {
            handle.zeroize();
        }
        self.selected = None;
    }
}

/// Parameters of one load attempt
#[derive(Debug, Default)]
pub struct LoadParams {
    /// Disk classes to scan (see [`vb_common::disk_flags`])
    pub disk_class: u32,
    /// Extra flags for the enumeration layer
    pub scan_flags: u32,
    /// Output slots
    pub out: LoadOutput,
}

impl LoadParams {
    /// Fresh parameters for a disk class
    #[must_use]
    pub fn new(disk_class: u32) -> Self {
        Self {
            disk_class,
            scan_flags: 0,
            out: LoadOutput::default(),
        }
    }

    /// Take the selected kernel, leaving the slot empty
    pub fn take_handle(&mut self) -> Option<KernelHandle> {
        self.out.selected.take()
    }
}

/// Admitted kernel partition
struct Candidate {
    /// Position of the disk in the enumeration order
    disk: usize,
    part: KernelPartition,
    preamble: KernelPreamble,
    admission: Admission,
    failed: bool,
}

/// Capacity for candidates gathered across every enumerated disk
const MAX_CANDIDATES: usize = MAX_DISKS * MAX_KERNEL_PARTITIONS;

/// Try to select a kernel from disks of `params.disk_class`
///
/// On success `params.out.selected` holds the kernel and every other disk
/// has been released. On failure the output slots are wiped.
pub fn try_load_kernel(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    params: &mut LoadParams,
    policy: VerificationPolicy,
) -> Result<(), LoadError> {
    params.out.clear();

    let mut disks: Vec<DiskInfo, MAX_DISKS> = Vec::new();
    if let Err(e) = svc
        .disks
        .enumerate(params.disk_class, params.scan_flags, &mut disks)
    {
        log_warn!(
            svc.log,
            svc.platform.millis(),
            "loader",
            "{}: {:?}",
            Error::DiskEnumerationFailed,
            e
        );
        svc.disks.release(None);
        return Err(LoadError::VerificationFailed);
    }

    let mut candidates: Vec<Candidate, MAX_CANDIDATES> = Vec::new();
    let mut usable = 0u32;
    for (order, disk) in disks.iter().enumerate() {
        if !disk.is_usable(params.disk_class) {
            log_debug!(
                svc.log,
                svc.platform.millis(),
                "loader",
                "{} skipped: {}x{} flags 0x{:X}",
                disk.handle,
                disk.bytes_per_lba,
                disk.lba_count,
                disk.flags
            );
            continue;
        }
        usable += 1;
        collect_candidates(ctx, svc, disk, order, policy, &mut candidates);
    }

    if usable == 0 {
        svc.disks.release(None);
        log_info!(svc.log, svc.platform.millis(), "loader", "no usable disk");
        return Err(LoadError::NoDiskFound);
    }

    // One ranking over every disk; disk order only breaks exact ties
    candidates.sort_unstable_by(|a, b| {
        b.part
            .priority
            .cmp(&a.part.priority)
            .then(b.admission.version.cmp(&a.admission.version))
            .then(a.disk.cmp(&b.disk))
            .then(a.part.index.cmp(&b.part.index))
    });

    match select(svc, &disks, &mut candidates, policy) {
        Ok(Some(handle)) => {
            log_info!(
                svc.log,
                svc.platform.millis(),
                "loader",
                "selected {} part {} version {}",
                handle.disk,
                handle.partition,
                handle.version
            );
            svc.disks.release(Some(handle.disk));
            params.out.selected = Some(handle);
            Ok(())
        }
        Ok(None) => {
            svc.disks.release(None);
            log_warn!(
                svc.log,
                svc.platform.millis(),
                "loader",
                "no valid kernel on {} disk(s)",
                usable
            );
            Err(LoadError::VerificationFailed)
        }
        Err(e) => {
            svc.disks.release(None);
            Err(e)
        }
    }
}

/// Verify the preambles of every bootable partition on a disk
fn collect_candidates(
    ctx: &TrustContext,
    svc: &mut BootServices<'_>,
    disk: &DiskInfo,
    order: usize,
    policy: VerificationPolicy,
    out: &mut Vec<Candidate, MAX_CANDIDATES>,
) {
    let mut parts: Vec<KernelPartition, MAX_KERNEL_PARTITIONS> = Vec::new();
    if let Err(e) = svc.gpt.kernel_partitions(disk, &mut parts) {
        log_warn!(
            svc.log,
            svc.platform.millis(),
            "loader",
            "{} partition table: {:?}",
            disk.handle,
            e
        );
        return;
    }

    for part in parts.iter().filter(|p| p.is_bootable()) {
        let preamble = match svc.verifier.verify_preamble(disk, part, policy.key_set()) {
            Ok(p) => p,
            Err(e) => {
                log_debug!(
                    svc.log,
                    svc.platform.millis(),
                    "loader",
                    "{} part {} preamble: {:?}",
                    disk.handle,
                    part.index,
                    e
                );
                mark_bad(svc, disk.handle, part.index, policy);
                continue;
            }
        };

        match admit(policy, &preamble, ctx.rollback_floor) {
            Ok(admission) => {
                // At most MAX_KERNEL_PARTITIONS per disk, MAX_DISKS disks
                let _ = out.push(Candidate {
                    disk: order,
                    part: *part,
                    preamble,
                    admission,
                    failed: false,
                });
            }
            Err(r) => {
                log_info!(
                    svc.log,
                    svc.platform.millis(),
                    "loader",
                    "{} part {} rejected: {} (v{})",
                    disk.handle,
                    part.index,
                    r.as_str(),
                    preamble.version()
                );
                mark_bad(svc, disk.handle, part.index, policy);
            }
        }
    }
}

/// Load bodies in rank order until one verifies
fn select(
    svc: &mut BootServices<'_>,
    disks: &[DiskInfo],
    candidates: &mut [Candidate],
    policy: VerificationPolicy,
) -> Result<Option<KernelHandle>, LoadError> {
    for i in 0..candidates.len() {
        let (order, part, preamble, admission) = {
            let c = &candidates[i];
            (c.disk, c.part, c.preamble, c.admission)
        };
        let disk = disks[order];

        let mut body = match svc.verifier.load_body(&disk, &part, &preamble) {
            Ok(body) => body,
            Err(e) => {
                log_info!(
                    svc.log,
                    svc.platform.millis(),
                    "loader",
                    "{} part {} body: {:?}",
                    disk.handle,
                    part.index,
                    e
                );
                candidates[i].failed = true;
                mark_bad(svc, disk.handle, part.index, policy);
                continue;
            }
        };

        if body.size != preamble.body_size || body.load_address != preamble.body_load_address {
            log_warn!(
                svc.log,
                svc.platform.millis(),
                "loader",
                "{} part {} body descriptor disagrees with preamble",
                disk.handle,
                part.index
            );
            body.zeroize();
            return Err(LoadError::InternalFault);
        }

        if policy.updates_gpt() && !part.successful {
            if let Err(e) = svc.gpt.mark_tried(disk.handle, part.index) {
                log_warn!(svc.log, svc.platform.millis(), "loader", "mark tried: {:?}", e);
            }
        }

        let lowest_version = if admission.official {
            candidates
                .iter()
                .filter(|c| c.disk == order && c.admission.official && !c.failed)
                .map(|c| c.admission.version)
                .min()
        } else {
            None
        };

        return Ok(Some(KernelHandle {
            disk: disk.handle,
            partition: part.index,
            version: admission.version,
            official: admission.official,
            lowest_version,
            body,
        }));
    }

    Ok(None)
}

fn mark_bad(svc: &mut BootServices<'_>, disk: DiskHandle, index: u8, policy: VerificationPolicy) {
    if !policy.updates_gpt() {
        return;
    }
    if let Err(e) = svc.gpt.mark_bad(disk, index) {
        log_warn!(svc.log, svc.platform.millis(), "loader", "mark bad: {:?}", e);
    }
}
