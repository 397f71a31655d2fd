// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Common types for the verified-boot core
//!
//! This module defines fundamental types used throughout the boot stage,
//! including boot modes, disk handles and flags, and kernel versions.

use core::fmt;

use crate::errors::Error;

/// Platform trust state for one boot attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BootMode {
    /// Fully verified boot from internal storage
    Normal = 0,
    /// Relaxed verification, gated by user confirmation
    Developer = 1,
    /// Most restrictive mode: removable media signed with recovery keys
    Recovery = 2,
}

impl BootMode {
    /// Get the mode name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Developer => "developer",
            Self::Recovery => "recovery",
        }
    }
}

impl TryFrom<u8> for BootMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Developer),
            2 => Ok(Self::Recovery),
            _ => Err(Error::InvalidParameter),
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a disk, issued by the disk enumeration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskHandle(pub u32);

impl fmt::Display for DiskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk{}", self.0)
    }
}

/// Disk class and scan flags passed to the disk enumeration layer
pub mod disk_flags {
    /// Removable media (USB, SD)
    pub const REMOVABLE: u32 = 1 << 0;
    /// Fixed internal disk
    pub const FIXED: u32 = 1 << 1;
    /// Any disk class
    pub const ANY_CLASS: u32 = REMOVABLE | FIXED;
    /// Bits of a disk's flags that select its class
    pub const CLASS_MASK: u32 = 0xFF;
    /// Scan flag: partition table may live outside the disk (external GPT)
    pub const EXTERNAL_GPT: u32 = 1 << 16;
}

/// Which disk class a developer-mode boot tries first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevBootTarget {
    /// Internal fixed disk first
    Internal,
    /// Removable media first
    Removable,
}

impl DevBootTarget {
    /// Disk class flags for this target
    #[must_use]
    pub const fn disk_class(&self) -> u32 {
        match self {
            Self::Internal => disk_flags::FIXED,
            Self::Removable => disk_flags::REMOVABLE,
        }
    }

    /// The other target
    #[must_use]
    pub const fn other(&self) -> Self {
        match self {
            Self::Internal => Self::Removable,
            Self::Removable => Self::Internal,
        }
    }
}

/// Combined kernel version: key version in the upper 16 bits, kernel
/// version in the lower 16 bits
///
/// Ordering of the combined value is the anti-rollback ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KernelVersion(u32);

impl KernelVersion {
    /// Lowest possible version
    pub const ZERO: Self = Self(0);

    /// Combine a key version and a kernel version
    #[must_use]
    pub const fn new(key_version: u16, kernel_version: u16) -> Self {
        Self(((key_version as u32) << 16) | kernel_version as u32)
    }

    /// Wrap a raw combined value (as persisted in the rollback counter)
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw combined value
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Key (data key) version
    #[must_use]
    pub const fn key_version(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Kernel preamble version
    #[must_use]
    pub const fn kernel_version(&self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key_version(), self.kernel_version())
    }
}
