// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Kernel Verification Policy
//!
//! Decides, per boot mode, which authenticated kernels may be selected.
//! Signature checking itself is done by the [`KernelVerifier`] collaborator;
//! this module applies the mode rules on top of its result.
//!
//! # Policies
//!
//! | Policy   | Key set  | Self-signed | Keyblock flags required  | GPT updates |
//! |----------|----------|-------------|--------------------------|-------------|
//! | Strict   | kernel   | never       | `DEVELOPER_0 & RECOVERY_0` | yes       |
//! | Relaxed  | kernel   | unless signed-only | `DEVELOPER_1 & RECOVERY_0` | yes |
//! | Recovery | recovery | never       | `RECOVERY_1`             | no          |
//!
//! Kernels that verify against the key set with matching flags are
//! "official": they are subject to the rollback floor and may advance it.
//!
//! [`KernelVerifier`]: crate::platform::KernelVerifier

use vb_common::config::DeveloperConfig;
use vb_common::{BootMode, Error, KernelVersion};

use crate::platform::{keyblock_flags, KernelPreamble, KeySet, SignatureKind};

/// Verification policy, selected from the boot mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Full chain of trust (Normal mode)
    Strict,
    /// Self-signed kernels allowed unless `signed_only` (Developer mode)
    Relaxed {
        /// Refuse self-signed kernels
        signed_only: bool,
    },
    /// Recovery key set only (Recovery mode)
    Recovery,
}

impl VerificationPolicy {
    /// Policy for a boot mode
    #[must_use]
    pub const fn for_mode(mode: BootMode, developer: &DeveloperConfig) -> Self {
        match mode {
            BootMode::Normal => Self::Strict,
            BootMode::Developer => Self::Relaxed {
                signed_only: developer.signed_only,
            },
            BootMode::Recovery => Self::Recovery,
        }
    }

    /// Key set preambles are checked against
    #[must_use]
    pub const fn key_set(&self) -> KeySet {
        match self {
            Self::Strict | Self::Relaxed { .. } => KeySet::Kernel,
            Self::Recovery => KeySet::Recovery,
        }
    }

    /// Keyblock flag bits that must all be present
    #[must_use]
    pub const fn required_keyblock_flags(&self) -> u32 {
        match self {
            Self::Strict => keyblock_flags::DEVELOPER_0 | keyblock_flags::RECOVERY_0,
            Self::Relaxed { .. } => keyblock_flags::DEVELOPER_1 | keyblock_flags::RECOVERY_0,
            Self::Recovery => keyblock_flags::RECOVERY_1,
        }
    }

    /// Self-signed kernels are acceptable
    #[must_use]
    pub const fn allows_hash_only(&self) -> bool {
        matches!(self, Self::Relaxed { signed_only: false })
    }

    /// GPT attributes may be updated (try counts, bad marks)
    #[must_use]
    pub const fn updates_gpt(&self) -> bool {
        !matches!(self, Self::Recovery)
    }
}

/// A preamble accepted by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Combined version of the kernel
    pub version: KernelVersion,
    /// Signed by the key set with matching flags
    pub official: bool,
}

/// Why a preamble was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Keyblock flags do not allow this mode
    KeyblockFlags,
    /// Only hash-verified and the policy needs a signature
    HashOnly,
    /// Data key version below the floor's key version
    KeyRollback,
    /// Combined version below the floor
    KernelRollback,
}

impl Rejection {
    /// Short reason for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KeyblockFlags => "keyblock flags",
            Self::HashOnly => "self-signed",
            Self::KeyRollback => "key rollback",
            Self::KernelRollback => "kernel rollback",
        }
    }
}

impl From<Rejection> for Error {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::KeyblockFlags => Error::KeyblockModeMismatch,
            Rejection::HashOnly => Error::InvalidSignature,
            Rejection::KeyRollback | Rejection::KernelRollback => Error::RollbackAttempted,
        }
    }
}

/// Apply the policy and the rollback floor to an authenticated preamble
pub fn admit(
    policy: VerificationPolicy,
    preamble: &KernelPreamble,
    floor: KernelVersion,
) -> Result<Admission, Rejection> {
    let required = policy.required_keyblock_flags();
    let flags_ok = preamble.keyblock_flags & required == required;
    let signed = preamble.signature == SignatureKind::Signed;
    let version = preamble.version();

    if !(signed && flags_ok) {
        // Self-signed kernels carry no rollback semantics
        if policy.allows_hash_only() {
            return Ok(Admission {
                version,
                official: false,
            });
        }
        return Err(if flags_ok {
            Rejection::HashOnly
        } else {
            Rejection::KeyblockFlags
        });
    }

    if preamble.key_version < floor.key_version() {
        return Err(Rejection::KeyRollback);
    }
    if version < floor {
        return Err(Rejection::KernelRollback);
    }

    Ok(Admission {
        version,
        official: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyblock_flags::{DEVELOPER_0, DEVELOPER_1, RECOVERY_0, RECOVERY_1};

    fn preamble(key: u16, kernel: u16, flags: u32, signature: SignatureKind) -> KernelPreamble {
        KernelPreamble {
            key_version: key,
            kernel_version: kernel,
            keyblock_flags: flags,
            signature,
            body_size: 0x1000,
            body_load_address: 0x10_0000,
            bootloader_address: 0x10_0800,
            bootloader_size: 0x200,
        }
    }

    const NORMAL_FLAGS: u32 = DEVELOPER_0 | DEVELOPER_1 | RECOVERY_0;

    #[test]
    fn test_policy_for_mode() {
        let dev = DeveloperConfig::DEFAULT;
        assert_eq!(
            VerificationPolicy::for_mode(BootMode::Normal, &dev),
            VerificationPolicy::Strict
        );
        assert_eq!(
            VerificationPolicy::for_mode(BootMode::Recovery, &dev).key_set(),
            KeySet::Recovery
        );
        assert!(VerificationPolicy::for_mode(BootMode::Developer, &dev).allows_hash_only());
        assert!(!VerificationPolicy::Recovery.updates_gpt());
    }

    #[test]
    fn test_strict_accepts_signed_at_floor() {
        let floor = KernelVersion::new(1, 3);
        let p = preamble(1, 3, NORMAL_FLAGS, SignatureKind::Signed);
        assert_eq!(
            admit(VerificationPolicy::Strict, &p, floor),
            Ok(Admission {
                version: floor,
                official: true
            })
        );
    }

    #[test]
    fn test_below_floor_rejected_despite_signature() {
        let floor = KernelVersion::new(1, 5);
        let p = preamble(1, 4, NORMAL_FLAGS, SignatureKind::Signed);
        assert_eq!(
            admit(VerificationPolicy::Strict, &p, floor),
            Err(Rejection::KernelRollback)
        );

        let p = preamble(0, 0xFFFF, NORMAL_FLAGS, SignatureKind::Signed);
        assert_eq!(
            admit(VerificationPolicy::Strict, &p, floor),
            Err(Rejection::KeyRollback)
        );
    }

    #[test]
    fn test_strict_rejects_self_signed() {
        let p = preamble(1, 1, NORMAL_FLAGS, SignatureKind::HashOnly);
        assert_eq!(
            admit(VerificationPolicy::Strict, &p, KernelVersion::ZERO),
            Err(Rejection::HashOnly)
        );
    }

    #[test]
    fn test_flags_mismatch() {
        // Developer-only keyblock in normal mode
        let p = preamble(1, 1, DEVELOPER_1 | RECOVERY_0, SignatureKind::Signed);
        assert_eq!(
            admit(VerificationPolicy::Strict, &p, KernelVersion::ZERO),
            Err(Rejection::KeyblockFlags)
        );

        // Normal keyblock in recovery mode
        let p = preamble(1, 1, NORMAL_FLAGS, SignatureKind::Signed);
        assert_eq!(
            admit(VerificationPolicy::Recovery, &p, KernelVersion::ZERO),
            Err(Rejection::KeyblockFlags)
        );
    }

    #[test]
    fn test_relaxed_demotes_instead_of_rejecting() {
        let relaxed = VerificationPolicy::Relaxed { signed_only: false };
        let floor = KernelVersion::new(5, 5);

        // Self-signed, below the floor: accepted, not official
        let p = preamble(0, 1, NORMAL_FLAGS, SignatureKind::HashOnly);
        assert_eq!(
            admit(relaxed, &p, floor),
            Ok(Admission {
                version: KernelVersion::new(0, 1),
                official: false
            })
        );

        // Signed but flags mismatch: demoted
        let p = preamble(6, 0, DEVELOPER_0 | RECOVERY_0, SignatureKind::Signed);
        assert_eq!(admit(relaxed, &p, floor).map(|a| a.official), Ok(false));

        // Signed-only developer policy refuses the same kernel
        let strict_dev = VerificationPolicy::Relaxed { signed_only: true };
        assert_eq!(admit(strict_dev, &p, floor), Err(Rejection::KeyblockFlags));
    }

    #[test]
    fn test_recovery_kernel_admitted() {
        let p = preamble(1, 1, DEVELOPER_0 | DEVELOPER_1 | RECOVERY_1, SignatureKind::Signed);
        assert!(admit(VerificationPolicy::Recovery, &p, KernelVersion::ZERO).is_ok());
    }
}
