// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boot-stage configuration
//!
//! Configuration is provisioned at build or factory time. Nothing in the
//! boot path mutates it; handlers receive it by shared reference.

use crate::types::DevBootTarget;

/// Top-level boot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Developer-mode policy
    pub developer: DeveloperConfig,
    /// Recovery-mode policy
    pub recovery: RecoveryConfig,
    /// EC software sync policy
    pub ec_sync: EcSyncConfig,
    /// Poll interval of the confirmation gate, in milliseconds
    pub confirm_poll_ms: u32,
    /// Upper bound on mode transitions within a single boot attempt
    pub max_mode_transitions: u8,
}

impl BootConfig {
    /// Default boot configuration
    pub const DEFAULT: Self = Self {
        developer: DeveloperConfig::DEFAULT,
        recovery: RecoveryConfig::DEFAULT,
        ec_sync: EcSyncConfig::DEFAULT,
        confirm_poll_ms: 20,
        max_mode_transitions: 4,
    };

    /// Locked-down configuration: no removable developer boot, signed
    /// developer kernels only, bounded recovery polling
    pub const LOCKED: Self = Self {
        developer: DeveloperConfig {
            allow_removable: false,
            signed_only: true,
            ..DeveloperConfig::DEFAULT
        },
        recovery: RecoveryConfig {
            max_invalid_insertions: Some(3),
            allow_dev_switch: false,
            ..RecoveryConfig::DEFAULT
        },
        ..Self::DEFAULT
    };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Developer-mode configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeveloperConfig {
    /// Disk class tried first in each round
    pub default_target: DevBootTarget,
    /// Allow booting from removable media at all
    pub allow_removable: bool,
    /// Refuse self-signed (hash-only) kernels
    pub signed_only: bool,
    /// Failed load rounds before offering the return to Normal mode
    pub load_attempts: u8,
}

impl DeveloperConfig {
    /// Default developer configuration
    pub const DEFAULT: Self = Self {
        default_target: DevBootTarget::Internal,
        allow_removable: true,
        signed_only: false,
        load_attempts: 2,
    };
}

impl Default for DeveloperConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Recovery-mode configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Delay between removable-media scans
    pub disk_poll_interval_ms: u32,
    /// Granularity of the shutdown/key check while waiting between scans
    pub key_poll_interval_ms: u32,
    /// Abort with shutdown after this many invalid media insertions.
    /// `None` polls forever.
    pub max_invalid_insertions: Option<u32>,
    /// Only boot media when recovery was requested manually; otherwise wait
    /// for shutdown ("broken" screen)
    pub require_manual_for_media: bool,
    /// Allow Ctrl+D to request Developer mode from manual recovery
    pub allow_dev_switch: bool,
}

impl RecoveryConfig {
    /// Default recovery configuration
    pub const DEFAULT: Self = Self {
        disk_poll_interval_ms: 1000,
        key_poll_interval_ms: 20,
        max_invalid_insertions: None,
        require_manual_for_media: false,
        allow_dev_switch: true,
    };
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// EC software sync configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcSyncConfig {
    /// Run EC sync after kernel selection
    pub enabled: bool,
    /// Number of EC devices to synchronize (index 0..count)
    pub device_count: u8,
}

impl EcSyncConfig {
    /// Default EC sync configuration
    pub const DEFAULT: Self = Self {
        enabled: true,
        device_count: 1,
    };
}

impl Default for EcSyncConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_polls_forever() {
        let cfg = BootConfig::default();
        assert_eq!(cfg.recovery.max_invalid_insertions, None);
        assert!(cfg.developer.allow_removable);
        assert!(cfg.ec_sync.enabled);
    }

    #[test]
    fn test_locked_profile() {
        let cfg = BootConfig::LOCKED;
        assert!(!cfg.developer.allow_removable);
        assert!(cfg.developer.signed_only);
        assert_eq!(cfg.recovery.max_invalid_insertions, Some(3));
        assert_eq!(cfg.confirm_poll_ms, BootConfig::DEFAULT.confirm_poll_ms);
    }
}
