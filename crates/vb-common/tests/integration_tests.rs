// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Tests for vb-common
//!
//! Boot types, error codes, configuration profiles and the log ring.

#![cfg(test)]

mod types_tests {
    use vb_common::{disk_flags, BootMode, DevBootTarget, DiskHandle, KernelVersion};

    #[test]
    fn test_boot_mode_names() {
        assert_eq!(BootMode::Normal.as_str(), "normal");
        assert_eq!(BootMode::Developer.as_str(), "developer");
        assert_eq!(BootMode::Recovery.as_str(), "recovery");
    }

    #[test]
    fn test_disk_class_flags_disjoint() {
        assert_eq!(disk_flags::REMOVABLE & disk_flags::FIXED, 0);
        assert_eq!(disk_flags::ANY_CLASS & disk_flags::CLASS_MASK, disk_flags::ANY_CLASS);
        assert_eq!(disk_flags::EXTERNAL_GPT & disk_flags::CLASS_MASK, 0);
    }

    #[test]
    fn test_dev_target_swap_is_involution() {
        for t in [DevBootTarget::Internal, DevBootTarget::Removable] {
            assert_eq!(t.other().other(), t);
            assert_ne!(t.disk_class(), t.other().disk_class());
        }
    }

    #[test]
    fn test_kernel_version_raw_roundtrip() {
        let v = KernelVersion::new(0x0001, 0x0203);
        assert_eq!(KernelVersion::from_raw(v.raw()), v);
        assert_eq!(format!("{v}"), "1.515");
    }

    #[test]
    fn test_kernel_version_ordering_by_kernel_within_key() {
        let mut versions = [
            KernelVersion::new(1, 9),
            KernelVersion::new(2, 0),
            KernelVersion::new(1, 10),
        ];
        versions.sort();
        assert_eq!(
            versions,
            [
                KernelVersion::new(1, 9),
                KernelVersion::new(1, 10),
                KernelVersion::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_disk_handle_display() {
        assert_eq!(format!("{}", DiskHandle(3)), "disk3");
    }
}

mod errors_tests {
    use std::collections::HashSet;
    use vb_common::Error;

    const ALL: &[Error] = &[
        Error::NoDiskFound,
        Error::DiskEnumerationFailed,
        Error::PartitionTableInvalid,
        Error::DiskReadFailed,
        Error::VerificationFailed,
        Error::InvalidSignature,
        Error::InvalidKeyblock,
        Error::RollbackAttempted,
        Error::HashMismatch,
        Error::KeyblockModeMismatch,
        Error::StorageReadFailed,
        Error::StorageWriteFailed,
        Error::StorageNotDurable,
        Error::StorageLockFailed,
        Error::TrustStateCorrupted,
        Error::EcUnavailable,
        Error::EcNoExpectedImage,
        Error::EcImageVerificationFailed,
        Error::EcFlashFailed,
        Error::EcPostSyncMismatch,
        Error::EcProtectFailed,
        Error::UserAborted,
        Error::ShutdownRequested,
        Error::InvalidBootMode,
        Error::TransitionLimitExceeded,
        Error::InternalFault,
        Error::BufferTooSmall,
        Error::InvalidParameter,
        Error::InternalError,
    ];

    #[test]
    fn test_error_codes_unique() {
        let codes: HashSet<u16> = ALL.iter().map(Error::code).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_descriptions_non_empty() {
        for e in ALL {
            assert!(!e.description().is_empty(), "{e:?}");
        }
    }

    #[test]
    fn test_security_errors() {
        assert!(Error::RollbackAttempted.is_security_error());
        assert!(Error::TrustStateCorrupted.is_security_error());
        assert!(!Error::NoDiskFound.is_security_error());
        assert!(!Error::UserAborted.is_security_error());
    }

    #[test]
    fn test_display_includes_code() {
        let s = format!("{}", Error::EcFlashFailed);
        assert!(s.starts_with("[0x0404]"));
        assert!(s.contains("EC flash failed"));
    }
}

mod config_tests {
    use vb_common::config::{DeveloperConfig, EcSyncConfig, RecoveryConfig};
    use vb_common::{BootConfig, DevBootTarget};

    #[test]
    fn test_default_matches_component_defaults() {
        let cfg = BootConfig::DEFAULT;
        assert_eq!(cfg.developer, DeveloperConfig::DEFAULT);
        assert_eq!(cfg.recovery, RecoveryConfig::DEFAULT);
        assert_eq!(cfg.ec_sync, EcSyncConfig::DEFAULT);
        assert_eq!(cfg.developer.default_target, DevBootTarget::Internal);
    }

    #[test]
    fn test_key_poll_finer_than_disk_poll() {
        let r = RecoveryConfig::DEFAULT;
        assert!(r.key_poll_interval_ms > 0);
        assert!(r.key_poll_interval_ms <= r.disk_poll_interval_ms);
    }

    #[test]
    fn test_transitions_bounded() {
        assert!(BootConfig::DEFAULT.max_mode_transitions >= 2);
    }
}

mod log_tests {
    use vb_common::log::{LogBuffer, LogLevel};
    use vb_common::{log_error, log_info, log_warn};

    #[test]
    fn test_entries_render_with_prefix() {
        let mut log = LogBuffer::new();
        log_warn!(log, 42, "loader", "skip {}", "disk0");
        let line = format!("{}", log.iter().next().unwrap());
        assert!(line.contains(" W [loader] skip disk0"));
    }

    #[test]
    fn test_error_only_filter() {
        let mut log = LogBuffer::new();
        log.set_min_level(LogLevel::Error);
        log_info!(log, 0, "m", "dropped");
        log_error!(log, 1, "m", "kept");
        assert_eq!(log.len(), 1);
        assert!(log.contains("m", "kept"));
        assert!(!log.contains("m", "dropped"));
    }

    #[test]
    fn test_clear_resets_drop_count() {
        let mut log = LogBuffer::new();
        for i in 0..100 {
            log_info!(log, i, "m", "{}", i);
        }
        assert!(log.dropped() > 0);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.dropped(), 0);
    }
}
