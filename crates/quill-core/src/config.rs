//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::KdfConfig;
use crate::sync::RetryPolicy;

/// Idle auto-lock timeout, restricted to an enumerated set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoLockTimeout {
    Off,
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
}

impl AutoLockTimeout {
    pub const DEFAULT: AutoLockTimeout = AutoLockTimeout::FiveMinutes;

    /// `None` means auto-lock is off.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            AutoLockTimeout::Off => None,
            AutoLockTimeout::OneMinute => Some(Duration::from_secs(60)),
            AutoLockTimeout::FiveMinutes => Some(Duration::from_secs(5 * 60)),
            AutoLockTimeout::FifteenMinutes => Some(Duration::from_secs(15 * 60)),
            AutoLockTimeout::ThirtyMinutes => Some(Duration::from_secs(30 * 60)),
        }
    }

    pub fn as_millis(self) -> u64 {
        self.as_duration().map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    /// Normalize a persisted millisecond value; anything outside the
    /// allowed set falls back to the default.
    pub fn from_millis(ms: u64) -> Self {
        match ms {
            0 => AutoLockTimeout::Off,
            60_000 => AutoLockTimeout::OneMinute,
            300_000 => AutoLockTimeout::FiveMinutes,
            900_000 => AutoLockTimeout::FifteenMinutes,
            1_800_000 => AutoLockTimeout::ThirtyMinutes,
            _ => AutoLockTimeout::DEFAULT,
        }
    }
}

impl Default for AutoLockTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything tunable about a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// KDF cost settings used when deriving fresh keys (setup/rotation)
    pub kdf: KdfConfig,
    /// Retry policy for sync attempts
    pub retry: RetryPolicy,
    /// Idle auto-lock timeout
    #[serde(rename = "autoLock")]
    pub auto_lock: AutoLockTimeout,
}

/// Check that a sync endpoint is an http or https URL.
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
