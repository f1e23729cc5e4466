//! Short full-screen messages shown after an action
//!
//! A notice replaces the blocking delay the action would otherwise need: it
//! carries its own expiry and the control loop drops it once that passes.

use embassy_time::{Duration, Instant};

use crate::config::TimeoutPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Forced calibration save wrote the blob.
    StateSaved,
    /// Forced calibration save was skipped.
    StateSkipped,
    TimeoutChanged(TimeoutPolicy),
    WifiConnecting,
    WifiStopping,
    BleStarting,
    BleStopping,
    DeletingState,
    Rebooting,
    PoweringOff,
}

impl NoticeKind {
    pub const fn duration(self) -> Duration {
        match self {
            Self::StateSaved | Self::StateSkipped => Duration::from_millis(2500),
            Self::TimeoutChanged(_) | Self::DeletingState | Self::PoweringOff => {
                Duration::from_millis(1000)
            }
            Self::WifiConnecting
            | Self::WifiStopping
            | Self::BleStarting
            | Self::BleStopping
            | Self::Rebooting => Duration::from_millis(500),
        }
    }

    /// Text lines, top to bottom.
    pub const fn lines(self) -> &'static [&'static str] {
        match self {
            Self::StateSaved => &["STATE SAVE", "----------------", "DONE.", "Loc: /fusion_state"],
            Self::StateSkipped => &[
                "STATE SAVE",
                "----------------",
                "SKIPPED.",
                "Reason: Accuracy",
                "Too Low (<1)",
            ],
            Self::TimeoutChanged(TimeoutPolicy::Short) => &["Timeout: 5s"],
            Self::TimeoutChanged(TimeoutPolicy::Medium) => &["Timeout: 15s"],
            Self::TimeoutChanged(TimeoutPolicy::Never) => &["Timeout: None"],
            Self::WifiConnecting => &["Connecting..."],
            Self::WifiStopping => &["Stopping WiFi..."],
            Self::BleStarting => &["Starting BLE..."],
            Self::BleStopping => &["Stopping BLE..."],
            Self::DeletingState => &["Deleting State..."],
            Self::Rebooting => &["Rebooting..."],
            Self::PoweringOff => &["Powering Off..."],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub until: Instant,
}

impl Notice {
    pub fn new(kind: NoticeKind, now: Instant) -> Self {
        Self {
            kind,
            until: now + kind.duration(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.until
    }
}
