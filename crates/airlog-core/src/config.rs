//! Persisted system configuration
//!
//! A single [`SystemConfig`] is loaded at boot and written back after every
//! accepted change. The on-flash format is postcard, which keeps the blob
//! tiny and rejects truncated or foreign data on decode.

use embassy_time::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{self, CONFIG_FILE, Storage};

/// Upper bound of the encoded configuration.
pub const CONFIG_BLOB_LEN: usize = 32;

/// Operating mode: trades responsiveness for battery life.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    Realtime,
    #[default]
    Normal,
    Eco,
}

impl OperatingMode {
    /// Next mode in the menu's cycle: Realtime → Normal → Eco → Realtime.
    pub const fn next(self) -> Self {
        match self {
            Self::Realtime => Self::Normal,
            Self::Normal => Self::Eco,
            Self::Eco => Self::Realtime,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Realtime => "Real",
            Self::Normal => "Norm",
            Self::Eco => "Eco",
        }
    }

    /// Abbreviation for the dashboard's status line.
    pub const fn short_label(self) -> &'static str {
        match self {
            Self::Realtime => "RT",
            Self::Normal => "Nrm",
            Self::Eco => "Eco",
        }
    }
}

/// Screen auto-off policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    Short,
    #[default]
    Medium,
    Never,
}

impl TimeoutPolicy {
    pub const fn next(self) -> Self {
        match self {
            Self::Short => Self::Medium,
            Self::Medium => Self::Never,
            Self::Never => Self::Short,
        }
    }

    /// Inactivity after which the screen turns off.
    ///
    /// `Never` is an hour rather than infinite so a forgotten device still
    /// ends up sleeping.
    pub const fn duration(self) -> Duration {
        match self {
            Self::Short => Duration::from_secs(5),
            Self::Medium => Duration::from_secs(15),
            Self::Never => Duration::from_secs(3600),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "5s",
            Self::Medium => "15s",
            Self::Never => "None",
        }
    }
}

/// Device configuration persisted in [`CONFIG_FILE`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    pub mode: OperatingMode,
    pub timeout: TimeoutPolicy,
    /// Index of the next telemetry recording; never decreases.
    pub next_log_index: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Normal,
            timeout: TimeoutPolicy::Medium,
            next_log_index: 1,
        }
    }
}

impl SystemConfig {
    /// Load the configuration, falling back to defaults when the file is
    /// missing, unreadable or malformed.
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        if !storage.exists(CONFIG_FILE) {
            info!("No stored config, using defaults");
            return Self::default();
        }

        let mut buf = [0u8; CONFIG_BLOB_LEN];
        let len = match storage::read_file(storage, CONFIG_FILE, &mut buf) {
            Ok(len) => len,
            Err(e) => {
                warn!("Failed to read config: {}", e);
                return Self::default();
            }
        };

        match postcard::from_bytes::<Self>(&buf[..len]) {
            Ok(config) if config.next_log_index > 0 => {
                debug!("Loaded config: {:?}", config);
                config
            }
            _ => {
                warn!("Stored config is malformed, using defaults");
                Self::default()
            }
        }
    }

    /// Write the configuration back to storage.
    pub fn save<S: Storage>(&self, storage: &mut S) -> Result<(), StorageError> {
        let mut buf = [0u8; CONFIG_BLOB_LEN];
        let encoded = postcard::to_slice(self, &mut buf).map_err(|_| StorageError::Io)?;
        storage::write_file(storage, CONFIG_FILE, encoded)?;
        debug!("Saved config: {:?}", self);
        Ok(())
    }

    /// Hand out the current log index and advance the counter.
    pub fn allocate_log_index(&mut self) -> u32 {
        let index = self.next_log_index;
        self.next_log_index = self.next_log_index.saturating_add(1);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;

    #[test]
    fn test_missing_config_yields_defaults() {
        let mut storage = MemStorage::default();
        assert_eq!(SystemConfig::load(&mut storage), SystemConfig::default());
    }

    #[test]
    fn test_saved_config_is_loaded_back() {
        let mut storage = MemStorage::default();
        let config = SystemConfig {
            mode: OperatingMode::Eco,
            timeout: TimeoutPolicy::Never,
            next_log_index: 42,
        };
        config.save(&mut storage).unwrap();

        assert_eq!(SystemConfig::load(&mut storage), config);
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let mut storage = MemStorage::default();
        storage.insert(CONFIG_FILE, &[0xff, 0xff, 0xff]);
        assert_eq!(SystemConfig::load(&mut storage), SystemConfig::default());

        storage.insert(CONFIG_FILE, &[]);
        assert_eq!(SystemConfig::load(&mut storage), SystemConfig::default());
    }

    #[test]
    fn test_mode_and_timeout_cycles() {
        assert_eq!(OperatingMode::Realtime.next(), OperatingMode::Normal);
        assert_eq!(OperatingMode::Normal.next(), OperatingMode::Eco);
        assert_eq!(OperatingMode::Eco.next(), OperatingMode::Realtime);

        assert_eq!(TimeoutPolicy::Short.next(), TimeoutPolicy::Medium);
        assert_eq!(TimeoutPolicy::Never.next(), TimeoutPolicy::Short);
        assert_eq!(TimeoutPolicy::Short.duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_log_index_allocation_is_strictly_increasing() {
        let mut config = SystemConfig::default();
        let first = config.allocate_log_index();
        let second = config.allocate_log_index();
        assert!(second > first);
        assert_eq!(config.next_log_index, 3);
    }
}
