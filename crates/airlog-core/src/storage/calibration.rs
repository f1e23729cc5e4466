//! Persistence of the fusion engine's calibration state
//!
//! The engine learns its baseline over hours of operation. Its internal state
//! is saved every [`SAVE_PERIOD`] (or on demand) so a power cycle does not
//! restart calibration from scratch. A state captured while the engine is
//! still uncalibrated is worthless, so writes are gated on accuracy.

use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};

use crate::error::{FusionError, StorageError};
use crate::sensors::{Accuracy, FusionEngine};
use crate::storage::{self, CALIBRATION_FILE, Mode, Storage};

/// Size of the fusion engine's state blob.
pub const CALIBRATION_BLOB_LEN: usize = 221;

/// Interval between periodic state saves.
pub const SAVE_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Opaque, fixed-size calibration state owned by the fusion engine.
#[derive(Clone, PartialEq, Eq)]
pub struct CalibrationBlob(pub [u8; CALIBRATION_BLOB_LEN]);

impl Default for CalibrationBlob {
    fn default() -> Self {
        Self([0; CALIBRATION_BLOB_LEN])
    }
}

impl core::fmt::Debug for CalibrationBlob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CalibrationBlob({} bytes)", CALIBRATION_BLOB_LEN)
    }
}

/// Result of [`CalibrationStore::maybe_save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Not forced and the periodic interval has not elapsed.
    NotDue,
    /// State written to storage.
    Saved,
    /// Accuracy grade was 0; nothing written.
    SkippedLowAccuracy,
    /// The engine refused to hand out its state.
    EngineFailed(FusionError),
    /// The write to storage failed.
    StorageFailed(StorageError),
}

impl SaveOutcome {
    pub fn is_saved(self) -> bool {
        self == Self::Saved
    }
}

/// Result of [`CalibrationStore::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    NotFound,
    Restored,
    /// The stored blob could not be read back, had the wrong size or was
    /// rejected by the engine; the file has been removed.
    Discarded,
    /// The file could not be opened; it is left in place.
    Unreadable(StorageError),
}

/// Tracks when the calibration state was last saved and drives the saves.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationStore {
    last_save: Instant,
    restored: bool,
    saved_since_boot: bool,
}

impl CalibrationStore {
    pub fn new(now: Instant) -> Self {
        Self {
            last_save: now,
            restored: false,
            saved_since_boot: false,
        }
    }

    pub fn last_save(&self) -> Instant {
        self.last_save
    }

    /// Minutes since the last save or restore, `None` if neither happened.
    pub fn minutes_since_save(&self, now: Instant) -> Option<u64> {
        (self.restored || self.saved_since_boot)
            .then(|| now.saturating_duration_since(self.last_save).as_secs() / 60)
    }

    /// Load the stored blob at boot and hand it to the engine.
    pub fn restore<S: Storage, F: FusionEngine>(
        &mut self,
        now: Instant,
        storage: &mut S,
        fusion: &mut F,
    ) -> RestoreOutcome {
        if !storage.exists(CALIBRATION_FILE) {
            info!("No stored calibration state");
            return RestoreOutcome::NotFound;
        }

        // One spare byte so an oversized file is detected as well.
        let mut buf = [0u8; CALIBRATION_BLOB_LEN + 1];
        let read = match storage.open(CALIBRATION_FILE, Mode::ReadOnly) {
            Ok(mut file) => storage::read_into(&mut file, &mut buf),
            Err(e) => {
                error!("Failed to open calibration state: {}", e);
                return RestoreOutcome::Unreadable(e);
            }
        };
        let len = match read {
            Ok(len) => len,
            Err(e) => {
                error!("Failed to read calibration state ({}), discarding", e);
                discard(storage);
                return RestoreOutcome::Discarded;
            }
        };

        if len != CALIBRATION_BLOB_LEN {
            warn!("Calibration state has wrong size ({} bytes), discarding", len);
            discard(storage);
            return RestoreOutcome::Discarded;
        }

        let mut blob = CalibrationBlob::default();
        blob.0.copy_from_slice(&buf[..CALIBRATION_BLOB_LEN]);

        match fusion.restore_state(&blob) {
            Ok(()) => {
                info!("Calibration state restored");
                self.restored = true;
                self.last_save = now;
                RestoreOutcome::Restored
            }
            Err(e) => {
                warn!("Fusion engine rejected calibration state ({}), discarding", e);
                discard(storage);
                RestoreOutcome::Discarded
            }
        }
    }

    /// Save the engine state if forced or if the periodic interval elapsed.
    ///
    /// The write only happens when `accuracy` is at least 1. The periodic
    /// timer restarts whenever the routine runs, except for a forced attempt
    /// that did not write: that one leaves the schedule untouched.
    pub fn maybe_save<S: Storage, F: FusionEngine>(
        &mut self,
        force: bool,
        now: Instant,
        accuracy: Accuracy,
        storage: &mut S,
        fusion: &mut F,
    ) -> SaveOutcome {
        let due = now.saturating_duration_since(self.last_save) > SAVE_PERIOD;
        if !force && !due {
            return SaveOutcome::NotDue;
        }

        let outcome = if accuracy.is_calibrated() {
            self.write(storage, fusion)
        } else {
            SaveOutcome::SkippedLowAccuracy
        };

        if outcome.is_saved() {
            self.saved_since_boot = true;
        }
        if outcome.is_saved() || !force {
            self.last_save = now;
        }

        debug!("Calibration save (force={}): {:?}", force, outcome);
        outcome
    }

    fn write<S: Storage, F: FusionEngine>(&mut self, storage: &mut S, fusion: &mut F) -> SaveOutcome {
        let mut blob = CalibrationBlob::default();
        if let Err(e) = fusion.save_state(&mut blob) {
            warn!("Fusion engine did not hand out its state: {}", e);
            return SaveOutcome::EngineFailed(e);
        }

        match storage::write_file(storage, CALIBRATION_FILE, &blob.0) {
            Ok(()) => {
                info!("Calibration state saved");
                SaveOutcome::Saved
            }
            Err(e) => {
                error!("Failed to write calibration state: {}", e);
                SaveOutcome::StorageFailed(e)
            }
        }
    }

    /// Delete the stored calibration state.
    pub fn erase<S: Storage>(&mut self, storage: &mut S) -> Result<(), StorageError> {
        match storage.remove(CALIBRATION_FILE) {
            Ok(()) | Err(StorageError::NotFound) => {
                info!("Calibration state erased");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn discard<S: Storage>(storage: &mut S) {
    if let Err(e) = storage.remove(CALIBRATION_FILE) {
        error!("Failed to remove calibration state: {}", e);
    }
}
