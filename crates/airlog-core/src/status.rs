//! Remote status document and recording management
//!
//! While Wi-Fi is up, the status endpoint serves [`StatusDocument`] as JSON and
//! lets the user list and delete recordings. The core only produces the data;
//! the endpoint owns the transport.

use alloc::vec::Vec;

use embassy_time::Instant;
use log::{info, warn};
use serde::Serialize;

use crate::error::StorageError;
use crate::sensors::{RunningStats, SensorReading};
use crate::storage::telemetry::TelemetryLog;
use crate::storage::{FileInfo, Storage, is_recording_name};

/// Snapshot of the device served by the status endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument<'a> {
    pub iaq: f32,
    pub co2: f32,
    pub temp: f32,
    pub hum: f32,
    pub press: f32,
    pub volt: f32,
    pub acc: u8,
    /// Milliseconds since boot.
    pub uptime: u64,
    pub is_rec: bool,
    pub rec_file: &'a str,
}

impl<'a> StatusDocument<'a> {
    pub fn capture(
        reading: &SensorReading,
        stats: &RunningStats,
        telemetry: &'a TelemetryLog,
        now: Instant,
    ) -> Self {
        Self {
            iaq: reading.iaq,
            co2: reading.co2,
            temp: reading.temperature,
            hum: reading.humidity,
            press: reading.pressure,
            volt: reading.voltage,
            acc: reading.accuracy.grade(),
            uptime: stats.uptime(now).as_millis(),
            is_rec: telemetry.is_recording(),
            rec_file: telemetry.destination().unwrap_or(""),
        }
    }
}

/// Recordings in the root directory, in listing order.
pub fn list_recordings<S: Storage>(storage: &mut S) -> Result<Vec<FileInfo>, StorageError> {
    let mut files = storage.list_files("/")?;
    files.retain(|file| is_recording_name(&file.name));
    Ok(files)
}

/// Delete a recording by name. Anything but a bare `.csv` name is refused.
pub fn delete_recording<S: Storage>(storage: &mut S, name: &str) -> Result<(), StorageError> {
    if !is_recording_name(name) {
        warn!("Refusing to delete {:?}", name);
        return Err(StorageError::InvalidName);
    }

    if name.starts_with('/') {
        storage.remove(name)?;
    } else {
        let mut path = crate::storage::FileName::new();
        path.push('/').map_err(|_| StorageError::InvalidName)?;
        path.push_str(name).map_err(|_| StorageError::InvalidName)?;
        storage.remove(&path)?;
    }
    info!("Deleted recording {}", name);
    Ok(())
}
