//! Telemetry ring log: buffered CSV recording of readings
//!
//! Readings are buffered in RAM while a recording is active and flushed to the
//! recording's CSV file in batches. The buffer never overwrites unflushed
//! entries: reaching capacity forces a flush before the next entry is stored.
//! In Eco mode samples arrive every five minutes, so each entry is flushed as
//! soon as it is buffered.
//!
//! A flush that fails drops the batch. Retrying would stall the control loop
//! on a failing filesystem, and losing a batch is preferable.

use core::fmt::Write;

use embassy_time::Instant;
use heapless::{String, Vec};
use log::{debug, error, info, warn};

use crate::config::{OperatingMode, SystemConfig};
use crate::error::StorageError;
use crate::sensors::SensorReading;
use crate::storage::{FileName, Mode, Storage, StorageFile, log_file_name};
use crate::wall_clock::WallClock;

/// Entries held in RAM before a flush is forced.
pub const LOG_CAPACITY: usize = 300;

/// Records are accumulated into chunks of this size before hitting the file.
pub const WRITE_CHUNK_LEN: usize = 1024;

/// First row of every recording.
pub const LOG_HEADER: &str = "DateTime,Time(ms),IAQ,CO2,Temp,Hum\n";

/// Longest single CSV record.
const RECORD_MAX_LEN: usize = 128;

/// One buffered row of a recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub timestamp: Instant,
    pub iaq: f32,
    pub co2: f32,
    pub temperature: f32,
    pub humidity: f32,
}

impl LogEntry {
    pub fn from_reading(timestamp: Instant, reading: &SensorReading) -> Self {
        Self {
            timestamp,
            iaq: reading.iaq,
            co2: reading.co2,
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }

    /// Format as `DateTime,Time(ms),IAQ,CO2,Temp,Hum` followed by a newline.
    ///
    /// The date column is empty until the wall clock has been synced.
    pub fn write_record<W: Write>(&self, clock: &WallClock, out: &mut W) -> core::fmt::Result {
        clock.write_date_time(self.timestamp, out);
        writeln!(
            out,
            ",{},{:.2},{:.2},{:.2},{:.2}",
            self.timestamp.as_millis(),
            self.iaq,
            self.co2,
            self.temperature,
            self.humidity
        )
    }
}

/// Result of a successful flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub entries: usize,
    pub bytes: usize,
}

/// What [`TelemetryLog::append`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// No recording is active; the entry was discarded.
    NotRecording,
    /// Stored in RAM, nothing written.
    Buffered,
    /// Stored and at least one flush ran; carries the last flush's result.
    Flushed(Result<FlushReport, StorageError>),
}

/// Fixed-capacity RAM buffer of [`LogEntry`] with its destination file.
pub struct TelemetryLog {
    entries: Vec<LogEntry, LOG_CAPACITY>,
    destination: Option<FileName>,
    recording_index: Option<u32>,
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryLog {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            destination: None,
            recording_index: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.destination.is_some()
    }

    /// File the active recording writes to.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_ref().map(|name| name.as_str())
    }

    pub fn recording_index(&self) -> Option<u32> {
        self.recording_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Buffer fill level in whole percent.
    pub fn fill_percent(&self) -> u8 {
        (self.entries.len() * 100 / LOG_CAPACITY) as u8
    }

    /// True when appending one more entry in `mode` would write to storage.
    pub fn append_will_flush(&self, mode: OperatingMode) -> bool {
        self.is_recording() && (self.entries.is_full() || mode == OperatingMode::Eco)
    }

    /// Start a new recording under a freshly allocated index.
    ///
    /// Indices whose file still exists are skipped so an old recording is
    /// never appended to, even after the config has been reset. The advanced
    /// counter is persisted before the recording starts.
    pub fn start_recording<S: Storage>(
        &mut self,
        config: &mut SystemConfig,
        storage: &mut S,
    ) -> Result<u32, StorageError> {
        let (index, name) = loop {
            if config.next_log_index == u32::MAX {
                return Err(StorageError::Full);
            }
            let index = config.allocate_log_index();
            let name = log_file_name(index);
            if !storage.exists(&name) {
                break (index, name);
            }
            warn!("{} already exists, skipping index {}", name, index);
        };

        if let Err(e) = config.save(storage) {
            warn!("Failed to persist next log index: {}", e);
        }

        info!("Recording started: {}", name);
        self.entries.clear();
        self.destination = Some(name);
        self.recording_index = Some(index);
        Ok(index)
    }

    /// Flush whatever is buffered and close the recording.
    pub fn stop_recording<S: Storage>(
        &mut self,
        storage: &mut S,
        clock: &WallClock,
    ) -> Result<FlushReport, StorageError> {
        let result = self.flush(storage, clock);
        if let Some(name) = self.destination.take() {
            info!("Recording stopped: {}", name);
        }
        self.recording_index = None;
        result
    }

    /// Buffer one entry, flushing first if the buffer is full and afterwards
    /// when running in Eco mode.
    pub fn append<S: Storage>(
        &mut self,
        entry: LogEntry,
        mode: OperatingMode,
        storage: &mut S,
        clock: &WallClock,
    ) -> AppendOutcome {
        if !self.is_recording() {
            return AppendOutcome::NotRecording;
        }

        let mut last_flush = None;
        if self.entries.is_full() {
            last_flush = Some(self.flush(storage, clock));
        }

        // Cannot fail: the buffer was just drained if it was full.
        self.entries.push(entry).ok();

        if mode == OperatingMode::Eco {
            last_flush = Some(self.flush(storage, clock));
        }

        match last_flush {
            Some(result) => AppendOutcome::Flushed(result),
            None => AppendOutcome::Buffered,
        }
    }

    /// Write every buffered entry to the destination file.
    ///
    /// The buffer is cleared whether or not the write succeeded.
    pub fn flush<S: Storage>(
        &mut self,
        storage: &mut S,
        clock: &WallClock,
    ) -> Result<FlushReport, StorageError> {
        let result = match &self.destination {
            Some(name) => write_batch(storage, name, &self.entries, clock),
            None => Ok(FlushReport::default()),
        };

        match &result {
            Ok(report) => debug!(
                "Flushed {} entries ({} bytes) to {:?}",
                report.entries, report.bytes, self.destination
            ),
            Err(e) => error!(
                "Flush to {:?} failed ({}), dropping {} entries",
                self.destination,
                e,
                self.entries.len()
            ),
        }

        self.entries.clear();
        result
    }
}

fn write_batch<S: Storage>(
    storage: &mut S,
    name: &str,
    entries: &[LogEntry],
    clock: &WallClock,
) -> Result<FlushReport, StorageError> {
    let mut file = storage.open(name, Mode::ReadWriteCreateOrAppend)?;
    let mut report = FlushReport {
        entries: entries.len(),
        bytes: 0,
    };

    if file.length() == 0 {
        file.write(LOG_HEADER.as_bytes())?;
        report.bytes += LOG_HEADER.len();
    }

    let mut chunk: Vec<u8, WRITE_CHUNK_LEN> = Vec::new();
    for entry in entries {
        let mut line: String<RECORD_MAX_LEN> = String::new();
        entry
            .write_record(clock, &mut line)
            .map_err(|_| StorageError::Io)?;

        if chunk.len() + line.len() >= WRITE_CHUNK_LEN {
            file.write(&chunk)?;
            report.bytes += chunk.len();
            chunk.clear();
        }
        chunk
            .extend_from_slice(line.as_bytes())
            .map_err(|_| StorageError::Io)?;
    }

    if !chunk.is_empty() {
        file.write(&chunk)?;
        report.bytes += chunk.len();
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;

    fn entry(ms: u64) -> LogEntry {
        LogEntry {
            timestamp: Instant::from_millis(ms),
            iaq: 50.0,
            co2: 600.5,
            temperature: 21.25,
            humidity: 40.0,
        }
    }

    fn recording() -> (TelemetryLog, SystemConfig, MemStorage) {
        let mut log = TelemetryLog::new();
        let mut config = SystemConfig::default();
        let mut storage = MemStorage::default();
        log.start_recording(&mut config, &mut storage).unwrap();
        (log, config, storage)
    }

    #[test]
    fn test_append_without_recording_is_ignored() {
        let mut log = TelemetryLog::new();
        let mut storage = MemStorage::default();
        let outcome = log.append(entry(1), OperatingMode::Normal, &mut storage, &WallClock::default());
        assert_eq!(outcome, AppendOutcome::NotRecording);
        assert!(log.is_empty());
    }

    #[test]
    fn test_capacity_forces_exactly_one_flush_before_insert() {
        let (mut log, _, mut storage) = recording();
        let clock = WallClock::default();

        for i in 0..LOG_CAPACITY {
            let outcome = log.append(entry(i as u64), OperatingMode::Normal, &mut storage, &clock);
            assert_eq!(outcome, AppendOutcome::Buffered);
        }
        assert_eq!(log.len(), LOG_CAPACITY);
        assert_eq!(log.fill_percent(), 100);
        assert!(storage.get("/log_001.csv").is_none());

        let outcome = log.append(entry(999), OperatingMode::Normal, &mut storage, &clock);
        match outcome {
            AppendOutcome::Flushed(Ok(report)) => assert_eq!(report.entries, LOG_CAPACITY),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(log.len(), 1);

        let contents = storage.get("/log_001.csv").unwrap();
        let lines = contents.iter().filter(|&&b| b == b'\n').count();
        assert_eq!(lines, LOG_CAPACITY + 1);
    }

    #[test]
    fn test_eco_flushes_every_entry() {
        let (mut log, _, mut storage) = recording();
        let clock = WallClock::default();

        for i in 0..3 {
            let outcome = log.append(entry(i), OperatingMode::Eco, &mut storage, &clock);
            assert!(matches!(outcome, AppendOutcome::Flushed(Ok(r)) if r.entries == 1));
            assert_eq!(log.len(), 0);
        }

        let contents = storage.get("/log_001.csv").unwrap();
        let text = core::str::from_utf8(contents).unwrap();
        assert!(text.starts_with(LOG_HEADER));
        assert_eq!(text.matches(LOG_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_record_format() {
        let (mut log, _, mut storage) = recording();
        log.append(entry(1234), OperatingMode::Eco, &mut storage, &WallClock::default());

        let text = core::str::from_utf8(storage.get("/log_001.csv").unwrap()).unwrap();
        assert_eq!(text.lines().nth(1), Some(",1234,50.00,600.50,21.25,40.00"));
    }

    #[test]
    fn test_failed_flush_drops_batch() {
        let (mut log, _, mut storage) = recording();
        let clock = WallClock::default();
        for i in 0..10 {
            log.append(entry(i), OperatingMode::Normal, &mut storage, &clock);
        }

        storage.fail_writes = true;
        assert_eq!(log.flush(&mut storage, &clock), Err(StorageError::Io));
        assert!(log.is_empty());
        assert!(log.is_recording());
    }

    #[test]
    fn test_start_recording_persists_index_and_skips_existing_files() {
        let mut log = TelemetryLog::new();
        let mut config = SystemConfig::default();
        let mut storage = MemStorage::default();
        storage.insert("/log_001.csv", b"old");

        let index = log.start_recording(&mut config, &mut storage).unwrap();
        assert_eq!(index, 2);
        assert_eq!(log.destination(), Some("/log_002.csv"));
        assert_eq!(SystemConfig::load(&mut storage).next_log_index, 3);
    }

    #[test]
    fn test_stop_recording_flushes_remainder() {
        let (mut log, _, mut storage) = recording();
        let clock = WallClock::default();
        for i in 0..5 {
            log.append(entry(i), OperatingMode::Normal, &mut storage, &clock);
        }

        let report = log.stop_recording(&mut storage, &clock).unwrap();
        assert_eq!(report.entries, 5);
        assert!(!log.is_recording());
        assert_eq!(log.destination(), None);
        assert_eq!(log.recording_index(), None);
    }
}
