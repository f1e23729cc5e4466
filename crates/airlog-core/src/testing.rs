//! In-memory collaborators for unit tests

use std::collections::{BTreeMap, VecDeque};
use std::string::String;
use std::vec::Vec;

use core::convert::Infallible;
use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use heapless::Vec as HVec;

use crate::connectivity::{BlePeripheral, BleReadings, Connectivity};
use crate::display::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, Display};
use crate::error::{FusionError, StorageError};
use crate::platform::Platform;
use crate::power::{BleLink, SleepPlan, WakeCause};
use crate::sensors::{FusionEngine, FusionSample, MAX_SAMPLES_PER_POLL, SensorAddress, Subscription};
use crate::storage::calibration::CalibrationBlob;
use crate::storage::{FileInfo, FileName, Mode, Storage, StorageFile};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Flat in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemStorage {
    files: BTreeMap<String, Vec<u8>>,
    /// Every write fails with [`StorageError::Io`] while set.
    pub fail_writes: bool,
    /// Every read of an opened file fails with [`StorageError::Io`] while set.
    pub fail_reads: bool,
    /// Every `open` fails with [`StorageError::Io`] while set.
    pub fail_opens: bool,
}

impl MemStorage {
    pub fn insert(&mut self, name: &str, data: &[u8]) {
        self.files.insert(name.into(), data.to_vec());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|data| data.as_slice())
    }
}

pub struct MemFile<'a> {
    data: &'a mut Vec<u8>,
    pos: usize,
    fail_writes: bool,
    fail_reads: bool,
}

impl StorageFile for MemFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Io);
        }
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io);
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn length(&self) -> u32 {
        self.data.len() as u32
    }
}

impl Storage for MemStorage {
    type File<'a>
        = MemFile<'a>
    where
        Self: 'a;

    fn exists(&mut self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn open(&mut self, name: &str, mode: Mode) -> Result<MemFile<'_>, StorageError> {
        if self.fail_opens {
            return Err(StorageError::Io);
        }
        let fail_writes = self.fail_writes;
        let fail_reads = self.fail_reads;
        let data = match mode {
            Mode::ReadOnly => self.files.get_mut(name).ok_or(StorageError::NotFound)?,
            Mode::ReadWriteCreateOrTruncate => {
                let data = self.files.entry(name.into()).or_default();
                data.clear();
                data
            }
            Mode::ReadWriteCreateOrAppend => self.files.entry(name.into()).or_default(),
        };
        Ok(MemFile {
            data,
            pos: 0,
            fail_writes,
            fail_reads,
        })
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.files
            .remove(name)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    fn list_files(&mut self, _dir: &str) -> Result<alloc::vec::Vec<FileInfo>, StorageError> {
        self.files
            .iter()
            .map(|(name, data)| {
                let mut file_name = FileName::new();
                file_name
                    .push_str(name)
                    .map_err(|_| StorageError::InvalidName)?;
                Ok(FileInfo {
                    name: file_name,
                    size: data.len() as u32,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Fusion engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeFusion {
    /// Addresses on which `begin` fails.
    pub dead_addresses: Vec<SensorAddress>,
    pub begun: Option<SensorAddress>,
    pub subscriptions: Vec<Subscription>,
    /// Samples handed out by the next polls, at most four per poll.
    pub queued: VecDeque<FusionSample>,
    pub poll_error: Option<FusionError>,
    /// `restore_state` refuses every blob while set.
    pub reject_state: bool,
    pub restored: Option<CalibrationBlob>,
    /// Byte pattern written by `save_state`.
    pub state_byte: u8,
    /// `save_state` reports [`FusionError::NotReady`] while set.
    pub state_unavailable: bool,
}

impl FusionEngine for FakeFusion {
    fn begin(&mut self, address: SensorAddress) -> Result<(), FusionError> {
        if self.dead_addresses.contains(&address) {
            return Err(FusionError::Status(-2));
        }
        self.begun = Some(address);
        Ok(())
    }

    fn set_subscription(&mut self, subscription: &Subscription) -> Result<(), FusionError> {
        self.subscriptions.push(*subscription);
        Ok(())
    }

    fn poll(&mut self) -> Result<HVec<FusionSample, MAX_SAMPLES_PER_POLL>, FusionError> {
        if let Some(e) = self.poll_error.take() {
            return Err(e);
        }
        let mut ready = HVec::new();
        while !ready.is_full() {
            let Some(sample) = self.queued.pop_front() else {
                break;
            };
            ready.push(sample).ok();
        }
        Ok(ready)
    }

    fn save_state(&mut self, blob: &mut CalibrationBlob) -> Result<(), FusionError> {
        if self.state_unavailable {
            return Err(FusionError::NotReady);
        }
        blob.0.fill(self.state_byte);
        Ok(())
    }

    fn restore_state(&mut self, blob: &CalibrationBlob) -> Result<(), FusionError> {
        if self.reject_state {
            return Err(FusionError::Rejected);
        }
        self.restored = Some(blob.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wireless
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeWifi {
    pub radio_on: bool,
    pub connected: bool,
    pub services_running: bool,
    pub services_starts: u32,
    pub ip: Ipv4Addr,
    pub time: Option<i64>,
}

impl Default for FakeWifi {
    fn default() -> Self {
        Self {
            radio_on: false,
            connected: false,
            services_running: false,
            services_starts: 0,
            ip: Ipv4Addr::new(192, 168, 4, 2),
            time: Some(1_700_000_000),
        }
    }
}

impl Connectivity for FakeWifi {
    fn request_connect(&mut self) {
        self.radio_on = true;
    }

    fn request_disconnect(&mut self) {
        self.radio_on = false;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.connected.then_some(self.ip)
    }

    fn start_services(&mut self) {
        self.services_running = true;
        self.services_starts += 1;
    }

    fn stop_services(&mut self) {
        self.services_running = false;
    }

    fn network_time(&mut self) -> Option<i64> {
        self.time
    }
}

#[derive(Debug, Default)]
pub struct FakeBle {
    pub link: BleLink,
    pub published: Vec<BleReadings>,
}

impl BlePeripheral for FakeBle {
    fn start(&mut self) {
        self.link = BleLink::Advertising;
    }

    fn stop(&mut self) {
        self.link = BleLink::Off;
    }

    fn link(&self) -> BleLink {
        self.link
    }

    fn publish(&mut self, readings: &BleReadings) {
        self.published.push(*readings);
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeDisplay {
    pub powered: bool,
    /// Number of `fill_contiguous` transfers received.
    pub transfers: u32,
}

impl OriginDimensions for FakeDisplay {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
    }
}

impl DrawTarget for FakeDisplay {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, _pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        Ok(())
    }

    fn fill_contiguous<I>(
        &mut self,
        _area: &embedded_graphics::primitives::Rectangle,
        _colors: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        self.transfers += 1;
        Ok(())
    }
}

impl Display for FakeDisplay {
    fn set_power(&mut self, on: bool) {
        self.powered = on;
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Fake board whose clock only moves when told to or while "sleeping".
#[derive(Debug)]
pub struct FakePlatform {
    pub clock: Instant,
    pub button: bool,
    /// Raw touch reading returned by every `touch_read`.
    pub touch_level: u16,
    pub battery_mv: u32,
    pub watchdog_feeds: u32,
    /// Every sleep requested, in order.
    pub sleeps: Vec<SleepPlan>,
    /// Scripted early wakes: cause and how far into the sleep it fires.
    pub wakes: VecDeque<(WakeCause, Duration)>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            clock: Instant::from_millis(0),
            button: false,
            touch_level: 200,
            battery_mv: 2000,
            watchdog_feeds: 0,
            sleeps: Vec::new(),
            wakes: VecDeque::new(),
        }
    }
}

impl FakePlatform {
    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
    }
}

impl Platform for FakePlatform {
    fn now(&self) -> Instant {
        self.clock
    }

    fn feed_watchdog(&mut self) {
        self.watchdog_feeds += 1;
    }

    fn button_pressed(&mut self) -> bool {
        self.button
    }

    fn touch_read(&mut self) -> u16 {
        self.touch_level
    }

    fn battery_adc_millivolts(&mut self) -> u32 {
        self.battery_mv
    }

    fn light_sleep(&mut self, plan: &SleepPlan) -> WakeCause {
        self.sleeps.push(*plan);
        match self.wakes.pop_front() {
            Some((cause, after)) if after < plan.duration => {
                self.clock += after;
                cause
            }
            _ => {
                self.clock += plan.duration;
                WakeCause::Timer
            }
        }
    }
}
