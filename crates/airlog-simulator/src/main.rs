//! Headless desktop simulator for the airlog control core.
//!
//! Runs [`airlog_core::app::App`] against simulated hardware on a virtual
//! clock, so hours of operation pass in a moment. A scripted sequence of
//! button presses walks the menu; the panel is dumped as ASCII art at the
//! interesting points and the remote status document is printed as JSON.
//!
//! Files are written to the directory given as the first argument
//! (default `./airlog-sim-data`).
//!
//! ```text
//! RUST_LOG=info cargo run -p airlog-simulator -- /tmp/airlog
//! ```

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::{debug, error, info};

use airlog_core::app::{App, Devices};
use airlog_core::connectivity::{BlePeripheral, BleReadings, Connectivity};
use airlog_core::display::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, Display};
use airlog_core::error::{FusionError, StorageError};
use airlog_core::platform::{Platform, StepOutcome};
use airlog_core::power::{BleLink, SleepPlan, WakeCause};
use airlog_core::sensors::{
    Accuracy, Cadence, FusionEngine, FusionSample, MAX_SAMPLES_PER_POLL, SensorAddress,
    Subscription,
};
use airlog_core::storage::calibration::CalibrationBlob;
use airlog_core::storage::{FileInfo, FileName, Mode, Storage, StorageFile};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Virtual time one awake loop iteration costs.
const LOOP_COST: Duration = Duration::from_millis(10);

/// The simulation stops here even if the script has not powered off.
const VIRTUAL_LIMIT: Duration = Duration::from_secs(2 * 3600);

/// Simulated Wi-Fi needs this long to join.
const WIFI_JOIN_TIME: Duration = Duration::from_secs(2);

/// Gap between scripted presses; longer than the post-wake input debounce.
const PRESS_GAP_MS: u64 = 600;

const TAP_MS: u64 = 100;
const HOLD_MS: u64 = 400;

// ---------------------------------------------------------------------------
// Virtual clock
// ---------------------------------------------------------------------------

/// Shared monotonic clock in milliseconds since boot.
#[derive(Clone, Default)]
struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.0.get())
    }

    fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by.as_millis());
    }

    fn set(&self, at: Instant) {
        self.0.set(at.as_millis());
    }
}

// ---------------------------------------------------------------------------
// Platform: scripted button, idle touch pad, steady battery
// ---------------------------------------------------------------------------

struct SimPlatform {
    clock: VirtualClock,
    button: bool,
    /// Pending button level changes, in time order.
    edges: VecDeque<(Instant, bool)>,
}

impl SimPlatform {
    fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            button: false,
            edges: VecDeque::new(),
        }
    }

    /// Queue a press of `held_ms` starting `after_ms` past the last queued edge.
    fn press(&mut self, after_ms: u64, held_ms: u64) {
        let start = self
            .edges
            .back()
            .map(|&(at, _)| at)
            .unwrap_or_else(|| self.clock.now())
            + Duration::from_millis(after_ms);
        self.edges.push_back((start, true));
        self.edges
            .push_back((start + Duration::from_millis(held_ms), false));
    }

    fn script_done(&self) -> bool {
        self.edges.is_empty() && !self.button
    }
}

impl Platform for SimPlatform {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn feed_watchdog(&mut self) {}

    fn button_pressed(&mut self) -> bool {
        let now = self.clock.now();
        while let Some(&(at, level)) = self.edges.front() {
            if at > now {
                break;
            }
            self.button = level;
            self.edges.pop_front();
        }
        self.button
    }

    fn touch_read(&mut self) -> u16 {
        180
    }

    fn battery_adc_millivolts(&mut self) -> u32 {
        1950
    }

    fn light_sleep(&mut self, plan: &SleepPlan) -> WakeCause {
        match self.edges.front() {
            Some(&(at, true)) if at < plan.deadline => {
                self.clock.set(at);
                WakeCause::Button
            }
            _ => {
                self.clock.set(plan.deadline);
                WakeCause::Timer
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion engine: sinusoidal air with a slowly improving accuracy
// ---------------------------------------------------------------------------

struct SimFusion {
    clock: VirtualClock,
    cadence: Cadence,
    next_due: Instant,
    /// Samples produced so far; the engine holds no state before the first.
    produced: u32,
}

impl SimFusion {
    fn new(clock: VirtualClock) -> Self {
        let next_due = clock.now();
        Self {
            clock,
            cadence: Cadence::LowPower,
            next_due,
            produced: 0,
        }
    }

    fn sample(&self, at: Instant) -> FusionSample {
        let t = at.as_millis() as f32 / 1000.0;
        FusionSample {
            temperature: 22.0 + 2.5 * (t / 900.0).sin(),
            pressure: 101_100.0 + 150.0 * (t / 3600.0).cos(),
            humidity: 45.0 + 8.0 * (t / 1200.0).sin(),
            iaq: 80.0 + 60.0 * (t / 600.0).sin().abs(),
            co2: 650.0 + 250.0 * (t / 1500.0).sin().abs(),
            accuracy: Accuracy::new((t / 300.0) as u8),
        }
    }
}

impl FusionEngine for SimFusion {
    fn begin(&mut self, address: SensorAddress) -> Result<(), FusionError> {
        match address {
            SensorAddress::Primary => Err(FusionError::Status(-2)),
            SensorAddress::Secondary => Ok(()),
        }
    }

    fn set_subscription(&mut self, subscription: &Subscription) -> Result<(), FusionError> {
        if subscription.cadence != self.cadence {
            debug!("Sim fusion rate {} Hz", subscription.cadence.rate_hz());
            self.cadence = subscription.cadence;
            self.next_due = self.clock.now() + self.cadence.period();
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<heapless::Vec<FusionSample, MAX_SAMPLES_PER_POLL>, FusionError> {
        let now = self.clock.now();
        let mut ready = heapless::Vec::new();
        while self.next_due <= now && ready.len() < MAX_SAMPLES_PER_POLL {
            ready.push(self.sample(self.next_due)).ok();
            self.produced += 1;
            self.next_due += self.cadence.period();
        }
        // A long sleep may have skipped several periods; drop the backlog.
        if self.next_due <= now {
            self.next_due = now + self.cadence.period();
        }
        Ok(ready)
    }

    fn save_state(&mut self, blob: &mut CalibrationBlob) -> Result<(), FusionError> {
        if self.produced == 0 {
            return Err(FusionError::NotReady);
        }
        for (i, byte) in blob.0.iter_mut().enumerate() {
            *byte = i as u8;
        }
        Ok(())
    }

    fn restore_state(&mut self, blob: &CalibrationBlob) -> Result<(), FusionError> {
        if blob.0.iter().enumerate().all(|(i, &b)| b == i as u8) {
            Ok(())
        } else {
            Err(FusionError::Rejected)
        }
    }
}

// ---------------------------------------------------------------------------
// Storage: a directory on the host
// ---------------------------------------------------------------------------

struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

struct FsFile(File);

impl StorageFile for FsFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.0.read(buf).map_err(|_| StorageError::Io)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.0.write_all(data).map_err(|_| StorageError::Io)
    }

    fn length(&self) -> u32 {
        self.0.metadata().map(|m| m.len() as u32).unwrap_or(0)
    }
}

impl Storage for FsStorage {
    type File<'a>
        = FsFile
    where
        Self: 'a;

    fn exists(&mut self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn open(&mut self, name: &str, mode: Mode) -> Result<FsFile, StorageError> {
        let mut options = OpenOptions::new();
        match mode {
            Mode::ReadOnly => options.read(true),
            Mode::ReadWriteCreateOrTruncate => options.write(true).create(true).truncate(true),
            Mode::ReadWriteCreateOrAppend => options.append(true).create(true),
        };
        options.open(self.path(name)).map(FsFile).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Io,
        })
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.path(name)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Io,
        })
    }

    fn list_files(&mut self, dir: &str) -> Result<Vec<FileInfo>, StorageError> {
        let entries = fs::read_dir(self.path(dir)).map_err(|_| StorageError::Io)?;
        let mut files = Vec::new();
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let mut name = FileName::new();
            let ok = name.push('/').is_ok()
                && name
                    .push_str(&entry.file_name().to_string_lossy())
                    .is_ok();
            if ok {
                files.push(FileInfo {
                    name,
                    size: meta.len() as u32,
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// Wireless
// ---------------------------------------------------------------------------

struct SimWifi {
    clock: VirtualClock,
    joining_since: Option<Instant>,
}

impl Connectivity for SimWifi {
    fn request_connect(&mut self) {
        self.joining_since = Some(self.clock.now());
    }

    fn request_disconnect(&mut self) {
        self.joining_since = None;
    }

    fn is_connected(&self) -> bool {
        self.joining_since
            .is_some_and(|since| self.clock.now() >= since + WIFI_JOIN_TIME)
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(Ipv4Addr::new(192, 168, 1, 42))
    }

    fn start_services(&mut self) {
        info!("Status endpoint listening");
    }

    fn stop_services(&mut self) {
        info!("Status endpoint closed");
    }

    fn network_time(&mut self) -> Option<i64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs() as i64)
    }
}

#[derive(Default)]
struct SimBle {
    link: BleLink,
    notifications: u32,
}

impl BlePeripheral for SimBle {
    fn start(&mut self) {
        self.link = BleLink::Advertising;
    }

    fn stop(&mut self) {
        self.link = BleLink::Off;
    }

    fn link(&self) -> BleLink {
        self.link
    }

    fn publish(&mut self, _readings: &BleReadings) {
        self.notifications += 1;
    }
}

// ---------------------------------------------------------------------------
// Panel: keeps its own copy of the pixels for ASCII dumps
// ---------------------------------------------------------------------------

struct AsciiPanel {
    pixels: Vec<bool>,
    powered: bool,
}

impl AsciiPanel {
    fn new() -> Self {
        Self {
            pixels: vec![false; (DISPLAY_WIDTH_PX * DISPLAY_HEIGHT_PX) as usize],
            powered: false,
        }
    }

    /// Two pixel rows per text line.
    fn dump(&self, title: &str) {
        let w = DISPLAY_WIDTH_PX as usize;
        println!("+{:-^w$}+", title);
        if !self.powered {
            println!("|{: ^w$}|", "(panel off)");
        } else {
            for y in (0..DISPLAY_HEIGHT_PX as usize).step_by(2) {
                let line: String = (0..w)
                    .map(|x| {
                        match (self.pixels[y * w + x], self.pixels[(y + 1) * w + x]) {
                            (true, true) => '#',
                            (true, false) => '"',
                            (false, true) => '.',
                            (false, false) => ' ',
                        }
                    })
                    .collect();
                println!("|{line}|");
            }
        }
        println!("+{:-^w$}+", "");
    }
}

impl OriginDimensions for AsciiPanel {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
    }
}

impl DrawTarget for AsciiPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let w = DISPLAY_WIDTH_PX as i32;
        let h = DISPLAY_HEIGHT_PX as i32;
        for Pixel(p, color) in pixels {
            if (0..w).contains(&p.x) && (0..h).contains(&p.y) {
                self.pixels[(p.y * w + p.x) as usize] = color.is_on();
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        self.draw_iter(
            area.points()
                .zip(colors)
                .map(|(p, color)| Pixel(p, color)),
        )
    }
}

impl Display for AsciiPanel {
    fn set_power(&mut self, on: bool) {
        self.powered = on;
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

type SimApp = App<SimPlatform, SimFusion, FsStorage, SimWifi, SimBle, AsciiPanel>;

/// Step until the script is exhausted and `settle` has passed, or the app
/// leaves the loop.
fn run(app: &mut SimApp, settle: Duration) -> Option<StepOutcome> {
    let mut quiet_since: Option<Instant> = None;
    loop {
        let outcome = app.step();
        if outcome != StepOutcome::Continue {
            return Some(outcome);
        }
        app.devices.platform.clock.advance(LOOP_COST);

        let now = app.devices.platform.now();
        if now.as_millis() > VIRTUAL_LIMIT.as_millis() {
            return None;
        }
        if app.devices.platform.script_done() {
            let since = *quiet_since.get_or_insert(now);
            if now >= since + settle {
                return None;
            }
        }
    }
}

/// Walk the menu from the dashboard to entry `index` and run it. A dark
/// screen takes one extra press to wake.
fn menu_select(app: &mut SimApp, index: usize) {
    let platform = &mut app.devices.platform;
    if !app.state.power.is_screen_on() {
        platform.press(PRESS_GAP_MS, TAP_MS);
    }
    platform.press(PRESS_GAP_MS, TAP_MS);
    for _ in 0..index {
        platform.press(PRESS_GAP_MS, TAP_MS);
    }
    platform.press(PRESS_GAP_MS, HOLD_MS);
}

fn print_status(app: &SimApp) {
    match serde_json::to_string_pretty(&app.status_document()) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Status document: {e}"),
    }
}

fn main() {
    env_logger::init();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("airlog-sim-data"));
    if let Err(e) = fs::create_dir_all(&root) {
        error!("Cannot create {}: {e}", root.display());
        std::process::exit(1);
    }
    info!("Starting airlog simulator in {}", root.display());

    let clock = VirtualClock::default();
    let devices = Devices {
        platform: SimPlatform::new(clock.clone()),
        fusion: SimFusion::new(clock.clone()),
        storage: FsStorage { root },
        wifi: SimWifi {
            clock: clock.clone(),
            joining_since: None,
        },
        ble: SimBle::default(),
        display: AsciiPanel::new(),
    };

    let mut app = match App::boot(devices) {
        Ok(app) => app,
        Err(e) => {
            error!("Boot failed: {e}");
            std::process::exit(1);
        }
    };

    run(&mut app, Duration::from_secs(5));
    app.devices.display.dump(" dashboard ");

    // Start a recording and let it collect a few minutes of samples.
    menu_select(&mut app, 3);
    run(&mut app, Duration::from_secs(600));
    app.devices.display.dump(" recording, screen timed out ");

    // Bring Wi-Fi up and serve the status document.
    menu_select(&mut app, 4);
    run(&mut app, Duration::from_secs(5));
    print_status(&app);

    // Open the graphs and look at CO2.
    menu_select(&mut app, 0);
    app.devices.platform.press(PRESS_GAP_MS, TAP_MS);
    run(&mut app, Duration::from_secs(1));
    app.devices.display.dump(" co2 trend ");
    app.devices.platform.press(PRESS_GAP_MS, HOLD_MS);

    // Stop the recording and list what is on flash.
    menu_select(&mut app, 3);
    run(&mut app, Duration::from_secs(1));
    match app.recordings() {
        Ok(files) => {
            for file in files {
                println!("{:>8} bytes  {}", file.size, file.name);
            }
        }
        Err(e) => error!("Listing recordings failed: {e}"),
    }

    menu_select(&mut app, 10);
    let outcome = run(&mut app, Duration::from_secs(5));
    info!(
        "Simulator finished after {} s virtual time: {:?} ({} BLE notifications)",
        app.devices.platform.now().as_secs(),
        outcome,
        app.devices.ble.notifications
    );
}
