//! The control loop
//!
//! [`App`] owns every piece of operating state together with the hardware
//! collaborators. The binary calls [`App::boot`] once and then [`App::step`]
//! forever; each step polls inputs, drains the fusion engine, runs the
//! periodic jobs, redraws the panel and finally light-sleeps when nothing
//! needs the CPU until the next sample.

use alloc::vec::Vec;
use core::fmt::Debug;

use embassy_time::Instant;
use log::{debug, error, info, warn};

use crate::config::{OperatingMode, SystemConfig};
use crate::connectivity::{BlePeripheral, BleReadings, Connectivity, WifiSession, toggle_ble};
use crate::display::{Display, Frame, FrameBuffer, refresh_interval, render};
use crate::error::{AppError, FusionError, StorageError};
use crate::mode::ModeController;
use crate::platform::{Platform, StepOutcome};
use crate::power::{
    BleLink, INPUT_GRACE, PowerScheduler, SleepConditions, WAKE_GRACE, WakeOutcome,
};
use crate::sensors::{
    BATTERY_ADC_SAMPLES, FusionEngine, FusionSample, RunningStats, SensorAddress, SensorReading,
    cell_voltage,
};
use crate::status::{self, StatusDocument};
use crate::storage::calibration::CalibrationStore;
use crate::storage::telemetry::{AppendOutcome, LogEntry, TelemetryLog};
use crate::storage::{FileInfo, Storage};
use crate::trend::TrendBuffers;
use crate::ui::gesture::{Inputs, average_touch};
use crate::ui::{Gesture, MenuContext, Notice, NoticeKind, UiCommand, UiStateMachine};
use crate::wall_clock::WallClock;

/// Hardware collaborators, handed over once at boot.
pub struct Devices<P, F, S, C, B, D> {
    pub platform: P,
    pub fusion: F,
    pub storage: S,
    pub wifi: C,
    pub ble: B,
    pub display: D,
}

/// Everything the loop mutates between iterations.
pub struct AppState {
    pub reading: SensorReading,
    pub stats: RunningStats,
    pub config: SystemConfig,
    pub ui: UiStateMachine,
    pub inputs: Inputs,
    pub modes: ModeController,
    pub power: PowerScheduler,
    pub telemetry: TelemetryLog,
    pub trend: TrendBuffers,
    pub calibration: CalibrationStore,
    pub wifi: WifiSession,
    pub clock: WallClock,
    /// Full-screen message currently shown.
    pub notice: Option<Notice>,
    /// Last error reported by the fusion engine; cleared by the next sample.
    pub fusion_fault: Option<FusionError>,
    /// Restart or power-off requested, and when to carry it out.
    pub pending_exit: Option<(StepOutcome, Instant)>,
    pub last_draw: Option<Instant>,
}

pub struct App<P, F, S, C, B, D> {
    pub devices: Devices<P, F, S, C, B, D>,
    pub state: AppState,
    framebuffer: FrameBuffer,
}

impl<P, F, S, C, B, D> App<P, F, S, C, B, D>
where
    P: Platform,
    F: FusionEngine,
    S: Storage,
    C: Connectivity,
    B: BlePeripheral,
    D: Display,
    D::Error: Debug,
{
    /// Bring the device up: load the config, start the fusion engine, restore
    /// its calibration and issue the subscription for the stored mode.
    ///
    /// Only a fusion engine that answers on neither address is fatal.
    pub fn boot(mut devices: Devices<P, F, S, C, B, D>) -> Result<Self, AppError> {
        let now = devices.platform.now();
        let config = SystemConfig::load(&mut devices.storage);
        info!(
            "Booting: mode {:?}, timeout {:?}, next log {}",
            config.mode, config.timeout, config.next_log_index
        );

        let address = begin_fusion(&mut devices.fusion)?;
        info!("Fusion engine up on {:?} address", address);

        let mut calibration = CalibrationStore::new(now);
        let restored = calibration.restore(now, &mut devices.storage, &mut devices.fusion);
        debug!("Calibration restore: {:?}", restored);

        let mut modes = ModeController::new();
        let fusion_fault = modes.apply(config.mode, &mut devices.fusion).err();

        devices.display.set_power(true);

        let state = AppState {
            reading: SensorReading::default(),
            stats: RunningStats::new(now),
            config,
            ui: UiStateMachine::new(),
            inputs: Inputs::default(),
            modes,
            power: PowerScheduler::new(now),
            telemetry: TelemetryLog::new(),
            trend: TrendBuffers::new(),
            calibration,
            wifi: WifiSession::new(),
            clock: WallClock::default(),
            notice: None,
            fusion_fault,
            pending_exit: None,
            last_draw: None,
        };

        let mut app = Self {
            devices,
            state,
            framebuffer: FrameBuffer::new(),
        };
        app.refresh_battery();
        Ok(app)
    }

    /// Run one loop iteration.
    pub fn step(&mut self) -> StepOutcome {
        self.devices.platform.feed_watchdog();

        let now = self.devices.platform.now();
        self.state
            .wifi
            .tick(now, &mut self.devices.wifi, &mut self.state.clock);

        self.poll_inputs(now);
        self.poll_fusion();

        let now = self.devices.platform.now();
        self.state.calibration.maybe_save(
            false,
            now,
            self.state.reading.accuracy,
            &mut self.devices.storage,
            &mut self.devices.fusion,
        );

        if let Some(outcome) = self.check_exit(now) {
            return outcome;
        }

        if self
            .state
            .power
            .check_screen_timeout(now, self.state.config.timeout)
        {
            self.screen_off();
        }

        self.refresh_display(now);
        self.sleep_if_idle();

        StepOutcome::Continue
    }

    /// Labels and state the menu renders from.
    pub fn menu_context(&self) -> MenuContext {
        MenuContext {
            recording_index: self.state.telemetry.recording_index(),
            wifi: self.state.wifi.status(&self.devices.wifi),
            ble: self.devices.ble.link(),
            mode: self.state.config.mode,
            timeout: self.state.config.timeout,
        }
    }

    /// Snapshot served by the remote status endpoint.
    pub fn status_document(&self) -> StatusDocument<'_> {
        StatusDocument::capture(
            &self.state.reading,
            &self.state.stats,
            &self.state.telemetry,
            self.devices.platform.now(),
        )
    }

    pub fn recordings(&mut self) -> Result<Vec<FileInfo>, StorageError> {
        status::list_recordings(&mut self.devices.storage)
    }

    /// Delete a recording on behalf of the remote endpoint. The file being
    /// recorded to is refused.
    pub fn delete_recording(&mut self, name: &str) -> Result<(), StorageError> {
        if let Some(active) = self.state.telemetry.destination() {
            if active.trim_start_matches('/') == name.trim_start_matches('/') {
                warn!("Refusing to delete active recording {}", active);
                return Err(StorageError::InvalidName);
            }
        }
        status::delete_recording(&mut self.devices.storage, name)
    }

    fn poll_inputs(&mut self, now: Instant) {
        let platform = &mut self.devices.platform;
        let button = platform.button_pressed();
        let touch = average_touch(|| platform.touch_read());

        if let Some(gesture) = self.state.inputs.poll(button, touch, now) {
            self.on_gesture(gesture, now);
        }
    }

    fn on_gesture(&mut self, gesture: Gesture, now: Instant) {
        if !self.state.power.accepts_input(now)
            || self.state.notice.is_some()
            || self.state.pending_exit.is_some()
        {
            debug!("Ignoring {:?}", gesture);
            return;
        }

        self.wake_ui(now);
        self.state.power.hold_awake(now, INPUT_GRACE);

        if let Some(command) = self.state.ui.handle(gesture) {
            self.run_command(command, now);
        }
        self.state.last_draw = None;
    }

    fn run_command(&mut self, command: UiCommand, now: Instant) {
        info!("Menu command {:?}", command);
        let notice = match command {
            UiCommand::ForceSave => {
                let outcome = self.state.calibration.maybe_save(
                    true,
                    now,
                    self.state.reading.accuracy,
                    &mut self.devices.storage,
                    &mut self.devices.fusion,
                );
                Some(if outcome.is_saved() {
                    NoticeKind::StateSaved
                } else {
                    NoticeKind::StateSkipped
                })
            }
            UiCommand::ToggleRecording => {
                self.toggle_recording(now);
                None
            }
            UiCommand::ToggleWifi => Some(self.state.wifi.toggle(now, &mut self.devices.wifi)),
            UiCommand::ToggleBle => Some(toggle_ble(&mut self.devices.ble)),
            UiCommand::CycleMode => {
                self.state.config.mode = self.state.config.mode.next();
                self.persist_config();
                self.apply_mode();
                None
            }
            UiCommand::CycleTimeout => {
                self.state.config.timeout = self.state.config.timeout.next();
                self.persist_config();
                Some(NoticeKind::TimeoutChanged(self.state.config.timeout))
            }
            UiCommand::Reboot => Some(self.exit_after(StepOutcome::Restart, NoticeKind::Rebooting, now)),
            UiCommand::PowerOff => {
                Some(self.exit_after(StepOutcome::PowerOff, NoticeKind::PoweringOff, now))
            }
            UiCommand::EraseCalibration => {
                if let Err(e) = self.state.calibration.erase(&mut self.devices.storage) {
                    error!("Failed to erase calibration state: {}", e);
                }
                Some(self.exit_after(StepOutcome::Restart, NoticeKind::DeletingState, now))
            }
        };

        if let Some(kind) = notice {
            self.state.notice = Some(Notice::new(kind, now));
            self.state.power.hold_awake(now, kind.duration());
        }
    }

    fn exit_after(&mut self, outcome: StepOutcome, kind: NoticeKind, now: Instant) -> NoticeKind {
        self.state.pending_exit = Some((outcome, now + kind.duration()));
        kind
    }

    fn toggle_recording(&mut self, now: Instant) {
        let telemetry = &mut self.state.telemetry;
        if !telemetry.is_recording() {
            if let Err(e) =
                telemetry.start_recording(&mut self.state.config, &mut self.devices.storage)
            {
                error!("Could not start recording: {}", e);
            }
            return;
        }

        if !telemetry.is_empty() {
            self.draw(now, true);
        }
        match self
            .state
            .telemetry
            .stop_recording(&mut self.devices.storage, &self.state.clock)
        {
            Ok(report) => info!("Final flush wrote {} entries", report.entries),
            Err(e) => warn!("Final flush failed: {}", e),
        }
    }

    fn persist_config(&mut self) {
        if let Err(e) = self.state.config.save(&mut self.devices.storage) {
            warn!("Failed to save config: {}", e);
        }
    }

    fn apply_mode(&mut self) {
        let result = self
            .state
            .modes
            .apply(self.state.config.mode, &mut self.devices.fusion);
        self.note_fusion_result(result.map(|_| ()));
    }

    fn note_fusion_result(&mut self, result: Result<(), FusionError>) {
        if let Err(e) = result {
            self.state.fusion_fault = Some(e);
        }
    }

    fn poll_fusion(&mut self) {
        let samples = match self.devices.fusion.poll() {
            Ok(samples) => samples,
            Err(e) => {
                if self.state.fusion_fault != Some(e) {
                    error!("Fusion engine fault: {}", e);
                }
                self.state.fusion_fault = Some(e);
                return;
            }
        };

        if !samples.is_empty() {
            self.state.fusion_fault = None;
        }
        for sample in &samples {
            self.ingest(sample);
        }
    }

    fn ingest(&mut self, sample: &FusionSample) {
        let now = self.devices.platform.now();
        let mode = self.state.config.mode;

        self.state.reading.apply(sample);
        self.state.stats.update(sample);
        self.state.power.note_sample(now);
        self.state.trend.push(&self.state.reading);

        if self.devices.ble.link() != BleLink::Off {
            self.devices
                .ble
                .publish(&BleReadings::from(&self.state.reading));
        }

        if self.state.telemetry.append_will_flush(mode) && self.state.power.is_screen_on() {
            self.draw(now, true);
        }
        let entry = LogEntry::from_reading(now, &self.state.reading);
        match self.state.telemetry.append(
            entry,
            mode,
            &mut self.devices.storage,
            &self.state.clock,
        ) {
            AppendOutcome::Flushed(Err(e)) => warn!("Recording batch lost: {}", e),
            AppendOutcome::Flushed(Ok(report)) => {
                debug!("Recording flushed {} bytes", report.bytes)
            }
            AppendOutcome::Buffered | AppendOutcome::NotRecording => {}
        }

        // Realtime refreshes the battery on every redraw instead.
        if mode != OperatingMode::Realtime {
            self.refresh_battery();
        }
    }

    fn refresh_battery(&mut self) {
        let mut reads = [0u32; BATTERY_ADC_SAMPLES];
        for read in reads.iter_mut() {
            *read = self.devices.platform.battery_adc_millivolts();
        }
        if let Some(volts) = cell_voltage(&reads) {
            self.state.reading.set_voltage(volts);
        }
    }

    /// Drop an expired notice and carry out a due restart or power-off.
    fn check_exit(&mut self, now: Instant) -> Option<StepOutcome> {
        if self.state.notice.is_some_and(|notice| notice.is_expired(now)) {
            self.state.notice = None;
            self.state.last_draw = None;
        }

        let (outcome, at) = self.state.pending_exit?;
        if now < at {
            return None;
        }

        if self.state.telemetry.is_recording() {
            if let Err(e) = self
                .state
                .telemetry
                .stop_recording(&mut self.devices.storage, &self.state.clock)
            {
                warn!("Recording not flushed before {:?}: {}", outcome, e);
            }
        }
        if outcome == StepOutcome::PowerOff {
            self.devices.display.set_power(false);
        }
        info!("Leaving control loop: {:?}", outcome);
        Some(outcome)
    }

    fn screen_off(&mut self) {
        self.devices.display.set_power(false);
        self.state.ui.on_screen_off();
        let result = self
            .state
            .modes
            .on_screen_off(self.state.config.mode, &mut self.devices.fusion);
        self.note_fusion_result(result);
    }

    fn wake_ui(&mut self, now: Instant) {
        if !self.state.power.wake_screen(now) {
            return;
        }
        self.devices.display.set_power(true);
        let result = self
            .state
            .modes
            .on_screen_on(self.state.config.mode, &mut self.devices.fusion);
        self.note_fusion_result(result);
        self.state.last_draw = None;
    }

    fn refresh_display(&mut self, now: Instant) {
        if !self.state.power.is_screen_on() {
            return;
        }
        let mode = self.state.config.mode;
        if let Some(last) = self.state.last_draw {
            if now.saturating_duration_since(last) < refresh_interval(mode) {
                return;
            }
        }

        if mode == OperatingMode::Realtime {
            self.refresh_battery();
        }
        self.draw(now, false);
    }

    fn draw(&mut self, now: Instant, flushing: bool) {
        let menu = self.menu_context();
        let state = &self.state;
        let frame = Frame {
            now,
            ui: &state.ui,
            reading: &state.reading,
            stats: &state.stats,
            config: &state.config,
            menu: &menu,
            trend: &state.trend,
            clock: &state.clock,
            save_age_minutes: state.calibration.minutes_since_save(now),
            log_fill_percent: state.telemetry.fill_percent(),
            flushing,
            notice: state.notice.map(|notice| notice.kind),
            fusion_fault: state.fusion_fault,
        };

        let Ok(()) = render(&frame, &mut self.framebuffer);
        if let Err(e) = self.framebuffer.flush(&mut self.devices.display) {
            warn!("Display flush failed: {:?}", e);
        }
        self.state.last_draw = Some(now);
    }

    fn sleep_conditions(&self) -> SleepConditions {
        let mode = self.state.config.mode;
        SleepConditions {
            wireless_busy: self.state.wifi.is_busy(&self.devices.wifi),
            screen: self.state.ui.screen(),
            button_held: self.state.inputs.button.is_held(),
            touch_in_progress: self.state.inputs.touch.is_held(),
            mode,
            sample_period: self.state.modes.sample_period(mode),
            ble: self.devices.ble.link(),
        }
    }

    /// Light-sleep until just before the next sample if nothing keeps the
    /// device awake. A touch wake that does not verify goes back to sleep for
    /// the rest of the planned interval.
    fn sleep_if_idle(&mut self) {
        let now = self.devices.platform.now();
        let conditions = self.sleep_conditions();
        let Some(mut plan) = self.state.power.plan_sleep(now, &conditions) else {
            return;
        };

        loop {
            debug!("Light sleep for {} ms", plan.duration.as_millis());
            let cause = self.devices.platform.light_sleep(&plan);

            let platform = &mut self.devices.platform;
            let outcome = self
                .state
                .power
                .resolve_wake(cause, || average_touch(|| platform.touch_read()));

            let now = self.devices.platform.now();
            match outcome {
                WakeOutcome::WakeUi => {
                    self.wake_ui(now);
                    self.state.power.hold_awake(now, WAKE_GRACE);
                    return;
                }
                WakeOutcome::Resume => return,
                WakeOutcome::FalseWake => match self.state.power.resume_plan(now, &plan) {
                    Some(rest) => plan = rest,
                    None => return,
                },
            }
        }
    }
}

/// Start the fusion engine on the primary address, falling back to the
/// secondary one.
fn begin_fusion<F: FusionEngine>(fusion: &mut F) -> Result<SensorAddress, AppError> {
    if let Err(e) = fusion.begin(SensorAddress::Primary) {
        warn!("Fusion engine not on primary address ({}), trying secondary", e);
        fusion.begin(SensorAddress::Secondary).map_err(|e| {
            error!("Fusion engine not found: {}", e);
            AppError::FusionInit(e)
        })?;
        return Ok(SensorAddress::Secondary);
    }
    Ok(SensorAddress::Primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    use crate::config::TimeoutPolicy;
    use crate::power::WakeCause;
    use crate::sensors::{Accuracy, Cadence};
    use crate::storage::CALIBRATION_FILE;
    use crate::storage::calibration::CALIBRATION_BLOB_LEN;
    use crate::testing::{FakeBle, FakeDisplay, FakeFusion, FakePlatform, FakeWifi, MemStorage};
    use crate::ui::UiScreen;

    type TestApp = App<FakePlatform, FakeFusion, MemStorage, FakeWifi, FakeBle, FakeDisplay>;

    fn devices() -> Devices<FakePlatform, FakeFusion, MemStorage, FakeWifi, FakeBle, FakeDisplay> {
        Devices {
            platform: FakePlatform::default(),
            fusion: FakeFusion::default(),
            storage: MemStorage::default(),
            wifi: FakeWifi::default(),
            ble: FakeBle::default(),
            display: FakeDisplay::default(),
        }
    }

    fn boot() -> TestApp {
        App::boot(devices()).unwrap()
    }

    fn press(app: &mut TestApp, held_ms: u64) {
        app.devices.platform.button = true;
        assert_eq!(app.step(), StepOutcome::Continue);
        app.devices.platform.advance(Duration::from_millis(held_ms));
        app.devices.platform.button = false;
        app.step();
    }

    fn tap(app: &mut TestApp) {
        press(app, 100);
    }

    fn hold(app: &mut TestApp) {
        press(app, 300);
    }

    fn sample(accuracy: Accuracy) -> FusionSample {
        FusionSample {
            temperature: 21.0,
            pressure: 100_900.0,
            humidity: 45.0,
            iaq: 60.0,
            co2: 650.0,
            accuracy,
        }
    }

    /// Boot, then let the boot grace run out and deliver one sample.
    fn settled(app: &mut TestApp) {
        app.devices.platform.advance(Duration::from_millis(2100));
        app.devices.fusion.queued.push_back(sample(Accuracy::LOW));
        app.step();
    }

    #[test]
    fn test_boot_falls_back_to_secondary_address() {
        let mut devs = devices();
        devs.fusion.dead_addresses = vec![SensorAddress::Primary];
        let app = App::boot(devs).unwrap();
        assert_eq!(app.devices.fusion.begun, Some(SensorAddress::Secondary));
        assert!(app.devices.display.powered);
        assert!(app.state.reading.voltage > 3.9);

        let mut devs = devices();
        devs.fusion.dead_addresses = vec![SensorAddress::Primary, SensorAddress::Secondary];
        assert!(matches!(App::boot(devs), Err(AppError::FusionInit(_))));
    }

    #[test]
    fn test_boot_restores_calibration_and_stored_mode() {
        let mut devs = devices();
        devs.storage.insert(CALIBRATION_FILE, &[7; CALIBRATION_BLOB_LEN]);
        let config = SystemConfig {
            mode: OperatingMode::Realtime,
            ..SystemConfig::default()
        };
        config.save(&mut devs.storage).unwrap();

        let app = App::boot(devs).unwrap();
        assert!(app.devices.fusion.restored.is_some());
        assert_eq!(app.state.config.mode, OperatingMode::Realtime);
        assert_eq!(
            app.devices.fusion.subscriptions.last().map(|s| s.cadence),
            Some(Cadence::Continuous)
        );
    }

    #[test]
    fn test_confirmed_reset_erases_state_and_restarts() {
        let mut devs = devices();
        devs.storage.insert(CALIBRATION_FILE, &[7; CALIBRATION_BLOB_LEN]);
        let mut app = App::boot(devs).unwrap();

        tap(&mut app);
        for _ in 0..8 {
            tap(&mut app);
        }
        assert_eq!(app.state.ui.selected(), 8);
        hold(&mut app);
        assert_eq!(app.state.ui.screen(), UiScreen::ConfirmReset);

        tap(&mut app);
        assert!(app.devices.storage.get(CALIBRATION_FILE).is_none());
        assert_eq!(
            app.state.notice.map(|n| n.kind),
            Some(NoticeKind::DeletingState)
        );

        assert_eq!(app.step(), StepOutcome::Continue);
        app.devices.platform.advance(Duration::from_millis(1000));
        assert_eq!(app.step(), StepOutcome::Restart);
    }

    #[test]
    fn test_cancelled_reset_keeps_state() {
        let mut devs = devices();
        devs.storage.insert(CALIBRATION_FILE, &[7; CALIBRATION_BLOB_LEN]);
        let mut app = App::boot(devs).unwrap();

        app.state.ui.handle(Gesture::Tap);
        for _ in 0..8 {
            app.state.ui.handle(Gesture::Tap);
        }
        app.state.ui.handle(Gesture::Hold);
        assert_eq!(app.state.ui.screen(), UiScreen::ConfirmReset);

        hold(&mut app);
        assert_eq!(app.state.ui.screen(), UiScreen::Menu);
        assert!(app.devices.storage.get(CALIBRATION_FILE).is_some());
        assert!(app.state.pending_exit.is_none());
    }

    #[test]
    fn test_menu_scrolls_with_selection() {
        let mut app = boot();
        tap(&mut app);
        for _ in 0..9 {
            tap(&mut app);
        }
        assert_eq!(app.state.ui.selected(), 9);
        assert_eq!(app.state.ui.scroll_offset(), 5);

        tap(&mut app);
        assert_eq!(app.state.ui.selected(), 10);
        assert_eq!(app.state.ui.scroll_offset(), 6);
    }

    #[test]
    fn test_sleep_ends_before_next_sample() {
        let mut app = boot();
        settled(&mut app);

        let period = app.state.modes.sample_period(OperatingMode::Normal);
        let next_sample = app.state.power.last_sample() + period;
        let plan = app.devices.platform.sleeps[0];
        assert!(plan.deadline < next_sample);
        assert_eq!(plan.duration, Duration::from_millis(2990));
        assert_eq!(app.devices.platform.clock, plan.deadline);
    }

    #[test]
    fn test_no_sleep_off_dashboard() {
        let mut app = boot();
        app.state.ui.handle(Gesture::Tap);
        settled(&mut app);
        assert!(app.devices.platform.sleeps.is_empty());
    }

    #[test]
    fn test_false_touch_wake_sleeps_again() {
        let mut app = boot();
        app.devices
            .platform
            .wakes
            .push_back((WakeCause::Touch, Duration::from_millis(1000)));
        settled(&mut app);

        let sleeps = &app.devices.platform.sleeps;
        assert_eq!(sleeps.len(), 2);
        assert_eq!(sleeps[1].deadline, sleeps[0].deadline);
        assert_eq!(sleeps[1].duration, Duration::from_millis(1990));
        assert_eq!(app.devices.platform.clock, sleeps[0].deadline);
    }

    #[test]
    fn test_peripheral_wake_resumes_loop_without_ui_wake() {
        let mut app = boot();
        app.devices
            .platform
            .wakes
            .push_back((WakeCause::Other, Duration::from_millis(1000)));
        settled(&mut app);

        let first = app.devices.platform.sleeps[0];
        assert_eq!(app.devices.platform.sleeps.len(), 1);
        assert_eq!(app.devices.platform.clock + Duration::from_millis(1990), first.deadline);

        // No wake grace was granted: the next iteration sleeps straight away.
        app.step();
        let sleeps = &app.devices.platform.sleeps;
        assert_eq!(sleeps.len(), 2);
        assert_eq!(sleeps[1].deadline, first.deadline);
        assert_eq!(sleeps[1].duration, Duration::from_millis(1990));
        assert_eq!(app.state.ui.screen(), UiScreen::Dashboard);
    }

    #[test]
    fn test_eco_screen_off_drops_to_slowest_cadence() {
        let mut devs = devices();
        let config = SystemConfig {
            mode: OperatingMode::Eco,
            timeout: TimeoutPolicy::Medium,
            next_log_index: 1,
        };
        config.save(&mut devs.storage).unwrap();
        let mut app = App::boot(devs).unwrap();
        let last_cadence =
            |app: &TestApp| app.devices.fusion.subscriptions.last().map(|s| s.cadence);
        assert_eq!(last_cadence(&app), Some(Cadence::LowPower));

        app.devices.platform.advance(Duration::from_secs(16));
        app.step();
        assert!(!app.state.power.is_screen_on());
        assert!(!app.devices.display.powered);
        assert_eq!(last_cadence(&app), Some(Cadence::UltraLowPower));

        tap(&mut app);
        assert!(app.state.power.is_screen_on());
        assert!(app.devices.display.powered);
        assert_eq!(last_cadence(&app), Some(Cadence::LowPower));
    }

    #[test]
    fn test_recording_toggle_writes_csv() {
        let mut app = boot();
        app.state.ui.handle(Gesture::Tap);
        for _ in 0..3 {
            app.state.ui.handle(Gesture::Tap);
        }
        hold(&mut app);
        assert_eq!(app.state.telemetry.recording_index(), Some(1));
        assert_eq!(app.menu_context().recording_index, Some(1));

        app.devices.fusion.queued.push_back(sample(Accuracy::LOW));
        app.devices.fusion.queued.push_back(sample(Accuracy::LOW));
        app.step();
        assert_eq!(app.state.telemetry.len(), 2);
        assert_eq!(app.devices.ble.published.len(), 0);

        app.state.ui.handle(Gesture::Tap);
        for _ in 0..3 {
            app.state.ui.handle(Gesture::Tap);
        }
        hold(&mut app);
        assert!(!app.state.telemetry.is_recording());

        let csv = app.devices.storage.get("/log_001.csv").unwrap();
        let text = core::str::from_utf8(csv).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(app.delete_recording("log_001.csv").is_ok());
        assert!(app.recordings().unwrap().is_empty());
    }

    #[test]
    fn test_force_save_needs_accuracy() {
        let mut app = boot();
        app.state.ui.handle(Gesture::Tap);
        app.state.ui.handle(Gesture::Tap);
        app.state.ui.handle(Gesture::Tap);
        hold(&mut app);
        assert_eq!(
            app.state.notice.map(|n| n.kind),
            Some(NoticeKind::StateSkipped)
        );
        assert!(app.devices.storage.get(CALIBRATION_FILE).is_none());

        // Gestures are swallowed while the notice is up.
        tap(&mut app);
        assert_eq!(app.state.ui.screen(), UiScreen::Dashboard);
    }

    #[test]
    fn test_power_off_turns_panel_off() {
        let mut app = boot();
        app.state.ui.handle(Gesture::Tap);
        for _ in 0..10 {
            app.state.ui.handle(Gesture::Tap);
        }
        hold(&mut app);
        assert_eq!(
            app.state.notice.map(|n| n.kind),
            Some(NoticeKind::PoweringOff)
        );
        app.devices.platform.advance(Duration::from_millis(1000));
        assert_eq!(app.step(), StepOutcome::PowerOff);
        assert!(!app.devices.display.powered);
    }

    #[test]
    fn test_fusion_fault_clears_on_next_sample() {
        let mut app = boot();
        app.devices.fusion.poll_error = Some(FusionError::Status(-1));
        app.step();
        assert_eq!(app.state.fusion_fault, Some(FusionError::Status(-1)));

        app.devices.fusion.queued.push_back(sample(Accuracy::HIGH));
        app.step();
        assert_eq!(app.state.fusion_fault, None);
        assert_eq!(app.status_document().acc, 3);
    }
}
