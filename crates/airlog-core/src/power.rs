//! Adaptive power and sleep scheduler
//!
//! Once per loop iteration the scheduler decides whether the screen times out
//! and whether the device may enter light sleep until shortly before the next
//! fusion sample is due. Sleep is refused while anything needs the CPU awake:
//! a wireless session, a navigation screen, a recent input, a held button, an
//! ongoing touch, or Realtime mode.
//!
//! Three wake sources are armed for every sleep: the select button (edge), the
//! touch pad (threshold) and a timer for the planned duration. Touch pads are
//! prone to spurious wakes, so a touch wake is verified by re-sampling the pad
//! before the UI is woken.

use embassy_time::{Duration, Instant};
use log::debug;

use crate::config::{OperatingMode, TimeoutPolicy};
use crate::ui::UiScreen;
use crate::ui::gesture::TOUCH_THRESHOLD;

/// Sleeps shorter than this are not worth the wake-up cost.
pub const MIN_SLEEP: Duration = Duration::from_millis(200);

/// Sleep ends this long before the next sample is due.
pub const SLEEP_GUARD: Duration = Duration::from_millis(10);

/// Longest sleep while a BLE central is connected.
pub const BLE_CONNECTED_MAX_SLEEP: Duration = Duration::from_millis(50);

/// Longest sleep while BLE is advertising without a connection.
pub const BLE_ADVERTISING_MAX_SLEEP: Duration = Duration::from_millis(500);

/// Stay-awake window after an accepted input.
pub const INPUT_GRACE: Duration = Duration::from_millis(1000);

/// Stay-awake window after a button or verified touch wake.
pub const WAKE_GRACE: Duration = Duration::from_millis(200);

/// Stay-awake window after boot.
pub const BOOT_GRACE: Duration = Duration::from_millis(2000);

/// Inputs are ignored for this long after the screen turns on, so the press
/// that woke the device does not also act on the UI.
pub const WAKE_DEBOUNCE: Duration = Duration::from_millis(500);

/// State of the BLE peripheral as far as sleep is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BleLink {
    #[default]
    Off,
    Advertising,
    Connected,
}

/// Everything outside the scheduler that bears on sleep eligibility.
#[derive(Debug, Clone, Copy)]
pub struct SleepConditions {
    /// Wi-Fi connected or a connection attempt pending.
    pub wireless_busy: bool,
    pub screen: UiScreen,
    pub button_held: bool,
    pub touch_in_progress: bool,
    pub mode: OperatingMode,
    /// Interval between fusion samples at the active cadence.
    pub sample_period: Duration,
    pub ble: BleLink,
}

/// Why the device stays awake this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepBlocker {
    Wireless,
    Screen(UiScreen),
    Grace,
    ButtonHeld,
    Touching,
    Realtime,
    /// The next sample is too close (or already overdue).
    SampleDue,
}

/// A light-sleep request for the platform.
///
/// The platform arms the button edge, the touch pad at `touch_threshold` and
/// a timer for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    /// Instant at which the timer fires.
    pub deadline: Instant,
    pub touch_threshold: u16,
}

/// Which armed source ended a light sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    Button,
    Touch,
    Timer,
    /// Anything else (e.g. a peripheral interrupt); treated like a timer.
    Other,
}

/// What the control loop should do after waking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// A user woke the device: wake the UI.
    WakeUi,
    /// Scheduled wake: carry on with the loop.
    Resume,
    /// The touch wake did not verify: go back to sleep.
    FalseWake,
}

/// Screen duty cycle and sleep bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct PowerScheduler {
    screen_on: bool,
    last_activity: Instant,
    stay_awake_until: Instant,
    ignore_input_until: Instant,
    last_sample: Instant,
}

impl PowerScheduler {
    pub fn new(now: Instant) -> Self {
        Self {
            screen_on: true,
            last_activity: now,
            stay_awake_until: now + BOOT_GRACE,
            ignore_input_until: now,
            last_sample: now,
        }
    }

    pub fn is_screen_on(&self) -> bool {
        self.screen_on
    }

    /// False while the post-wake debounce window is open.
    pub fn accepts_input(&self, now: Instant) -> bool {
        now >= self.ignore_input_until
    }

    /// Register user activity and turn the screen on.
    ///
    /// Returns `true` if the screen was off, in which case inputs are
    /// suppressed for [`WAKE_DEBOUNCE`].
    pub fn wake_screen(&mut self, now: Instant) -> bool {
        self.last_activity = now;
        if self.screen_on {
            return false;
        }
        self.screen_on = true;
        self.ignore_input_until = now + WAKE_DEBOUNCE;
        debug!("Screen on");
        true
    }

    /// Keep the CPU out of sleep for `grace` from `now`.
    pub fn hold_awake(&mut self, now: Instant, grace: Duration) {
        self.stay_awake_until = now + grace;
    }

    /// Record the arrival of a fusion sample; sleep is planned around it.
    pub fn note_sample(&mut self, now: Instant) {
        self.last_sample = now;
    }

    pub fn last_sample(&self) -> Instant {
        self.last_sample
    }

    /// Turn the screen off once the inactivity timeout is exceeded.
    ///
    /// Returns `true` on the iteration the screen goes dark.
    pub fn check_screen_timeout(&mut self, now: Instant, policy: TimeoutPolicy) -> bool {
        if self.screen_on && now.saturating_duration_since(self.last_activity) > policy.duration() {
            self.screen_on = false;
            debug!("Screen off after {:?} of inactivity", policy.duration());
            return true;
        }
        false
    }

    /// First reason, if any, that forbids sleeping right now.
    pub fn sleep_blocker(&self, now: Instant, conditions: &SleepConditions) -> Option<SleepBlocker> {
        if conditions.wireless_busy {
            return Some(SleepBlocker::Wireless);
        }
        if conditions.screen != UiScreen::Dashboard {
            return Some(SleepBlocker::Screen(conditions.screen));
        }
        if now < self.stay_awake_until {
            return Some(SleepBlocker::Grace);
        }
        if conditions.button_held {
            return Some(SleepBlocker::ButtonHeld);
        }
        if conditions.touch_in_progress {
            return Some(SleepBlocker::Touching);
        }
        if conditions.mode == OperatingMode::Realtime {
            return Some(SleepBlocker::Realtime);
        }
        None
    }

    /// Plan a light sleep, or `None` if the device must stay awake.
    ///
    /// The sleep ends [`SLEEP_GUARD`] before the next sample is due and is
    /// further capped while BLE is active.
    pub fn plan_sleep(&self, now: Instant, conditions: &SleepConditions) -> Option<SleepPlan> {
        if self.sleep_blocker(now, conditions).is_some() {
            return None;
        }

        let next_sample = self.last_sample + conditions.sample_period;
        let remaining = next_sample.checked_duration_since(now)?;
        if remaining <= MIN_SLEEP || remaining > conditions.sample_period {
            return None;
        }

        let mut duration = remaining - SLEEP_GUARD;
        let cap = match conditions.ble {
            BleLink::Off => None,
            BleLink::Advertising => Some(BLE_ADVERTISING_MAX_SLEEP),
            BleLink::Connected => Some(BLE_CONNECTED_MAX_SLEEP),
        };
        if let Some(cap) = cap {
            duration = duration.min(cap);
        }

        Some(SleepPlan {
            duration,
            deadline: now + duration,
            touch_threshold: TOUCH_THRESHOLD,
        })
    }

    /// Re-plan the rest of an interrupted sleep, if enough of it is left.
    pub fn resume_plan(&self, now: Instant, interrupted: &SleepPlan) -> Option<SleepPlan> {
        let remaining = interrupted.deadline.checked_duration_since(now)?;
        (remaining > MIN_SLEEP).then_some(SleepPlan {
            duration: remaining,
            deadline: interrupted.deadline,
            touch_threshold: interrupted.touch_threshold,
        })
    }

    /// Decide what a wake means. `verify_touch` returns the averaged touch-pad
    /// reading and is only consulted for touch wakes.
    pub fn resolve_wake(&self, cause: WakeCause, verify_touch: impl FnOnce() -> u16) -> WakeOutcome {
        match cause {
            WakeCause::Button => WakeOutcome::WakeUi,
            WakeCause::Touch => {
                let level = verify_touch();
                if level < TOUCH_THRESHOLD {
                    WakeOutcome::WakeUi
                } else {
                    debug!("False touch wake (level {})", level);
                    WakeOutcome::FalseWake
                }
            }
            WakeCause::Timer | WakeCause::Other => WakeOutcome::Resume,
        }
    }
}
