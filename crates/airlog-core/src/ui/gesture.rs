//! Button and touch-pad gesture detection

use embassy_time::{Duration, Instant};

/// Averaged touch reading below this value counts as a touch.
pub const TOUCH_THRESHOLD: u16 = 75;

/// Raw reads averaged per touch sample.
pub const TOUCH_SAMPLES: usize = 4;

/// Presses this short or shorter are contact bounce.
pub const BOUNCE: Duration = Duration::from_millis(50);

/// Presses longer than this are holds.
pub const HOLD: Duration = Duration::from_millis(200);

/// What a completed press means to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Tap,
    /// Long press, reported on release.
    Hold,
}

/// Average [`TOUCH_SAMPLES`] consecutive raw touch reads.
pub fn average_touch(mut read: impl FnMut() -> u16) -> u16 {
    let sum: u32 = (0..TOUCH_SAMPLES).map(|_| u32::from(read())).sum();
    (sum / TOUCH_SAMPLES as u32) as u16
}

pub fn is_touched(level: u16) -> bool {
    level < TOUCH_THRESHOLD
}

/// Turns a sampled press level into gestures on release.
#[derive(Debug, Clone, Copy, Default)]
pub struct PressTracker {
    pressed_since: Option<Instant>,
}

impl PressTracker {
    pub const fn new() -> Self {
        Self { pressed_since: None }
    }

    /// True between press and release.
    pub fn is_held(&self) -> bool {
        self.pressed_since.is_some()
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<Gesture> {
        match (pressed, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now);
                None
            }
            (false, Some(since)) => {
                self.pressed_since = None;
                let held = now.saturating_duration_since(since);
                if held <= BOUNCE {
                    None
                } else if held > HOLD {
                    Some(Gesture::Hold)
                } else {
                    Some(Gesture::Tap)
                }
            }
            _ => None,
        }
    }
}

/// Both input channels. The button wins if both complete on the same poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inputs {
    pub button: PressTracker,
    pub touch: PressTracker,
}

impl Inputs {
    pub fn poll(&mut self, button_pressed: bool, touch_level: u16, now: Instant) -> Option<Gesture> {
        let button = self.button.update(button_pressed, now);
        let touch = self.touch.update(is_touched(touch_level), now);
        button.or(touch)
    }
}
