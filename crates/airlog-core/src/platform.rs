//! Board services the control loop needs besides its collaborators

use embassy_time::Instant;

use crate::power::{SleepPlan, WakeCause};

/// Clock, watchdog, raw inputs, battery ADC and the sleep controller.
pub trait Platform {
    /// Monotonic time since boot.
    fn now(&self) -> Instant;

    /// Reset the hardware watchdog. Called once per loop iteration.
    fn feed_watchdog(&mut self);

    /// Level of the select button, `true` while pressed.
    fn button_pressed(&mut self) -> bool;

    /// One raw touch-pad reading; lower means touched.
    fn touch_read(&mut self) -> u16;

    /// One battery ADC reading in millivolts, before the divider.
    fn battery_adc_millivolts(&mut self) -> u32;

    /// Arm the button edge, the touch pad at `plan.touch_threshold` and a
    /// timer for `plan.duration`, then halt until one fires.
    fn light_sleep(&mut self, plan: &SleepPlan) -> WakeCause;
}

/// What the binary should do after a loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Reset the chip.
    Restart,
    /// Panel is off; enter deep sleep with no wake source.
    PowerOff,
}
