//! Operating-mode controller
//!
//! Maps the operating mode (and, in Eco, whether the screen is on) onto the
//! fusion engine subscription and the sample period the sleep scheduler plans
//! around.
//!
//! | Mode     | Screen | Cadence           |
//! |----------|--------|-------------------|
//! | Realtime | any    | continuous (1 Hz) |
//! | Normal   | any    | low power (3 s)   |
//! | Eco      | on     | low power (3 s)   |
//! | Eco      | off    | ultra low (300 s) |

use embassy_time::Duration;
use log::{info, warn};

use crate::config::OperatingMode;
use crate::error::FusionError;
use crate::sensors::{ALL_OUTPUTS, Cadence, FusionEngine, Subscription};

/// Pure mapping from mode and screen state to a subscription.
pub fn subscription_for(mode: OperatingMode, screen_on: bool) -> Subscription {
    let cadence = match (mode, screen_on) {
        (OperatingMode::Realtime, _) => Cadence::Continuous,
        (OperatingMode::Normal, _) | (OperatingMode::Eco, true) => Cadence::LowPower,
        (OperatingMode::Eco, false) => Cadence::UltraLowPower,
    };
    Subscription {
        outputs: &ALL_OUTPUTS,
        cadence,
    }
}

/// Tracks the Eco screen-off state and pushes subscriptions to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeController {
    eco_screen_off: bool,
    active: Option<Cadence>,
}

impl ModeController {
    pub const fn new() -> Self {
        Self {
            eco_screen_off: false,
            active: None,
        }
    }

    /// True while Eco mode runs at the screen-off cadence.
    #[cfg(test)]
    pub(crate) fn eco_screen_off(&self) -> bool {
        self.eco_screen_off
    }

    /// Cadence most recently accepted by the engine.
    #[cfg(test)]
    pub(crate) fn active_cadence(&self) -> Option<Cadence> {
        self.active
    }

    /// Subscription implied by the current state.
    pub fn subscription(&self, mode: OperatingMode) -> Subscription {
        subscription_for(mode, !(mode == OperatingMode::Eco && self.eco_screen_off))
    }

    /// Interval between samples the sleep scheduler should expect.
    pub fn sample_period(&self, mode: OperatingMode) -> Duration {
        self.subscription(mode).cadence.period()
    }

    /// Issue the subscription for `mode` to the engine.
    pub fn apply<F: FusionEngine>(
        &mut self,
        mode: OperatingMode,
        fusion: &mut F,
    ) -> Result<Subscription, FusionError> {
        if mode != OperatingMode::Eco {
            self.eco_screen_off = false;
        }
        let subscription = self.subscription(mode);
        match fusion.set_subscription(&subscription) {
            Ok(()) => {
                if self.active != Some(subscription.cadence) {
                    info!(
                        "Mode {:?}: cadence {:?} ({} Hz)",
                        mode,
                        subscription.cadence,
                        subscription.cadence.rate_hz()
                    );
                }
                self.active = Some(subscription.cadence);
                Ok(subscription)
            }
            Err(e) => {
                warn!("Fusion engine refused subscription: {}", e);
                Err(e)
            }
        }
    }

    /// Screen went dark. Only Eco reacts, by dropping to the coarsest cadence.
    pub fn on_screen_off<F: FusionEngine>(
        &mut self,
        mode: OperatingMode,
        fusion: &mut F,
    ) -> Result<(), FusionError> {
        if mode == OperatingMode::Eco && !self.eco_screen_off {
            self.eco_screen_off = true;
            self.apply(mode, fusion)?;
        }
        Ok(())
    }

    /// Screen came back on. Eco returns to the low-power cadence.
    pub fn on_screen_on<F: FusionEngine>(
        &mut self,
        mode: OperatingMode,
        fusion: &mut F,
    ) -> Result<(), FusionError> {
        if mode == OperatingMode::Eco && self.eco_screen_off {
            self.eco_screen_off = false;
            self.apply(mode, fusion)?;
        }
        Ok(())
    }
}
