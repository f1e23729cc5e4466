//! Display: the panel seam, the RAM framebuffer and the screen renderer
//!
//! The core draws a complete [`Frame`] into a [`FrameBuffer`] on every refresh
//! tick and pushes the changed region to the panel. The renderer holds no
//! state of its own.

pub mod framebuffer;
pub mod renderer;

pub use framebuffer::FrameBuffer;
pub use renderer::render;

use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::DrawTarget;

use crate::config::{OperatingMode, SystemConfig};
use crate::error::FusionError;
use crate::sensors::{RunningStats, SensorReading};
use crate::trend::TrendBuffers;
use crate::ui::{MenuContext, NoticeKind, UiStateMachine};
use crate::wall_clock::WallClock;

pub const DISPLAY_WIDTH_PX: u32 = 128;
pub const DISPLAY_HEIGHT_PX: u32 = 64;

/// Redraw interval while the screen is on.
pub const fn refresh_interval(mode: OperatingMode) -> Duration {
    match mode {
        OperatingMode::Realtime => Duration::from_millis(33),
        _ => Duration::from_millis(100),
    }
}

/// The monochrome panel.
pub trait Display: DrawTarget<Color = BinaryColor> {
    /// Switch the panel on or off. Contents survive a power cycle.
    fn set_power(&mut self, on: bool);
}

/// Everything one refresh draws from.
pub struct Frame<'a> {
    pub now: Instant,
    pub ui: &'a UiStateMachine,
    pub reading: &'a SensorReading,
    pub stats: &'a RunningStats,
    pub config: &'a SystemConfig,
    pub menu: &'a MenuContext,
    pub trend: &'a TrendBuffers,
    pub clock: &'a WallClock,
    /// Minutes since the calibration state was last saved or restored.
    pub save_age_minutes: Option<u64>,
    /// Telemetry buffer fill in percent.
    pub log_fill_percent: u8,
    /// A telemetry flush is being written.
    pub flushing: bool,
    pub notice: Option<NoticeKind>,
    /// Last status reported by a failing fusion engine.
    pub fusion_fault: Option<FusionError>,
}
