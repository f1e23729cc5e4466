//! RAM framebuffer with change tracking.
//!
//! Pixels are packed in the controller's page layout: each byte holds eight
//! vertically stacked pixels, 128 bytes per 8-row page. Screens draw here and
//! only the bounding box of changed pixels is pushed to the panel, which
//! keeps the I2C transfer short on a mostly static dashboard.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{ContainsPoint, PointsIter, Rectangle};
use log::debug;

use super::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};

const WIDTH: usize = DISPLAY_WIDTH_PX as usize;
const HEIGHT: usize = DISPLAY_HEIGHT_PX as usize;
const PAGES: usize = HEIGHT / 8;

/// 128x64 monochrome framebuffer implementing `DrawTarget<Color = BinaryColor>`.
pub struct FrameBuffer {
    pages: [[u8; WIDTH]; PAGES],
    /// Inclusive corners of the changed region.
    dirty: Option<(Point, Point)>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// A cleared framebuffer.
    pub const fn new() -> Self {
        Self {
            pages: [[0; WIDTH]; PAGES],
            dirty: None,
        }
    }

    /// Color of one pixel; out-of-range coordinates read as off.
    pub fn pixel(&self, x: usize, y: usize) -> BinaryColor {
        if x >= WIDTH || y >= HEIGHT {
            return BinaryColor::Off;
        }
        if self.pages[y / 8][x] & (1 << (y % 8)) != 0 {
            BinaryColor::On
        } else {
            BinaryColor::Off
        }
    }

    /// True if any pixel changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: BinaryColor) {
        let byte = &mut self.pages[y / 8][x];
        let mask = 1 << (y % 8);
        let updated = if color.is_on() { *byte | mask } else { *byte & !mask };
        if updated == *byte {
            return;
        }
        *byte = updated;

        let p = Point::new(x as i32, y as i32);
        self.dirty = Some(match self.dirty {
            Some((min, max)) => (min.component_min(p), max.component_max(p)),
            None => (p, p),
        });
    }

    /// Push the dirty region to the panel and reset the dirty state.
    ///
    /// No-op if nothing changed.
    pub fn flush<D>(&mut self, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let Some((min, max)) = self.dirty.take() else {
            return Ok(());
        };
        let area = Rectangle::with_corners(min, max);
        debug!(
            "Flushing {}x{} dirty region at ({}, {})",
            area.size.width, area.size.height, min.x, min.y
        );

        let this = &*self;
        let colors = area.points().map(|p| this.pixel(p.x as usize, p.y as usize));
        display.fill_contiguous(&area, colors)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        for Pixel(p, color) in pixels {
            if bounds.contains(p) {
                self.set_pixel(p.x as usize, p.y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let clipped = area.intersection(&self.bounding_box());
        for p in clipped.points() {
            self.set_pixel(p.x as usize, p.y as usize, color);
        }
        Ok(())
    }
}
