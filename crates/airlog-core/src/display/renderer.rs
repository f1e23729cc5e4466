//! Screen drawing for the 128x64 panel
//!
//! Every screen is redrawn from scratch each tick. Layout uses the 6x10 mono
//! font: a 10 px header row, a rule at y=10, then content rows.

use core::fmt::Write;

use embedded_graphics::mono_font::{MonoTextStyle, ascii::FONT_6X10};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use heapless::String;

use super::{DISPLAY_WIDTH_PX, Frame};
use crate::connectivity::WifiStatus;
use crate::power::BleLink;
use crate::trend::Metric;
use crate::ui::{MENU, MENU_WINDOW, NoticeKind, UiScreen};

const HEADER_RULE_Y: i32 = 10;

/// Graph plot area: x from `GRAPH_X_START`, y between `GRAPH_TOP` and `GRAPH_BOTTOM`.
const GRAPH_X_START: i32 = 26;
const GRAPH_TOP: i32 = 20;
const GRAPH_BOTTOM: i32 = 60;

type Line32 = String<32>;

/// Draw one complete frame.
pub fn render<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target.clear(BinaryColor::Off)?;

    if let Some(kind) = frame.notice {
        return draw_notice(kind, target);
    }

    match frame.ui.screen() {
        UiScreen::Dashboard if frame.fusion_fault.is_some() => draw_fault(frame, target)?,
        UiScreen::Dashboard => draw_dashboard(frame, target)?,
        UiScreen::Menu => draw_menu(frame, target)?,
        UiScreen::Graph => draw_graph(frame, target)?,
        UiScreen::Stats => draw_stats(frame, target)?,
        UiScreen::ConfirmReset => draw_confirmation(target)?,
    }

    if frame.flushing && frame.ui.screen() != UiScreen::Menu {
        draw_saving_overlay(target)?;
    }
    Ok(())
}

fn text<D>(target: &mut D, s: &str, x: i32, y: i32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    Text::with_baseline(s, Point::new(x, y), style, Baseline::Top).draw(target)?;
    Ok(())
}

fn line<D>(target: &mut D, from: (i32, i32), to: (i32, i32)) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    Line::new(Point::new(from.0, from.1), Point::new(to.0, to.1))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(target)
}

fn header_rule<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    line(target, (0, HEADER_RULE_Y), (DISPLAY_WIDTH_PX as i32 - 1, HEADER_RULE_Y))
}

fn draw_notice<D>(kind: NoticeKind, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let lines = kind.lines();
    // Single-line notices sit mid-screen, reports start at the top.
    let top = if lines.len() == 1 { 25 } else { 0 };
    for (i, s) in lines.iter().enumerate() {
        text(target, s, 0, top + i as i32 * 10)?;
    }
    Ok(())
}

fn draw_fault<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "ERR!", 0, 0)?;
    let mut s = Line32::new();
    if let Some(fault) = frame.fusion_fault {
        write!(s, "{}", fault).ok();
    }
    text(target, &s, 0, 10)
}

fn draw_dashboard<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let reading = frame.reading;
    let mut s = Line32::new();

    write!(s, "IAQ:{}", reading.iaq as i32).ok();
    text(target, &s, 0, 0)?;

    s.clear();
    let synced = frame.clock.is_synced();
    if synced {
        frame
            .clock
            .write_clock(frame.now, frame.stats.uptime(frame.now), &mut s);
        text(target, &s, 50, 0)?;
    } else {
        write!(s, "{:.2}V", reading.voltage).ok();
        text(target, &s, 50, 0)?;
    }

    draw_status_icons(frame, target)?;
    header_rule(target)?;

    let rows: [(&str, f32, usize, &str); 4] = [
        ("T", reading.temperature, 2, " C"),
        ("H", reading.humidity, 2, " %"),
        ("P", reading.pressure, 2, " Pa"),
        ("CO2", reading.co2, 0, " ppm"),
    ];
    for (i, (label, value, precision, unit)) in rows.iter().enumerate() {
        s.clear();
        write!(s, "{}: {:.*}{}", label, *precision, value, unit).ok();
        text(target, &s, 0, 12 + i as i32 * 10)?;
    }

    text(target, frame.config.mode.short_label(), 0, 54)?;

    s.clear();
    if synced {
        write!(s, "{:.2}V", reading.voltage).ok();
    } else {
        write!(s, "{}%", reading.battery_percent).ok();
    }
    text(target, &s, 35, 54)?;

    s.clear();
    write!(s, "Acc:{}", reading.accuracy.grade()).ok();
    text(target, &s, 75, 54)?;

    if frame.save_age_minutes.is_some() {
        text(target, "S", 120, 54)?;
    }
    Ok(())
}

/// Status icons, right to left from the top corner.
fn draw_status_icons<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let fill = PrimitiveStyle::with_fill(BinaryColor::On);
    let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);
    let mut x = 122;

    if frame.menu.recording_index.is_some() {
        Circle::new(Point::new(x - 1, 1), 6).into_styled(fill).draw(target)?;
        x -= 10;
    }

    match frame.menu.wifi {
        WifiStatus::Connected(_) => {
            for bar in 0..3 {
                line(target, (x + bar * 2, 6), (x + bar * 2, 4 - bar * 2))?;
            }
            x -= 10;
        }
        WifiStatus::Connecting => {
            Circle::new(Point::new(x + 1, 1), 5).into_styled(stroke).draw(target)?;
            x -= 10;
        }
        WifiStatus::Off => {}
    }

    if frame.menu.ble != BleLink::Off {
        line(target, (x, 1), (x + 4, 5))?;
        line(target, (x + 4, 5), (x + 2, 7))?;
        line(target, (x + 2, 7), (x + 2, 0))?;
        line(target, (x + 2, 0), (x + 4, 2))?;
        line(target, (x + 4, 2), (x, 6))?;
        if frame.menu.ble == BleLink::Connected {
            Rectangle::new(Point::new(x + 6, 6), Size::new(2, 2))
                .into_styled(fill)
                .draw(target)?;
        }
    }
    Ok(())
}

fn draw_menu<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "-- MENU --", 0, 0)?;

    let mut s = Line32::new();
    match frame.save_age_minutes {
        Some(minutes) => write!(s, "S:{}m ", minutes).ok(),
        None => write!(s, "S:-- ").ok(),
    };
    write!(s, "B:{}%", frame.log_fill_percent).ok();
    text(target, &s, 64, 0)?;
    header_rule(target)?;

    let offset = frame.ui.scroll_offset();
    let visible = MENU.iter().enumerate().skip(offset).take(MENU_WINDOW);
    for (row, (index, entry)) in visible.enumerate() {
        s.clear();
        let marker = if index == frame.ui.selected() { "> " } else { "  " };
        write!(s, "{}{}", marker, entry.text(frame.menu)).ok();
        text(target, &s, 0, 13 + row as i32 * 10)?;
    }
    Ok(())
}

fn draw_graph<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let metric = frame.ui.metric();
    let mut s = Line32::new();
    write!(
        s,
        "{} {}{}",
        metric.label(),
        metric.value(frame.reading) as i32,
        metric.unit()
    )
    .ok();
    text(target, &s, 0, 0)?;

    s.clear();
    write!(s, "B:{}%", frame.log_fill_percent).ok();
    text(target, &s, 92, 0)?;
    header_rule(target)?;

    let Some(scale) = frame.trend.scale(metric) else {
        return text(target, "No Data", 10, 30);
    };

    s.clear();
    write!(s, "{}", scale.max as i32).ok();
    text(target, &s, 0, GRAPH_TOP - 6)?;
    s.clear();
    write!(s, "{}", scale.min as i32).ok();
    text(target, &s, 0, GRAPH_BOTTOM - 8)?;

    draw_series(frame, metric, scale.min, scale.span(), target)
}

fn draw_series<D>(
    frame: &Frame<'_>,
    metric: Metric,
    min: f32,
    span: f32,
    target: &mut D,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let height = (GRAPH_BOTTOM - GRAPH_TOP) as f32;
    let to_y = |v: f32| {
        let y = GRAPH_BOTTOM - ((v - min) / span * height) as i32;
        y.clamp(GRAPH_TOP, GRAPH_BOTTOM)
    };

    let mut previous: Option<i32> = None;
    for (x, value) in frame.trend.iter(metric).enumerate() {
        let y = to_y(value);
        let x = GRAPH_X_START + x as i32;
        if let Some(prev_y) = previous {
            line(target, (x - 1, prev_y), (x, y))?;
        }
        previous = Some(y);
    }
    Ok(())
}

fn draw_stats<D>(frame: &Frame<'_>, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "-- STATS --", 0, 0)?;
    header_rule(target)?;

    let uptime = frame.stats.uptime(frame.now).as_secs();
    let mut s = Line32::new();
    write!(s, "Up: {}h {}m", uptime / 3600, (uptime % 3600) / 60).ok();
    text(target, &s, 0, 13)?;

    s.clear();
    match frame.stats.max_temperature {
        Some(max) => write!(s, "Max T: {:.2}", max).ok(),
        None => write!(s, "Max T: --").ok(),
    };
    text(target, &s, 0, 25)?;

    s.clear();
    write!(s, "Max CO2: {}", frame.stats.max_co2 as i32).ok();
    text(target, &s, 0, 37)?;

    s.clear();
    write!(s, "V:{:.2}", frame.reading.voltage).ok();
    text(target, &s, 0, 51)
}

fn draw_confirmation<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    text(target, "RESET CALIBRATION?", 0, 0)?;
    header_rule(target)?;
    text(target, "Click: YES (Reboot)", 0, 25)?;
    text(target, "Hold: NO (Cancel)", 0, 45)
}

fn draw_saving_overlay<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let area = Rectangle::new(Point::new(10, 50), Size::new(108, 14));
    area.into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
        .draw(target)?;
    area.into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(target)?;
    text(target, "SAVING CSV...", 15, 52)
}
