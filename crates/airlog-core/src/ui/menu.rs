//! Menu entries, their labels and the action each one triggers

use core::fmt::Write;

use heapless::String;

use super::UiScreen;
use crate::config::{OperatingMode, TimeoutPolicy};
use crate::connectivity::WifiStatus;
use crate::power::BleLink;

/// Rows visible at once.
pub const MENU_WINDOW: usize = 5;

pub const MENU_LABEL_LEN: usize = 24;

pub type MenuText = String<MENU_LABEL_LEN>;

/// Live state the dynamic labels are rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuContext {
    pub recording_index: Option<u32>,
    pub wifi: WifiStatus,
    pub ble: BleLink,
    pub mode: OperatingMode,
    pub timeout: TimeoutPolicy,
}

#[derive(Clone, Copy)]
pub enum MenuLabel {
    Static(&'static str),
    Dynamic(fn(&MenuContext) -> MenuText),
}

impl core::fmt::Debug for MenuLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Static(text) => write!(f, "Static({:?})", text),
            Self::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ShowGraphs,
    ShowStats,
    ForceSave,
    ToggleRecording,
    ToggleWifi,
    ToggleBle,
    CycleMode,
    CycleTimeout,
    ResetCalibration,
    Reboot,
    PowerOff,
    Exit,
}

/// Side effects the control loop carries out for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    ForceSave,
    ToggleRecording,
    ToggleWifi,
    ToggleBle,
    CycleMode,
    CycleTimeout,
    Reboot,
    PowerOff,
    /// Confirmed calibration reset: erase the blob and restart.
    EraseCalibration,
}

impl MenuAction {
    /// Screen shown once the action has been invoked.
    pub const fn screen_after(self) -> UiScreen {
        match self {
            Self::ShowGraphs => UiScreen::Graph,
            Self::ShowStats => UiScreen::Stats,
            Self::ResetCalibration => UiScreen::ConfirmReset,
            Self::CycleTimeout | Self::Reboot | Self::PowerOff => UiScreen::Menu,
            Self::ForceSave
            | Self::ToggleRecording
            | Self::ToggleWifi
            | Self::ToggleBle
            | Self::CycleMode
            | Self::Exit => UiScreen::Dashboard,
        }
    }

    /// Side effect of the action, `None` for pure navigation.
    pub const fn command(self) -> Option<UiCommand> {
        match self {
            Self::ForceSave => Some(UiCommand::ForceSave),
            Self::ToggleRecording => Some(UiCommand::ToggleRecording),
            Self::ToggleWifi => Some(UiCommand::ToggleWifi),
            Self::ToggleBle => Some(UiCommand::ToggleBle),
            Self::CycleMode => Some(UiCommand::CycleMode),
            Self::CycleTimeout => Some(UiCommand::CycleTimeout),
            Self::Reboot => Some(UiCommand::Reboot),
            Self::PowerOff => Some(UiCommand::PowerOff),
            Self::ShowGraphs | Self::ShowStats | Self::ResetCalibration | Self::Exit => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MenuEntry {
    pub label: MenuLabel,
    pub action: MenuAction,
}

impl MenuEntry {
    const fn fixed(text: &'static str, action: MenuAction) -> Self {
        Self {
            label: MenuLabel::Static(text),
            action,
        }
    }

    const fn dynamic(label: fn(&MenuContext) -> MenuText, action: MenuAction) -> Self {
        Self {
            label: MenuLabel::Dynamic(label),
            action,
        }
    }

    pub fn text(&self, context: &MenuContext) -> MenuText {
        match self.label {
            MenuLabel::Static(text) => {
                let mut out = MenuText::new();
                out.push_str(text).ok();
                out
            }
            MenuLabel::Dynamic(label) => label(context),
        }
    }
}

pub const MENU: [MenuEntry; 12] = [
    MenuEntry::fixed("Show Graphs", MenuAction::ShowGraphs),
    MenuEntry::fixed("Show Stats", MenuAction::ShowStats),
    MenuEntry::fixed("Force Save", MenuAction::ForceSave),
    MenuEntry::dynamic(record_label, MenuAction::ToggleRecording),
    MenuEntry::dynamic(wifi_label, MenuAction::ToggleWifi),
    MenuEntry::dynamic(ble_label, MenuAction::ToggleBle),
    MenuEntry::dynamic(mode_label, MenuAction::CycleMode),
    MenuEntry::dynamic(timeout_label, MenuAction::CycleTimeout),
    MenuEntry::fixed("Reset Calibration", MenuAction::ResetCalibration),
    MenuEntry::fixed("Reboot", MenuAction::Reboot),
    MenuEntry::fixed("Power Off", MenuAction::PowerOff),
    MenuEntry::fixed("Exit", MenuAction::Exit),
];

fn record_label(context: &MenuContext) -> MenuText {
    let mut out = MenuText::new();
    match context.recording_index {
        Some(index) => write!(out, "Stop Rec ({})", index).ok(),
        None => out.push_str("Start Rec").ok(),
    };
    out
}

fn wifi_label(context: &MenuContext) -> MenuText {
    let mut out = MenuText::new();
    match context.wifi {
        WifiStatus::Connected(ip) => write!(out, "WiFi: {}", ip).ok(),
        WifiStatus::Connecting => out.push_str("WiFi: ...").ok(),
        WifiStatus::Off => out.push_str("WiFi: OFF").ok(),
    };
    out
}

fn ble_label(context: &MenuContext) -> MenuText {
    let text = match context.ble {
        BleLink::Connected => "BLE: Conn",
        BleLink::Advertising => "BLE: Adv",
        BleLink::Off => "BLE: OFF",
    };
    let mut out = MenuText::new();
    out.push_str(text).ok();
    out
}

fn mode_label(context: &MenuContext) -> MenuText {
    let mut out = MenuText::new();
    write!(out, "Mode: {}", context.mode.label()).ok();
    out
}

fn timeout_label(context: &MenuContext) -> MenuText {
    let mut out = MenuText::new();
    write!(out, "TOut: {}", context.timeout.label()).ok();
    out
}
