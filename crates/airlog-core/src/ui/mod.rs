//! UI navigation state machine
//!
//! Two gestures drive five screens:
//!
//! | Screen       | Tap                        | Hold                    |
//! |--------------|----------------------------|-------------------------|
//! | Dashboard    | Menu, selection reset      | Menu                    |
//! | Menu         | next entry (wrapping)      | run selected entry      |
//! | Graph        | next metric (wrapping)     | Dashboard               |
//! | Stats        | Dashboard                  | Dashboard               |
//! | ConfirmReset | erase calibration, restart | Menu (cancel)           |
//!
//! The state machine only navigates. Side effects come back as
//! [`UiCommand`]s for the control loop to execute.

pub mod gesture;
pub mod menu;
pub mod notice;

pub use gesture::Gesture;
pub use menu::{MENU, MENU_WINDOW, MenuAction, MenuContext, UiCommand};
pub use notice::{Notice, NoticeKind};

use log::debug;

use crate::trend::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiScreen {
    #[default]
    Dashboard,
    Menu,
    Graph,
    Stats,
    ConfirmReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiStateMachine {
    screen: UiScreen,
    selected: usize,
    scroll_offset: usize,
    metric: Metric,
}

impl Default for UiStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UiStateMachine {
    pub const fn new() -> Self {
        Self {
            screen: UiScreen::Dashboard,
            selected: 0,
            scroll_offset: 0,
            metric: Metric::Iaq,
        }
    }

    pub fn screen(&self) -> UiScreen {
        self.screen
    }

    /// Index of the highlighted menu entry.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// First visible menu row.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Series shown on the graph screen.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Apply one gesture, returning the side effect to run, if any.
    pub fn handle(&mut self, gesture: Gesture) -> Option<UiCommand> {
        let before = self.screen;
        let command = match (self.screen, gesture) {
            (UiScreen::Dashboard, Gesture::Tap) => {
                self.screen = UiScreen::Menu;
                self.selected = 0;
                self.scroll_offset = 0;
                None
            }
            (UiScreen::Dashboard, Gesture::Hold) => {
                self.screen = UiScreen::Menu;
                None
            }
            (UiScreen::Menu, Gesture::Tap) => {
                self.select_next();
                None
            }
            (UiScreen::Menu, Gesture::Hold) => {
                let action = MENU[self.selected].action;
                self.screen = action.screen_after();
                action.command()
            }
            (UiScreen::Graph, Gesture::Tap) => {
                self.metric = self.metric.next();
                None
            }
            (UiScreen::Graph, Gesture::Hold) | (UiScreen::Stats, _) => {
                self.screen = UiScreen::Dashboard;
                None
            }
            (UiScreen::ConfirmReset, Gesture::Tap) => Some(UiCommand::EraseCalibration),
            (UiScreen::ConfirmReset, Gesture::Hold) => {
                self.screen = UiScreen::Menu;
                None
            }
        };

        if self.screen != before {
            debug!("UI {:?} -> {:?}", before, self.screen);
        }
        command
    }

    /// Navigation screens need a lit display; fall back to the dashboard.
    pub fn on_screen_off(&mut self) {
        if matches!(self.screen, UiScreen::Menu | UiScreen::ConfirmReset) {
            self.screen = UiScreen::Dashboard;
        }
    }

    fn select_next(&mut self) {
        self.selected += 1;
        if self.selected >= MENU.len() {
            self.selected = 0;
        }
        if self.selected >= self.scroll_offset + MENU_WINDOW {
            self.scroll_offset = self.selected + 1 - MENU_WINDOW;
        } else if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        }
    }
}
