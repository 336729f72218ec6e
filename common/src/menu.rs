//! Front panel: a four-item menu over the calibration plus local Run/Stop.
//!
//! Nothing here blocks. Informational screens are a `Message` state with a
//! deadline that `tick` checks on every loop iteration.

use generic::pump_error::{ConfigError, PumpError};

use crate::calibration::{Calibration, FlowUnit, PumpDirection};
use crate::decimal_editor::DecimalEditor;
use crate::flow_rate::{max_achievable_rate, GearRatio};
use crate::keypad::Key;
use crate::screen::{format_line, line, Screen};
use crate::state::PumpState;
use crate::storage::NvStorage;
use crate::timer::{PumpDuration, PumpInstant};

pub const MESSAGE_HOLD_MS: u64 = 1_500;

const RATE_WIDTH: usize = 8;
const RATE_SIG_FIGS: usize = 4;
const DIAMETER_WIDTH: usize = 6;
const DIAMETER_SIG_FIGS: usize = 2;
const VOLUME_WIDTH: usize = 8;
const VOLUME_SIG_FIGS: usize = 5;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MenuItem {
    Rate,
    Diameter,
    Direction,
    Volume,
}

impl MenuItem {
    pub const ALL: [MenuItem; 4] = [MenuItem::Rate, MenuItem::Diameter, MenuItem::Direction, MenuItem::Volume];

    fn index(self) -> usize {
        match self {
            MenuItem::Rate => 0,
            MenuItem::Diameter => 1,
            MenuItem::Direction => 2,
            MenuItem::Volume => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::Rate => "Set Rate",
            MenuItem::Diameter => "Set Diameter",
            MenuItem::Direction => "Infuse/Withdraw",
            MenuItem::Volume => "Set Volume",
        }
    }

    pub fn next(self) -> Self {
        MenuItem::ALL[(self.index() + 1) % MenuItem::ALL.len()]
    }

    pub fn prev(self) -> Self {
        MenuItem::ALL[(self.index() + MenuItem::ALL.len() - 1) % MenuItem::ALL.len()]
    }
}

/// What a timed message screen says.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notice {
    Saved,
    /// Saved, but faster than the pump can go; carries the fastest rate.
    SavedAtMax(f32),
    SaveFailed,
    Rejected(ConfigError),
    Started(PumpDuration),
    CannotStart(PumpError),
    StoppedAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateStage {
    PickUnit(FlowUnit),
    Value { unit: FlowUnit, editor: DecimalEditor },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MenuState {
    Idle,
    Browsing(MenuItem),
    EditingRate(RateStage),
    EditingDiameter(DecimalEditor),
    EditingDirection(PumpDirection),
    EditingVolume(DecimalEditor),
    Message { notice: Notice, until: PumpInstant },
}

/// Feeds a key into an editor; returns true on confirm.
fn edit(editor: &mut DecimalEditor, key: Key) -> bool {
    match key {
        Key::Digit(d) => editor.press_digit(d),
        Key::Left => editor.move_left(),
        Key::Right => editor.move_right(),
        Key::Point => editor.press_point(),
        Key::Select => return true,
        _ => {}
    }
    false
}

pub struct Menu {
    state: MenuState,
    hold: PumpDuration,
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

impl Menu {
    pub fn new() -> Self {
        Self::with_message_hold(MESSAGE_HOLD_MS)
    }

    pub fn with_message_hold(hold_ms: u64) -> Self {
        Menu { state: MenuState::Idle, hold: PumpDuration::millis(hold_ms) }
    }

    fn message(&self, notice: Notice, now: PumpInstant) -> MenuState {
        MenuState::Message { notice, until: now + self.hold }
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    /// Leaves a message screen once its time is up.
    pub fn tick(&mut self, now: PumpInstant) {
        if let MenuState::Message { until, .. } = self.state {
            if now >= until {
                self.state = MenuState::Idle;
            }
        }
    }

    pub fn handle_key<S: NvStorage>(&mut self, key: Key, now: PumpInstant, pump: &mut PumpState<S>) {
        if key == Key::Stop {
            pump.scheduler_mut().stop_all();
            pump.persist_channels();
            if matches!(self.state, MenuState::Idle | MenuState::Message { .. }) {
                self.state = self.message(Notice::StoppedAll, now);
            }
            return;
        }
        if key == Key::Back && !matches!(self.state, MenuState::Message { .. }) {
            self.state = MenuState::Idle;
            return;
        }

        let state = core::mem::replace(&mut self.state, MenuState::Idle);
        self.state = match state {
            MenuState::Idle => match key {
                Key::Select => MenuState::Browsing(MenuItem::Rate),
                Key::Run => match pump.start_local(now) {
                    Ok(duration) => {
                        pump.persist_channels();
                        self.message(Notice::Started(duration), now)
                    }
                    Err(e) => {
                        warn!("local start refused: {:?}", e);
                        self.message(Notice::CannotStart(e), now)
                    }
                },
                _ => MenuState::Idle,
            },
            MenuState::Browsing(item) => match key {
                Key::Up => MenuState::Browsing(item.prev()),
                Key::Down => MenuState::Browsing(item.next()),
                Key::Select => Self::enter(item, pump.calibration()),
                _ => MenuState::Browsing(item),
            },
            MenuState::EditingRate(RateStage::PickUnit(unit)) => match key {
                Key::Up => MenuState::EditingRate(RateStage::PickUnit(unit.prev())),
                Key::Down => MenuState::EditingRate(RateStage::PickUnit(unit.next())),
                Key::Select => {
                    let editor = DecimalEditor::with_value(RATE_WIDTH, RATE_SIG_FIGS, pump.calibration().rate() as f64);
                    MenuState::EditingRate(RateStage::Value { unit, editor })
                }
                _ => MenuState::EditingRate(RateStage::PickUnit(unit)),
            },
            MenuState::EditingRate(RateStage::Value { unit, mut editor }) => {
                if edit(&mut editor, key) {
                    let value = editor.value() as f32;
                    self.confirm(pump, now, |c| {
                        c.set_rate(value)?;
                        c.set_flow_unit(unit);
                        Ok(())
                    })
                } else {
                    MenuState::EditingRate(RateStage::Value { unit, editor })
                }
            }
            MenuState::EditingDiameter(mut editor) => {
                if edit(&mut editor, key) {
                    let value = editor.value() as f32;
                    self.confirm(pump, now, |c| c.set_diameter(value))
                } else {
                    MenuState::EditingDiameter(editor)
                }
            }
            MenuState::EditingDirection(direction) => match key {
                Key::Up | Key::Down | Key::Left | Key::Right => MenuState::EditingDirection(direction.toggle()),
                Key::Select => self.confirm(pump, now, |c| {
                    c.set_direction(direction);
                    Ok(())
                }),
                _ => MenuState::EditingDirection(direction),
            },
            MenuState::EditingVolume(mut editor) => {
                if edit(&mut editor, key) {
                    let value = editor.value() as f32;
                    self.confirm(pump, now, |c| c.set_target_volume(value))
                } else {
                    MenuState::EditingVolume(editor)
                }
            }
            // messages only wait for their deadline
            message @ MenuState::Message { .. } => message,
        };
    }

    fn enter(item: MenuItem, calibration: &Calibration) -> MenuState {
        debug!("entering {}", item.label());
        match item {
            MenuItem::Rate => MenuState::EditingRate(RateStage::PickUnit(calibration.flow_unit())),
            MenuItem::Diameter => MenuState::EditingDiameter(DecimalEditor::with_value(
                DIAMETER_WIDTH,
                DIAMETER_SIG_FIGS,
                calibration.diameter_mm() as f64,
            )),
            MenuItem::Direction => MenuState::EditingDirection(calibration.direction()),
            MenuItem::Volume => MenuState::EditingVolume(DecimalEditor::with_value(
                VOLUME_WIDTH,
                VOLUME_SIG_FIGS,
                calibration.target_volume() as f64,
            )),
        }
    }

    /// Applies an edit to a copy of the calibration and commits it only if
    /// every value is acceptable.
    fn confirm<S, F>(&self, pump: &mut PumpState<S>, now: PumpInstant, apply: F) -> MenuState
    where
        S: NvStorage,
        F: FnOnce(&mut Calibration) -> Result<(), ConfigError>,
    {
        let mut candidate = *pump.calibration();
        if let Err(e) = apply(&mut candidate) {
            warn!("edit rejected: {:?}", e);
            return self.message(Notice::Rejected(e), now);
        }
        let notice = match pump.commit(candidate) {
            Err(e) => {
                error!("saving calibration failed: {:?}", e);
                Notice::SaveFailed
            }
            Ok(()) if pump.gear().gear == GearRatio::Fastest => Notice::SavedAtMax(max_achievable_rate(&candidate)),
            Ok(()) => Notice::Saved,
        };
        self.message(notice, now)
    }

    pub fn screen<S: NvStorage>(&self, pump: &PumpState<S>, now: PumpInstant) -> Screen {
        let calibration = pump.calibration();
        match &self.state {
            MenuState::Idle => home_screen(pump, now),
            MenuState::Browsing(item) => Screen {
                lines: [format_line(format_args!("Menu {}/{}", item.index() + 1, MenuItem::ALL.len())), line(item.label())],
                cursor: None,
            },
            MenuState::EditingRate(RateStage::PickUnit(unit)) => Screen::new("Flow unit", unit.label()),
            MenuState::EditingRate(RateStage::Value { unit, editor }) => Screen {
                lines: [format_line(format_args!("Rate {}", unit.label())), line(editor.as_str())],
                cursor: None,
            }
            .with_cursor(editor.cursor()),
            MenuState::EditingDiameter(editor) => Screen::new("Diameter mm", editor.as_str()).with_cursor(editor.cursor()),
            MenuState::EditingDirection(direction) => Screen::new("Direction", direction.label()),
            MenuState::EditingVolume(editor) => Screen {
                lines: [
                    format_line(format_args!("Volume {}", calibration.flow_unit().volume_label())),
                    line(editor.as_str()),
                ],
                cursor: None,
            }
            .with_cursor(editor.cursor()),
            MenuState::Message { notice, .. } => notice_screen(notice, calibration),
        }
    }
}

fn home_screen<S: NvStorage>(pump: &PumpState<S>, now: PumpInstant) -> Screen {
    let calibration = pump.calibration();
    let top = format_line(format_args!("{:.2} {}", calibration.rate(), calibration.flow_unit().label()));
    let local = pump.local_channel();
    let bottom = match pump.scheduler().remaining(local, now) {
        Some(left) => format_line(format_args!("Run {}s left", (left.ticks() + 999) / 1_000)),
        None => {
            let gear = pump.gear();
            match gear.gear {
                GearRatio::Ratio(ratio) => format_line(format_args!("Gear {} D{}", ratio, gear.duty)),
                GearRatio::Fastest => format_line(format_args!("Gear fast D{}", gear.duty)),
                GearRatio::Slowest => format_line(format_args!("Gear slow D{}", gear.duty)),
            }
        }
    };
    Screen { lines: [top, bottom], cursor: None }
}

fn notice_screen(notice: &Notice, calibration: &Calibration) -> Screen {
    match notice {
        Notice::Saved => Screen::new("Saved", ""),
        Notice::SavedAtMax(max) => Screen {
            lines: [line("Too fast, max"), format_line(format_args!("{:.2} {}", max, calibration.flow_unit().label()))],
            cursor: None,
        },
        Notice::SaveFailed => Screen::new("Not saved", "storage error"),
        Notice::Rejected(e) => Screen { lines: [line("Invalid value"), format_line(format_args!("{}", e))], cursor: None },
        Notice::Started(duration) => Screen {
            lines: [line("Started"), format_line(format_args!("for {}s", (duration.ticks() + 999) / 1_000))],
            cursor: None,
        },
        Notice::CannotStart(e) => Screen { lines: [line("Cannot start"), format_line(format_args!("{}", e))], cursor: None },
        Notice::StoppedAll => Screen::new("Stopped", "all pumps"),
    }
}
