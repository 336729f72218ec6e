use crate::timer::{elapsed_since, PumpDuration, PumpInstant};

pub const DEBOUNCE_MS: u64 = 30;

/// A key of the front panel, already debounced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    Digit(u8),
    Left,
    Right,
    Up,
    Down,
    Point,
    Select,
    Back,
    Run,
    Stop,
}

impl Key {
    /// Legend printed on the keypad: digits, `U`/`D`/`L`/`R` arrows,
    /// `.`, `S`elect, `B`ack, `G`o and `X` for stop.
    pub fn from_legend(legend: char) -> Option<Key> {
        let key = match legend {
            '0'..='9' => Key::Digit(legend as u8 - b'0'),
            'U' => Key::Up,
            'D' => Key::Down,
            'L' => Key::Left,
            'R' => Key::Right,
            '.' => Key::Point,
            'S' => Key::Select,
            'B' => Key::Back,
            'G' => Key::Run,
            'X' => Key::Stop,
            _ => return None,
        };
        Some(key)
    }
}

/// Turns raw scans (the legend currently held, if any) into press events.
/// A reading must stay unchanged for `DEBOUNCE_MS` before it counts, and a
/// held key reports once.
pub struct KeyDebouncer {
    current: Option<char>,
    stable: Option<char>,
    last_change: PumpInstant,
}

impl KeyDebouncer {
    pub fn new(now: PumpInstant) -> Self {
        KeyDebouncer { current: None, stable: None, last_change: now }
    }

    pub fn update(&mut self, raw: Option<char>, now: PumpInstant) -> Option<Key> {
        if raw != self.current {
            self.current = raw;
            self.last_change = now;
            return None;
        }
        if self.current == self.stable
            || elapsed_since(now, self.last_change) < PumpDuration::millis(DEBOUNCE_MS)
        {
            return None;
        }
        self.stable = self.current;
        let key = self.stable.and_then(Key::from_legend);
        if let Some(key) = key {
            trace!("key {:?}", key);
        }
        key
    }
}
