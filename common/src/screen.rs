use core::fmt::Write;

use generic::pump_error::PumpError;
use heapless::String;

pub const SCREEN_COLUMNS: usize = 16;
pub const SCREEN_ROWS: usize = 2;

pub type Line = String<SCREEN_COLUMNS>;

/// Contents of the two-line front panel display.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Screen {
    pub lines: [Line; SCREEN_ROWS],
    /// Column of the blinking cursor on the bottom line.
    pub cursor: Option<u8>,
}

impl Screen {
    pub fn new(top: &str, bottom: &str) -> Self {
        Screen { lines: [line(top), line(bottom)], cursor: None }
    }

    pub fn with_cursor(mut self, column: usize) -> Self {
        self.cursor = Some(column.min(SCREEN_COLUMNS - 1) as u8);
        self
    }

    pub fn top(&self) -> &str {
        &self.lines[0]
    }

    pub fn bottom(&self) -> &str {
        &self.lines[1]
    }
}

/// Copies `text`, cutting it at the display width.
pub fn line(text: &str) -> Line {
    let mut out = Line::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Formats into a display line; whatever does not fit is dropped.
pub fn format_line(args: core::fmt::Arguments) -> Line {
    let mut out = Line::new();
    let _ = out.write_fmt(args);
    out
}

/// Anything that can show a `Screen`.
pub trait CharDisplay {
    fn show(&mut self, screen: &Screen) -> Result<(), PumpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_cut_at_width() {
        let screen = Screen::new("Syringe diameter mm", "ok").with_cursor(40);
        assert_eq!(screen.top(), "Syringe diameter");
        assert_eq!(screen.bottom(), "ok");
        assert_eq!(screen.cursor, Some(15));
    }

    #[test]
    fn test_format_line_truncates() {
        assert_eq!(format_line(format_args!("{} ml/min", 12.5)).as_str(), "12.5 ml/min");
        assert!(format_line(format_args!("{:>20}", 1)).len() <= SCREEN_COLUMNS);
    }
}
