use embedded_hal::digital::{InputPin, OutputPin};

/// Row-scanned key matrix. Rows are driven low one at a time; columns are
/// pulled up, so a pressed key reads low on its column.
pub struct KeypadMatrix<R, C, const ROWS: usize, const COLS: usize> {
    rows: [R; ROWS],
    cols: [C; COLS],
    layout: [[char; COLS]; ROWS],
}

impl<R: OutputPin, C: InputPin, const ROWS: usize, const COLS: usize> KeypadMatrix<R, C, ROWS, COLS> {
    pub fn new(mut rows: [R; ROWS], cols: [C; COLS], layout: [[char; COLS]; ROWS]) -> Self {
        for row in rows.iter_mut() {
            let _ = row.set_high();
        }
        KeypadMatrix { rows, cols, layout }
    }

    /// Legend of the first key found held, if any.
    pub fn scan(&mut self) -> Option<char> {
        let mut pressed = None;
        for (r, row) in self.rows.iter_mut().enumerate() {
            if row.set_low().is_err() {
                continue;
            }
            for (c, col) in self.cols.iter_mut().enumerate() {
                if pressed.is_none() && col.is_low().unwrap_or(false) {
                    pressed = Some(self.layout[r][c]);
                }
            }
            let _ = row.set_high();
        }
        pressed
    }
}
