//! In-place editing of a fixed-width decimal number on a character display.
//!
//! The buffer always holds `width` ASCII cells, digits and at most one `.`.
//! The point may only sit in `1..=sig_figs`, so the integer part never grows
//! past `sig_figs` digits.

pub const MAX_WIDTH: usize = 16;
const POINT: u8 = b'.';

fn pow10(exp: usize) -> u64 {
    let mut value = 1u64;
    for _ in 0..exp {
        value *= 10;
    }
    value
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DecimalEditor {
    cells: [u8; MAX_WIDTH],
    width: usize,
    sig_figs: usize,
    cursor: usize,
    point: Option<usize>,
}

impl DecimalEditor {
    /// All zeros, no point. `width` is clamped to `3..=MAX_WIDTH` and
    /// `sig_figs` to `1..=width - 2`.
    pub fn blank(width: usize, sig_figs: usize) -> Self {
        let width = width.clamp(3, MAX_WIDTH);
        let sig_figs = sig_figs.clamp(1, width - 2);
        DecimalEditor { cells: [b'0'; MAX_WIDTH], width, sig_figs, cursor: 0, point: None }
    }

    /// Canonical form of `value`: integer part zero-padded to `sig_figs`
    /// digits, the point, then the rounded fraction. Values that do not fit
    /// saturate to all nines; negative or NaN values show as zero.
    pub fn with_value(width: usize, sig_figs: usize, value: f64) -> Self {
        let mut editor = DecimalEditor::blank(width, sig_figs);
        editor.load(value);
        editor
    }

    pub fn load(&mut self, value: f64) {
        let sig_figs = self.sig_figs;
        let fraction_digits = self.width - sig_figs - 1;
        let scale = pow10(fraction_digits);
        let limit = pow10(sig_figs) * scale - 1;
        let scaled = if value.is_nan() || value <= 0.0 {
            0
        } else {
            let scaled = value * scale as f64 + 0.5;
            if scaled >= limit as f64 {
                limit
            } else {
                scaled as u64
            }
        };

        let mut rest = scaled;
        for i in (sig_figs + 1..self.width).rev() {
            self.cells[i] = b'0' + (rest % 10) as u8;
            rest /= 10;
        }
        for i in (0..sig_figs).rev() {
            self.cells[i] = b'0' + (rest % 10) as u8;
            rest /= 10;
        }
        self.cells[sig_figs] = POINT;
        self.point = Some(sig_figs);
        self.cursor = 0;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn sig_figs(&self) -> usize {
        self.sig_figs
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn point(&self) -> Option<usize> {
        self.point
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells[..self.width]
    }

    pub fn as_str(&self) -> &str {
        // cells only ever hold ASCII digits and '.'
        core::str::from_utf8(self.cells()).unwrap_or("")
    }

    pub fn move_left(&mut self) {
        self.cursor = if self.cursor == 0 { self.width - 1 } else { self.cursor - 1 };
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1) % self.width;
    }

    /// Opens a gap at `at` by shifting the cells after it right; the last cell is lost.
    fn insert_point(&mut self, at: usize) {
        self.cells.copy_within(at..self.width - 1, at + 1);
        self.cells[at] = POINT;
        self.point = Some(at);
    }

    pub fn press_digit(&mut self, digit: u8) {
        if digit > 9 {
            return;
        }
        if self.point.is_none() && self.cursor >= self.sig_figs {
            self.insert_point(self.sig_figs);
            if self.cursor == self.sig_figs {
                self.cursor += 1;
            }
        }
        if self.point == Some(self.cursor) {
            self.cursor += 1;
        }
        self.cells[self.cursor] = b'0' + digit;
        self.move_right();
    }

    pub fn press_point(&mut self) {
        let cursor = self.cursor;
        if cursor == 0 || cursor > self.sig_figs {
            return;
        }
        match self.point {
            Some(p) if p == cursor => {}
            Some(p) if cursor < p => {
                self.cells.copy_within(cursor..p, cursor + 1);
                self.cells[cursor] = POINT;
                self.point = Some(cursor);
            }
            Some(p) => {
                self.cells.copy_within(p + 1..=cursor, p);
                self.cells[cursor] = POINT;
                self.point = Some(cursor);
            }
            None => self.insert_point(cursor),
        }
    }

    fn digits_value(cells: &[u8]) -> u64 {
        cells.iter().filter(|c| c.is_ascii_digit()).fold(0, |acc, c| acc * 10 + (c - b'0') as u64)
    }

    /// Numeric value of the buffer. Without a point the first `sig_figs`
    /// cells are the integer and the rest is ignored.
    pub fn value(&self) -> f64 {
        let cells = self.cells();
        match self.point {
            Some(p) => {
                let integer = Self::digits_value(&cells[..p]);
                let fraction_digits = self.width - p - 1;
                let fraction = Self::digits_value(&cells[p + 1..]);
                integer as f64 + fraction as f64 / pow10(fraction_digits) as f64
            }
            None => Self::digits_value(&cells[..self.sig_figs]) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_digits(editor: &mut DecimalEditor, digits: &str) {
        for c in digits.bytes() {
            editor.press_digit(c - b'0');
        }
    }

    fn check_invariants(editor: &DecimalEditor) {
        let points: Vec<usize> =
            editor.cells().iter().enumerate().filter(|(_, c)| **c == POINT).map(|(i, _)| i).collect();
        assert!(points.len() <= 1, "{}", editor.as_str());
        assert_eq!(points.first().copied(), editor.point());
        if let Some(p) = editor.point() {
            assert!(p >= 1 && p <= editor.sig_figs(), "point at {} in {}", p, editor.as_str());
        }
        assert!(editor.cursor() < editor.width());
        assert!(editor.cells().iter().all(|c| c.is_ascii_digit() || *c == POINT));
    }

    #[test]
    fn test_canonical_render() {
        assert_eq!(DecimalEditor::with_value(8, 4, 1.5).as_str(), "0001.500");
        assert_eq!(DecimalEditor::with_value(6, 2, 14.5).as_str(), "14.500");
        assert_eq!(DecimalEditor::with_value(8, 4, 0.0006).as_str(), "0000.001");
        assert_eq!(DecimalEditor::with_value(8, 4, 123_456.0).as_str(), "9999.999");
        assert_eq!(DecimalEditor::with_value(8, 4, -3.0).as_str(), "0000.000");
        assert_eq!(DecimalEditor::with_value(8, 4, f64::NAN).as_str(), "0000.000");
    }

    #[test]
    fn test_render_parse_render() {
        for value in [0.0, 0.001, 1.5, 14.5, 26.0, 999.999, 1234.567, 9999.999] {
            let first = DecimalEditor::with_value(8, 4, value);
            let second = DecimalEditor::with_value(8, 4, first.value());
            assert_eq!(first.as_str(), second.as_str());
        }
        let wide = DecimalEditor::with_value(16, 7, 1_234_567.876_543_21);
        assert_eq!(wide.as_str(), "1234567.87654321");
        assert_eq!(DecimalEditor::with_value(16, 7, wide.value()).as_str(), wide.as_str());
    }

    #[test]
    fn test_typing_into_blank_inserts_point() {
        let mut editor = DecimalEditor::blank(8, 4);
        type_digits(&mut editor, "12345");
        assert_eq!(editor.as_str(), "1234.500");
        assert_eq!(editor.cursor(), 6);
        assert!((editor.value() - 1234.5).abs() < 1e-9);
    }

    #[test]
    fn test_digit_skips_point_and_wraps() {
        let mut editor = DecimalEditor::with_value(6, 2, 14.5);
        editor.move_right();
        editor.move_right();
        assert_eq!(editor.cursor(), 2);
        type_digits(&mut editor, "789");
        assert_eq!(editor.as_str(), "14.789");
        assert_eq!(editor.cursor(), 0);
        type_digits(&mut editor, "2");
        assert_eq!(editor.as_str(), "24.789");
    }

    #[test]
    fn test_cursor_wraps() {
        let mut editor = DecimalEditor::blank(8, 4);
        editor.move_left();
        assert_eq!(editor.cursor(), 7);
        editor.move_right();
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_point_moves_keep_digit_order() {
        let mut editor = DecimalEditor::with_value(8, 4, 1.5);
        editor.move_right();
        editor.move_right();
        editor.press_point();
        assert_eq!(editor.as_str(), "00.01500");
        assert_eq!(editor.cursor(), 2);
        assert!((editor.value() - 0.015).abs() < 1e-12);

        editor.move_right();
        editor.move_right();
        editor.press_point();
        assert_eq!(editor.as_str(), "0001.500");
    }

    #[test]
    fn test_point_key_no_ops() {
        let start = DecimalEditor::with_value(8, 4, 12.25);
        let mut editor = start.clone();
        // at 0, on the point itself, and past the significant figures
        editor.press_point();
        for _ in 0..4 {
            editor.move_right();
        }
        editor.press_point();
        editor.move_right();
        editor.press_point();
        assert_eq!(editor.as_str(), start.as_str());
        assert_eq!(editor.point(), start.point());
    }

    #[test]
    fn test_point_into_blank_drops_last_cell() {
        let mut editor = DecimalEditor::blank(6, 3);
        type_digits(&mut editor, "123");
        editor.move_left();
        editor.press_point();
        assert_eq!(editor.as_str(), "12.300");
        assert_eq!(editor.point(), Some(2));
        assert!((editor.value() - 12.3).abs() < 1e-9);
    }

    #[test]
    fn test_value_without_point_uses_integer_cells() {
        let mut editor = DecimalEditor::blank(8, 4);
        type_digits(&mut editor, "12");
        assert_eq!(editor.as_str(), "12000000");
        assert_eq!(editor.value(), 1200.0);
        editor.press_digit(10);
        assert_eq!(editor.as_str(), "12000000");
    }

    #[test]
    fn test_no_op_session_is_idempotent() {
        let start = DecimalEditor::with_value(8, 4, 3.75);
        let mut editor = start.clone();
        for _ in 0..8 {
            editor.move_right();
        }
        editor.move_left();
        editor.move_right();
        assert_eq!(editor, start);
    }

    #[test]
    fn test_random_sessions_hold_invariants() {
        let mut seed: u32 = 0x1234_5678;
        let mut next = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            seed >> 16
        };
        for (width, sig_figs) in [(8, 4), (6, 2), (5, 3), (16, 7), (3, 1)] {
            for round in 0..200 {
                let mut editor = if round % 2 == 0 {
                    DecimalEditor::blank(width, sig_figs)
                } else {
                    DecimalEditor::with_value(width, sig_figs, (next() % 100_000) as f64 / 100.0)
                };
                for _ in 0..40 {
                    match next() % 6 {
                        0 => editor.move_left(),
                        1 => editor.move_right(),
                        2 => editor.press_point(),
                        _ => editor.press_digit((next() % 10) as u8),
                    }
                    check_invariants(&editor);
                }
                let value = editor.value();
                assert!(value >= 0.0 && value < pow10(sig_figs) as f64);

                // the canonical form of any reachable buffer is a fixed point
                let canonical = DecimalEditor::with_value(width, sig_figs, value);
                let again = DecimalEditor::with_value(width, sig_figs, canonical.value());
                assert_eq!(again.as_str(), canonical.as_str(), "from {}", editor.as_str());
                let resolution = 1.0 / pow10(width - sig_figs - 1) as f64;
                assert!(
                    (canonical.value() - value).abs() <= resolution + 1e-9,
                    "{} -> {}",
                    editor.as_str(),
                    canonical.as_str()
                );
                if editor.point() == Some(sig_figs) {
                    assert_eq!(canonical.as_str(), editor.as_str());
                }
            }
        }
    }
}
