use common::screen::{CharDisplay, Screen};
use embedded_graphics::mono_font::ascii::FONT_8X13;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle};
use embedded_graphics::text::{Baseline, Text};
use embedded_hal::i2c::I2c;
use generic::pump_error::PumpError;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};

const CHAR_WIDTH: i32 = 8;
const ROW_HEIGHT: i32 = 16;

type Oled<I2C> = Ssd1306<I2CInterface<I2C>, DisplaySize128x32, BufferedGraphicsMode<DisplaySize128x32>>;

/// 128x32 SSD1306 used as a 16x2 character display.
pub struct OledDisplay<I2C> {
    display: Oled<I2C>,
}

impl<I2C: I2c> OledDisplay<I2C> {
    pub fn new(i2c: I2C, address: u8, rotate_180: bool) -> Result<Self, PumpError> {
        let rotation = if rotate_180 { DisplayRotation::Rotate180 } else { DisplayRotation::Rotate0 };
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut display = Ssd1306::new(interface, DisplaySize128x32, rotation).into_buffered_graphics_mode();
        display.init().map_err(|_| PumpError::DisplayError)?;
        Ok(OledDisplay { display })
    }
}

impl<I2C: I2c> CharDisplay for OledDisplay<I2C> {
    fn show(&mut self, screen: &Screen) -> Result<(), PumpError> {
        let style = MonoTextStyle::new(&FONT_8X13, BinaryColor::On);
        self.display.clear_buffer();
        for (row, text) in screen.lines.iter().enumerate() {
            Text::with_baseline(text, Point::new(0, row as i32 * ROW_HEIGHT), style, Baseline::Top)
                .draw(&mut self.display)
                .map_err(|_| PumpError::DisplayError)?;
        }
        if let Some(column) = screen.cursor {
            let x = column as i32 * CHAR_WIDTH;
            let y = 2 * ROW_HEIGHT - 1;
            Line::new(Point::new(x, y), Point::new(x + CHAR_WIDTH - 2, y))
                .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
                .draw(&mut self.display)
                .map_err(|_| PumpError::DisplayError)?;
        }
        self.display.flush().map_err(|_| PumpError::DisplayError)
    }
}
