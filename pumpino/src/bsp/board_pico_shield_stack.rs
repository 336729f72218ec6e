//! Pico driving a stack of PCA9685 motor shields, an AT24 EEPROM and an
//! SSD1306 OLED on I2C0, with a 5x4 matrix keypad.
use crate::define_pins;
use rp2040_hal::gpio::bank0::{Gpio4, Gpio5};
use rp2040_hal::gpio::{FunctionI2C, Pin, PullUp};
use rp2040_hal::pac::I2C0;
use rp2040_hal::I2C;

pub type PumpI2cPins = (Pin<Gpio4, FunctionI2C, PullUp>, Pin<Gpio5, FunctionI2C, PullUp>);
pub type PumpI2c = I2C<I2C0, PumpI2cPins>;

define_pins! {
    /// Shields, EEPROM and display share this controller.
    pump_i2c => I2C0,
}

define_pins! {
    /// Lit while any channel runs.
    status_led => led,

    pump_i2c_sda => gpio4,
    pump_i2c_scl => gpio5,

    /// Rows are driven, columns pulled up.
    keypad_row0 => gpio6,
    keypad_row1 => gpio7,
    keypad_row2 => gpio8,
    keypad_row3 => gpio9,
    keypad_row4 => gpio10,
    keypad_col0 => gpio11,
    keypad_col1 => gpio12,
    keypad_col2 => gpio13,
    keypad_col3 => gpio14,
}
