pub mod eeprom;
pub mod keypad_matrix;
pub mod motor_shield;
pub mod oled_display;
pub mod rp2040_timer;
pub mod shared_i2c;
pub mod usb_link;
