macro_rules! config {
    (
        $(
            $key:ident : $value:expr
        ),+ $(,)?
    ) => {
        $(
            pub const $key: bool = $value;
        )+
    };
}

macro_rules! parameters {
    (
        $(
            $key:ident : $type:ty = $value:expr
        ),+ $(,)?
    ) => {
        $(
            pub const $key: $type = $value;
        )+
    };
}

config! {
    // swap when the motor leads are wired the other way round
    REVERSE_MOTOR_POLARITY: false,
    OLED_ROTATE_180: false
}

parameters! {
    // stacked shields and motors wired on each
    PUMP_BOARDS: u8 = 1,
    MOTORS_PER_BOARD: u8 = 2,
    // channel driven by the front panel Run key
    LOCAL_BOARD: u8 = 1,
    LOCAL_MOTOR: u8 = 1,

    I2C_FREQUENCY_HZ: u32 = 400_000,
    MOTOR_SHIELD_BASE_ADDRESS: u8 = 0x60,
    EEPROM_ADDRESS: u8 = 0x50,
    OLED_ADDRESS: u8 = 0x3C,
    MOTOR_PWM_FREQUENCY_HZ: u32 = 1_600,

    // legends, row-major, as printed on the keypad
    KEYPAD_LAYOUT: [[char; 4]; 5] = [
        ['1', '2', '3', 'U'],
        ['4', '5', '6', 'D'],
        ['7', '8', '9', 'L'],
        ['.', '0', 'S', 'R'],
        ['B', 'G', 'X', ' '],
    ],

    MESSAGE_HOLD_MS: u64 = 1_500,
    USB_VID_PID: (u16, u16) = (0x16c0, 0x27dd),
}
