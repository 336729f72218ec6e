//! Stack of Adafruit-style DC motor shields, one PCA9685 PWM controller per
//! shield. Each motor uses three PCA9685 outputs: speed PWM and the two
//! H-bridge inputs.

use common::channel::{MotorDriver, MAX_MOTORS_PER_BOARD};
use defmt::{info, warn};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use generic::channel_status::RunState;
use generic::pump_error::PumpError;
use generic::pump_proto::ChannelAddress;

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

/// Bit 12 of an ON/OFF count forces the output fully on/off.
const FULL: u16 = 0x1000;
const OSCILLATOR_HZ: u32 = 25_000_000;

#[derive(Copy, Clone)]
struct MotorOutputs {
    pwm: u8,
    in1: u8,
    in2: u8,
}

const MOTOR_OUTPUTS: [MotorOutputs; MAX_MOTORS_PER_BOARD as usize] = [
    MotorOutputs { pwm: 8, in1: 10, in2: 9 },
    MotorOutputs { pwm: 13, in1: 11, in2: 12 },
    MotorOutputs { pwm: 2, in1: 4, in2: 3 },
    MotorOutputs { pwm: 7, in1: 5, in2: 6 },
];

fn prescale_for(frequency_hz: u32) -> u8 {
    let frequency_hz = frequency_hz.max(1);
    let divider = 4_096 * frequency_hz;
    let prescale = (OSCILLATOR_HZ + divider / 2) / divider;
    prescale.saturating_sub(1).clamp(3, 255) as u8
}

pub struct MotorShields<I2C> {
    i2c: I2C,
    base_address: u8,
    boards: u8,
    reverse_polarity: bool,
}

impl<I2C: I2c> MotorShields<I2C> {
    pub fn new(i2c: I2C, base_address: u8, boards: u8, reverse_polarity: bool) -> Self {
        MotorShields { i2c, base_address, boards, reverse_polarity }
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), PumpError> {
        self.i2c.write(address, bytes).map_err(|_| PumpError::MotorDriverError)
    }

    /// Sets every shield's PWM frequency and wakes the controllers. Outputs
    /// start fully off.
    pub fn init(&mut self, pwm_frequency_hz: u32, delay: &mut impl DelayNs) -> Result<(), PumpError> {
        let prescale = prescale_for(pwm_frequency_hz);
        for board in 0..self.boards {
            let address = self.base_address + board;
            // prescale can only be written while asleep
            self.write(address, &[MODE1, MODE1_SLEEP])?;
            self.write(address, &[PRESCALE, prescale])?;
            self.write(address, &[MODE1, MODE1_AUTO_INCREMENT])?;
            delay.delay_ms(5);
            self.write(address, &[MODE1, MODE1_RESTART | MODE1_AUTO_INCREMENT])?;
            for output in 0..16 {
                self.set_output(address, output, 0, FULL)?;
            }
            info!("motor shield {=u8:#x} ready, prescale {}", address, prescale);
        }
        Ok(())
    }

    fn set_output(&mut self, address: u8, output: u8, on: u16, off: u16) -> Result<(), PumpError> {
        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        self.write(address, &[LED0_ON_L + 4 * output, on_l, on_h, off_l, off_h])
    }

    fn set_level(&mut self, address: u8, output: u8, high: bool) -> Result<(), PumpError> {
        if high {
            self.set_output(address, output, FULL, 0)
        } else {
            self.set_output(address, output, 0, FULL)
        }
    }
}

impl<I2C: I2c> MotorDriver for MotorShields<I2C> {
    fn drive(&mut self, channel: ChannelAddress, duty: u8, state: RunState) -> Result<(), PumpError> {
        if channel.board == 0 || channel.board > self.boards {
            warn!("no shield for board {}", channel.board);
            return Err(PumpError::MotorDriverError);
        }
        let outputs = *MOTOR_OUTPUTS.get(channel.motor.wrapping_sub(1) as usize).ok_or(PumpError::MotorDriverError)?;
        let address = self.base_address + channel.board - 1;

        let (in1, in2) = match state {
            RunState::Stopped => (false, false),
            RunState::Forward => (!self.reverse_polarity, self.reverse_polarity),
            RunState::Backward => (self.reverse_polarity, !self.reverse_polarity),
        };
        // release both bridge inputs before reversing
        self.set_level(address, outputs.in2, false)?;
        self.set_level(address, outputs.in1, in1)?;
        self.set_level(address, outputs.in2, in2)?;

        match duty {
            0 => self.set_output(address, outputs.pwm, 0, FULL),
            u8::MAX => self.set_output(address, outputs.pwm, FULL, 0),
            _ => self.set_output(address, outputs.pwm, 0, duty as u16 * 16),
        }
    }
}
