/// Terminates both command lines and replies on the serial link.
pub const LINE_TERMINATOR: u8 = b'\n';
pub const MAX_COMMAND_LENGTH: usize = 32;

/// Board and motor numbers as they appear on the wire, both 1-based.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelAddress {
    pub board: u8,
    pub motor: u8,
}

impl ChannelAddress {
    pub const fn new(board: u8, motor: u8) -> Self {
        ChannelAddress { board, motor }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorDirection {
    Forward,
    Backward,
}

impl MotorDirection {
    pub fn name(self) -> &'static str {
        match self {
            MotorDirection::Forward => "forward",
            MotorDirection::Backward => "backward",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpCommand {
    Status,
    StopAll,
    Stop(ChannelAddress),
    Count,
    SetDuty { address: ChannelAddress, duty: u8 },
    Start { address: ChannelAddress, direction: MotorDirection, seconds: u32 },
}
