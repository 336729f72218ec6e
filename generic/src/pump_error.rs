use core::fmt;

/// Rejected calibration values and timed-run requests.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    NonPositiveRate,
    NonPositiveDiameter,
    VolumeOutOfRange,
    UnknownFlowUnit,
    UnknownDirection,
    // Percent rates have no time dimension.
    PercentRateNotTimed,
    ZeroDuration,
    DurationOverflow,
}

/// Malformed command lines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    EmptyLine,
    NotAscii,
    LineTooLong,
    UnknownCommand(u8),
    WrongLength { expected: u8, actual: u8 },
    NotDigit(u8),
    DutyOutOfRange(u16),
    UnknownDirection(u8),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    BoardOutOfRange(u8),
    MotorOutOfRange(u8),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PumpError {
    Config(ConfigError),
    Protocol(ProtocolError),
    Address(AddressError),

    // Used by the calibration store. Uninitialized is recovered by writing defaults.
    StorageUninitialized,
    StorageReadError,
    StorageWriteError,

    MotorDriverError,
    DisplayError,
    SerialWriteError,
}

impl From<ConfigError> for PumpError {
    fn from(e: ConfigError) -> Self {
        PumpError::Config(e)
    }
}

impl From<ProtocolError> for PumpError {
    fn from(e: ProtocolError) -> Self {
        PumpError::Protocol(e)
    }
}

impl From<AddressError> for PumpError {
    fn from(e: AddressError) -> Self {
        PumpError::Address(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveRate => f.write_str("rate must be positive"),
            ConfigError::NonPositiveDiameter => f.write_str("diameter must be positive"),
            ConfigError::VolumeOutOfRange => f.write_str("volume out of range"),
            ConfigError::UnknownFlowUnit => f.write_str("unknown flow unit"),
            ConfigError::UnknownDirection => f.write_str("unknown direction"),
            ConfigError::PercentRateNotTimed => f.write_str("percent rate cannot be timed"),
            ConfigError::ZeroDuration => f.write_str("duration must be positive"),
            ConfigError::DurationOverflow => f.write_str("duration too long"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::EmptyLine => f.write_str("empty command"),
            ProtocolError::NotAscii => f.write_str("command is not ascii"),
            ProtocolError::LineTooLong => f.write_str("command too long"),
            ProtocolError::UnknownCommand(c) => write!(f, "unknown command '{}'", *c as char),
            ProtocolError::WrongLength { expected, actual } => {
                write!(f, "expected {} characters, got {}", expected, actual)
            }
            ProtocolError::NotDigit(c) => write!(f, "'{}' is not a digit", *c as char),
            ProtocolError::DutyOutOfRange(d) => write!(f, "duty {} out of range 0-255", d),
            ProtocolError::UnknownDirection(c) => write!(f, "unknown direction '{}'", *c as char),
        }
    }
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::BoardOutOfRange(b) => write!(f, "no board {}", b),
            AddressError::MotorOutOfRange(m) => write!(f, "no motor {}", m),
        }
    }
}

impl fmt::Display for PumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpError::Config(e) => e.fmt(f),
            PumpError::Protocol(e) => e.fmt(f),
            PumpError::Address(e) => e.fmt(f),
            PumpError::StorageUninitialized => f.write_str("storage uninitialized"),
            PumpError::StorageReadError => f.write_str("storage read failed"),
            PumpError::StorageWriteError => f.write_str("storage write failed"),
            PumpError::MotorDriverError => f.write_str("motor driver failed"),
            PumpError::DisplayError => f.write_str("display failed"),
            PumpError::SerialWriteError => f.write_str("serial write failed"),
        }
    }
}
