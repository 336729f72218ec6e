use crate::pump_error::ProtocolError;
use crate::pump_proto::{ChannelAddress, MotorDirection, PumpCommand};

/// Parses one command line (without its terminator).
///
/// Every command is a single letter followed by fixed-width digit fields, so
/// the length check comes first and each field is then read at a fixed offset.
pub fn parse_protocol(line: &str) -> Result<PumpCommand, ProtocolError> {
    let line = line.trim();
    if !line.is_ascii() {
        return Err(ProtocolError::NotAscii);
    }
    let bytes = line.as_bytes();
    let (&command, args) = bytes.split_first().ok_or(ProtocolError::EmptyLine)?;

    match command {
        b'g' => expect_len(bytes, 1).map(|_| PumpCommand::Status),
        b'p' => expect_len(bytes, 1).map(|_| PumpCommand::Count),
        b'a' => match bytes.len() {
            1 => Ok(PumpCommand::StopAll),
            3 => Ok(PumpCommand::Stop(parse_address(args)?)),
            _ => Err(wrong_length(3, bytes.len())),
        },
        b's' => {
            expect_len(bytes, 6)?;
            let address = parse_address(&args[..2])?;
            let duty = parse_digits(&args[2..5])?;
            if duty > u8::MAX as u32 {
                return Err(ProtocolError::DutyOutOfRange(duty as u16));
            }
            Ok(PumpCommand::SetDuty { address, duty: duty as u8 })
        }
        b'r' => {
            expect_len(bytes, 9)?;
            let address = parse_address(&args[..2])?;
            let direction = parse_direction(args[2])?;
            let seconds = parse_digits(&args[3..8])?;
            Ok(PumpCommand::Start { address, direction, seconds })
        }
        other => Err(ProtocolError::UnknownCommand(other)),
    }
}

fn wrong_length(expected: usize, actual: usize) -> ProtocolError {
    ProtocolError::WrongLength { expected: expected as u8, actual: actual.min(u8::MAX as usize) as u8 }
}

fn expect_len(bytes: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(wrong_length(expected, bytes.len()))
    }
}

fn parse_digit(c: u8) -> Result<u8, ProtocolError> {
    if c.is_ascii_digit() {
        Ok(c - b'0')
    } else {
        Err(ProtocolError::NotDigit(c))
    }
}

fn parse_digits(field: &[u8]) -> Result<u32, ProtocolError> {
    field.iter().try_fold(0u32, |acc, &c| Ok(acc * 10 + parse_digit(c)? as u32))
}

fn parse_address(field: &[u8]) -> Result<ChannelAddress, ProtocolError> {
    Ok(ChannelAddress::new(parse_digit(field[0])?, parse_digit(field[1])?))
}

fn parse_direction(c: u8) -> Result<MotorDirection, ProtocolError> {
    match c {
        b'0' | b'f' => Ok(MotorDirection::Forward),
        b'1' | b'b' => Ok(MotorDirection::Backward),
        other => Err(ProtocolError::UnknownDirection(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_protocol("g"), Ok(PumpCommand::Status));
        assert_eq!(parse_protocol("p"), Ok(PumpCommand::Count));
        assert_eq!(parse_protocol("a"), Ok(PumpCommand::StopAll));
        assert_eq!(parse_protocol("a12"), Ok(PumpCommand::Stop(ChannelAddress::new(1, 2))));
        // trailing carriage return from terminals
        assert_eq!(parse_protocol("g\r"), Ok(PumpCommand::Status));
    }

    #[test]
    fn test_set_duty() {
        assert_eq!(
            parse_protocol("s11255"),
            Ok(PumpCommand::SetDuty { address: ChannelAddress::new(1, 1), duty: 255 })
        );
        assert_eq!(
            parse_protocol("s21007"),
            Ok(PumpCommand::SetDuty { address: ChannelAddress::new(2, 1), duty: 7 })
        );
        assert_eq!(
            parse_protocol("s1110255"),
            Err(ProtocolError::WrongLength { expected: 6, actual: 8 })
        );
        assert_eq!(parse_protocol("s11256"), Err(ProtocolError::DutyOutOfRange(256)));
        assert_eq!(parse_protocol("s1x255"), Err(ProtocolError::NotDigit(b'x')));
    }

    #[test]
    fn test_start() {
        assert_eq!(
            parse_protocol("r12000005"),
            Ok(PumpCommand::Start {
                address: ChannelAddress::new(1, 2),
                direction: MotorDirection::Forward,
                seconds: 5
            })
        );
        assert_eq!(
            parse_protocol("r31b99999"),
            Ok(PumpCommand::Start {
                address: ChannelAddress::new(3, 1),
                direction: MotorDirection::Backward,
                seconds: 99_999
            })
        );
        assert_eq!(parse_protocol("r11x00005"), Err(ProtocolError::UnknownDirection(b'x')));
        assert_eq!(parse_protocol("r110005"), Err(ProtocolError::WrongLength { expected: 9, actual: 7 }));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_protocol(""), Err(ProtocolError::EmptyLine));
        assert_eq!(parse_protocol("   "), Err(ProtocolError::EmptyLine));
        assert_eq!(parse_protocol("z"), Err(ProtocolError::UnknownCommand(b'z')));
        assert_eq!(parse_protocol("g1"), Err(ProtocolError::WrongLength { expected: 1, actual: 2 }));
        assert_eq!(parse_protocol("a1"), Err(ProtocolError::WrongLength { expected: 3, actual: 2 }));
        assert_eq!(parse_protocol("gé"), Err(ProtocolError::NotAscii));
    }
}
