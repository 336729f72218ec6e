use std::fmt;
use std::io::{self, Read, Write};

use generic::command_to_proto::parse_protocol;
use generic::pump_error::ProtocolError;
use generic::pump_proto::{PumpCommand, LINE_TERMINATOR};
use log::{debug, info};
use serialport::{available_ports, SerialPortType};

pub mod session;
pub mod virtual_pump;

/// USB VID:PID the firmware enumerates with.
pub const PUMP_PROBE: &str = "16c0:27dd";
/// The firmware never sends more than this before a terminator.
pub const MAX_REPLY_LEN: usize = 512;

#[derive(Debug)]
pub enum ConsoleError {
    Rejected(ProtocolError),
    SendingLine(io::Error),
    RecvReply(io::Error),
    PortClosed,
    ReplyTooLong,
    ReplyNotUtf8,
    NoDevice(String),
    Open(serialport::Error),
    PortInUse(String),
    NotConnected(String),
    NoPumpSelected,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Rejected(e) => write!(f, "not sent: {}", e),
            ConsoleError::SendingLine(e) => write!(f, "sending line failed: {}", e),
            ConsoleError::RecvReply(e) => write!(f, "receiving reply failed: {}", e),
            ConsoleError::PortClosed => f.write_str("port closed before the reply ended"),
            ConsoleError::ReplyTooLong => write!(f, "reply longer than {} bytes", MAX_REPLY_LEN),
            ConsoleError::ReplyNotUtf8 => f.write_str("reply is not utf-8"),
            ConsoleError::NoDevice(probe) => write!(f, "no port with probe {}", probe),
            ConsoleError::Open(e) => write!(f, "opening port failed: {}", e),
            ConsoleError::PortInUse(name) => write!(f, "port {} is already in use", name),
            ConsoleError::NotConnected(name) => write!(f, "{} is not connected", name),
            ConsoleError::NoPumpSelected => f.write_str("no pump connected, use 'connect'"),
        }
    }
}

impl std::error::Error for ConsoleError {}

/// Parses a `vid:pid` pair in hex, e.g. `16c0:27dd`.
pub fn parse_probe(probe: &str) -> Option<(u16, u16)> {
    let (vid, pid) = probe.split_once(':')?;
    let vid = u16::from_str_radix(vid.trim(), 16).ok()?;
    let pid = u16::from_str_radix(pid.trim(), 16).ok()?;
    Some((vid, pid))
}

pub fn find_serial_device(probe: &str) -> Option<String> {
    let (vid, pid) = parse_probe(probe)?;
    let ports = available_ports().ok()?;
    ports.into_iter().find_map(|p| match p.port_type {
        SerialPortType::UsbPort(info) if info.vid == vid && info.pid == pid => Some(p.port_name),
        _ => None,
    })
}

/// One line per port, USB ports with their ids and product string.
pub fn describe_ports() -> Vec<String> {
    let Ok(ports) = available_ports() else {
        return Vec::new();
    };
    ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => format!(
                "{} usb {:04x}:{:04x} {}",
                p.port_name,
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            SerialPortType::PciPort => format!("{} pci", p.port_name),
            SerialPortType::BluetoothPort => format!("{} bluetooth", p.port_name),
            SerialPortType::Unknown => p.port_name,
        })
        .collect()
}

/// Checks a line with the same parser the firmware runs.
pub fn validate(line: &str) -> Result<PumpCommand, ConsoleError> {
    parse_protocol(line).map_err(ConsoleError::Rejected)
}

/// Validates `line`, sends it with its terminator and waits for the reply.
pub fn send_command<P: Read + Write + ?Sized>(line: &str, port: &mut P) -> Result<String, ConsoleError> {
    let command = validate(line)?;
    let line = line.trim();
    debug!("sending '{}' ({:?})", line, command);

    port.write_all(line.as_bytes()).map_err(ConsoleError::SendingLine)?;
    port.write_all(&[LINE_TERMINATOR]).map_err(ConsoleError::SendingLine)?;
    port.flush().map_err(ConsoleError::SendingLine)?;

    let reply = read_reply(port)?;
    info!("'{}' -> '{}'", line, reply);
    Ok(reply)
}

/// Reads up to the next terminator. Carriage returns are dropped.
pub fn read_reply<P: Read + ?Sized>(port: &mut P) -> Result<String, ConsoleError> {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match port.read(&mut byte) {
            Ok(0) => return Err(ConsoleError::PortClosed),
            Ok(_) if byte[0] == LINE_TERMINATOR => break,
            Ok(_) if byte[0] == b'\r' => {}
            Ok(_) => {
                if reply.len() == MAX_REPLY_LEN {
                    return Err(ConsoleError::ReplyTooLong);
                }
                reply.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ConsoleError::RecvReply(e)),
        }
    }
    String::from_utf8(reply).map_err(|_| ConsoleError::ReplyNotUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FakePort {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakePort {
        fn replying(reply: &str) -> Self {
            FakePort { input: Cursor::new(reply.as_bytes().to_vec()), output: Vec::new() }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_probe() {
        assert_eq!(parse_probe("16c0:27dd"), Some((0x16c0, 0x27dd)));
        assert_eq!(parse_probe(PUMP_PROBE), Some((0x16c0, 0x27dd)));
        assert_eq!(parse_probe("16c0"), None);
        assert_eq!(parse_probe("16c0:xyz"), None);
    }

    #[test]
    fn test_send_command() {
        let mut port = FakePort::replying("1.2\r\n");
        let reply = send_command("  p \r", &mut port).unwrap();
        assert_eq!(reply, "1.2");
        assert_eq!(port.output, b"p\n");
    }

    #[test]
    fn test_invalid_command_not_sent() {
        let mut port = FakePort::replying("");
        let err = send_command("s1110255", &mut port).unwrap_err();
        assert!(matches!(err, ConsoleError::Rejected(ProtocolError::WrongLength { expected: 6, actual: 8 })));
        assert_eq!(err.to_string(), "not sent: expected 6 characters, got 8");
        assert!(port.output.is_empty());
    }

    #[test]
    fn test_reply_framing() {
        let mut port = FakePort::replying("Stopped all pumps!\nS1M1:0,0;\n");
        assert_eq!(read_reply(&mut port).unwrap(), "Stopped all pumps!");
        assert_eq!(read_reply(&mut port).unwrap(), "S1M1:0,0;");
        assert!(matches!(read_reply(&mut port), Err(ConsoleError::PortClosed)));
    }

    #[test]
    fn test_reply_too_long() {
        let long = "x".repeat(MAX_REPLY_LEN + 1);
        let mut port = FakePort::replying(&long);
        assert!(matches!(read_reply(&mut port), Err(ConsoleError::ReplyTooLong)));
    }
}
