//! Host command link: splitting the byte stream into lines and answering
//! each line with exactly one reply.

use core::fmt::Write;

use generic::command_to_proto::parse_protocol;
use generic::pump_error::{ProtocolError, PumpError};
use generic::pump_proto::{PumpCommand, LINE_TERMINATOR, MAX_COMMAND_LENGTH};
use heapless::String;

use crate::state::PumpState;
use crate::storage::NvStorage;
use crate::timer::{PumpDuration, PumpInstant};

/// Fits the status reply of a full 36-channel rack.
pub const REPLY_CAPACITY: usize = 512;

pub type Reply = String<REPLY_CAPACITY>;
pub type CommandLine = String<MAX_COMMAND_LENGTH>;

/// Collects bytes until the terminator. A line that is too long or not
/// ASCII is swallowed up to its terminator and reported once.
#[derive(Default)]
pub struct LineAssembler {
    line: CommandLine,
    rejected: Option<ProtocolError>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> Option<Result<CommandLine, ProtocolError>> {
        if byte == LINE_TERMINATOR {
            let line = core::mem::take(&mut self.line);
            return Some(match self.rejected.take() {
                Some(e) => Err(e),
                None => Ok(line),
            });
        }
        if byte == b'\r' || self.rejected.is_some() {
            return None;
        }
        let accepted = byte.is_ascii() && self.line.push(byte as char).is_ok();
        if !accepted {
            self.rejected = Some(if byte.is_ascii() { ProtocolError::LineTooLong } else { ProtocolError::NotAscii });
            self.line.clear();
        }
        None
    }
}

fn error_reply(error: PumpError) -> Reply {
    let mut reply = Reply::new();
    let _ = write!(reply, "Error: {}", error);
    reply
}

/// Carries out one parsed command.
pub fn execute<S: NvStorage>(
    command: PumpCommand,
    now: PumpInstant,
    pump: &mut PumpState<S>,
) -> Result<Reply, PumpError> {
    let mut reply = Reply::new();
    match command {
        PumpCommand::Status => {
            for (address, channel) in pump.scheduler().bank().iter() {
                let _ = write!(
                    reply,
                    "S{}M{}:{},{};",
                    address.board,
                    address.motor,
                    channel.duty(),
                    channel.state().code()
                );
            }
        }
        PumpCommand::StopAll => {
            pump.scheduler_mut().stop_all();
            pump.persist_channels();
            let _ = reply.push_str("Stopped all pumps!");
        }
        PumpCommand::Stop(address) => {
            pump.scheduler_mut().stop(address)?;
            pump.persist_channels();
            let _ = write!(reply, "Stopped pump: {},{}!", address.board, address.motor);
        }
        PumpCommand::Count => {
            let layout = pump.scheduler().layout();
            let _ = write!(reply, "{}.{}", layout.boards(), layout.motors_per_board());
        }
        PumpCommand::SetDuty { address, duty } => {
            pump.scheduler_mut().set_duty(address, duty)?;
            pump.persist_channels();
            let _ = write!(reply, "Set speed of pump: {},{} to {}", address.board, address.motor, duty);
        }
        PumpCommand::Start { address, direction, seconds } => {
            pump.scheduler_mut().start(address, direction, PumpDuration::secs(seconds as u64), now)?;
            pump.persist_channels();
            let _ = write!(
                reply,
                "Started pump: {},{} in the {} direction.",
                address.board,
                address.motor,
                direction.name()
            );
        }
    }
    Ok(reply)
}

/// Parses and runs one line. Malformed lines change nothing.
pub fn interpret_line<S: NvStorage>(line: &str, now: PumpInstant, pump: &mut PumpState<S>) -> Reply {
    let result = parse_protocol(line)
        .map_err(PumpError::from)
        .and_then(|command| {
            debug!("command {:?}", command);
            execute(command, now, pump)
        });
    match result {
        Ok(reply) => reply,
        Err(e) => {
            warn!("command rejected: {:?}", e);
            error_reply(e)
        }
    }
}

/// Reply for a line the assembler already rejected.
pub fn reject_line(error: ProtocolError) -> Reply {
    error_reply(error.into())
}
