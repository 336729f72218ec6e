//! A pump controller running in this process, reachable like a serial port.
//!
//! Bytes written go into the same controller the firmware runs; reads run
//! loop iterations until the pending lines are answered. Time comes from a
//! `ManualTimer` fed with wall-clock time, so tests can also jump ahead.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Instant;

use common::channel::{ChannelLayout, MotorDriver};
use common::controller::PumpController;
use common::storage::{RamStorage, STORAGE_SPAN};
use common::timer::{ManualTimer, PumpDuration, PumpTimer};
use generic::channel_status::RunState;
use generic::pump_error::PumpError;
use generic::pump_proto::{ChannelAddress, LINE_TERMINATOR};
use log::{debug, info};

/// Name the virtual pump is connected under.
pub const VIRTUAL_PORT: &str = "virtual";
/// Same rack as the default firmware build.
pub const VIRTUAL_LAYOUT: ChannelLayout = ChannelLayout::new(1, 2);
const LOCAL_CHANNEL: ChannelAddress = ChannelAddress::new(1, 1);

/// Shows what would reach the motor shields.
struct LoggedMotors;

impl MotorDriver for LoggedMotors {
    fn drive(&mut self, address: ChannelAddress, duty: u8, state: RunState) -> Result<(), PumpError> {
        info!("virtual S{}M{}: duty {} {:?}", address.board, address.motor, duty, state);
        Ok(())
    }
}

pub struct VirtualPump {
    controller: PumpController<RamStorage<STORAGE_SPAN>>,
    clock: ManualTimer,
    last_step: Instant,
    outbox: VecDeque<u8>,
}

impl VirtualPump {
    pub fn new(layout: ChannelLayout) -> Self {
        VirtualPump {
            controller: PumpController::new(RamStorage::new(), layout, LOCAL_CHANNEL),
            clock: ManualTimer::new(0),
            last_step: Instant::now(),
            outbox: VecDeque::new(),
        }
    }

    pub fn clock(&self) -> &ManualTimer {
        &self.clock
    }

    pub fn controller(&self) -> &PumpController<RamStorage<STORAGE_SPAN>> {
        &self.controller
    }

    fn catch_up(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_step);
        self.last_step = now;
        self.clock.advance(PumpDuration::millis(elapsed.as_millis() as u64));
    }

    /// Runs loop iterations until every received line has its reply queued.
    pub fn step(&mut self) {
        self.catch_up();
        loop {
            let now = self.clock.now();
            if let Some(reply) = self.controller.poll(now, None, &mut LoggedMotors) {
                debug!("virtual reply '{}'", reply.as_str());
                self.outbox.extend(reply.as_bytes());
                self.outbox.push_back(LINE_TERMINATOR);
            }
            if self.controller.pending_lines() == 0 {
                break;
            }
        }
    }
}

impl Default for VirtualPump {
    fn default() -> Self {
        VirtualPump::new(VIRTUAL_LAYOUT)
    }
}

impl Write for VirtualPump {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.controller.receive(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for VirtualPump {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            self.step();
        }
        if self.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply pending"));
        }
        let count = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{send_command, ConsoleError};
    use fugit::ExtU64;

    #[test]
    fn test_answers_like_the_firmware() {
        let mut pump = VirtualPump::default();
        assert_eq!(send_command("p", &mut pump).unwrap(), "1.2");
        assert_eq!(send_command("s12100", &mut pump).unwrap(), "Set speed of pump: 1,2 to 100");
        assert_eq!(send_command("g", &mut pump).unwrap(), "S1M1:0,0;S1M2:100,0;");
        assert_eq!(send_command("a34", &mut pump).unwrap(), "Error: no board 3");
    }

    #[test]
    fn test_runs_end_on_the_manual_clock() {
        let mut pump = VirtualPump::default();
        send_command("s11200", &mut pump).unwrap();
        assert_eq!(send_command("r11f00005", &mut pump).unwrap(), "Started pump: 1,1 in the forward direction.");
        assert_eq!(send_command("g", &mut pump).unwrap(), "S1M1:200,1;S1M2:0,0;");

        pump.clock().advance(5.secs());
        assert_eq!(send_command("g", &mut pump).unwrap(), "S1M1:0,0;S1M2:0,0;");
        assert_eq!(pump.controller().pump().store().channels()[0].duty, 0);
    }

    #[test]
    fn test_read_without_request_times_out() {
        let mut pump = VirtualPump::default();
        assert!(matches!(crate::read_reply(&mut pump), Err(ConsoleError::RecvReply(e)) if e.kind() == io::ErrorKind::TimedOut));
    }
}
