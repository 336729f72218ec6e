use generic::pump_error::ProtocolError;
use generic::pump_proto::ChannelAddress;

use crate::channel::{ChannelLayout, MotorDriver};
use crate::command::{interpret_line, reject_line, CommandLine, LineAssembler, Reply};
use crate::keypad::Key;
use crate::menu::Menu;
use crate::message_queue::{MessageQueue, MessageQueueInterface};
use crate::screen::Screen;
use crate::state::PumpState;
use crate::storage::NvStorage;
use crate::timer::PumpInstant;

pub const LINE_QUEUE_DEPTH: usize = 4;

/// One iteration of the control loop handles at most one key and one
/// command line, ticks the scheduler and pushes changed channels out.
pub struct PumpController<S: NvStorage> {
    pump: PumpState<S>,
    menu: Menu,
    assembler: LineAssembler,
    lines: MessageQueue<Result<CommandLine, ProtocolError>, LINE_QUEUE_DEPTH>,
    shown: Option<Screen>,
}

impl<S: NvStorage> PumpController<S> {
    pub fn new(storage: S, layout: ChannelLayout, local_channel: ChannelAddress) -> Self {
        PumpController {
            pump: PumpState::new(storage, layout, local_channel),
            menu: Menu::new(),
            assembler: LineAssembler::new(),
            lines: MessageQueue::new(),
            shown: None,
        }
    }

    pub fn with_message_hold(mut self, hold_ms: u64) -> Self {
        self.menu = Menu::with_message_hold(hold_ms);
        self
    }

    pub fn pump(&self) -> &PumpState<S> {
        &self.pump
    }

    pub fn pump_mut(&mut self) -> &mut PumpState<S> {
        &mut self.pump
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    /// Feeds bytes from the serial link. Complete lines wait for `poll`.
    pub fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(line) = self.assembler.push(byte) {
                if self.lines.enqueue(line).is_err() {
                    warn!("command queue full, line dropped");
                }
            }
        }
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    /// Returns the reply to the command line handled in this iteration.
    pub fn poll<D: MotorDriver>(&mut self, now: PumpInstant, key: Option<Key>, driver: &mut D) -> Option<Reply> {
        self.menu.tick(now);
        if let Some(key) = key {
            self.menu.handle_key(key, now, &mut self.pump);
        }

        let reply = self.lines.dequeue().map(|line| match line {
            Ok(line) => interpret_line(&line, now, &mut self.pump),
            Err(e) => reject_line(e),
        });

        let stopped = self.pump.scheduler_mut().tick(now);
        if !stopped.is_empty() {
            debug!("{} run(s) ended", stopped.len());
            self.pump.persist_channels();
        }

        // failed channels stay pending and are retried next iteration
        let _ = self.pump.sync(driver);
        reply
    }

    /// The screen to draw, only when it differs from the last one handed out.
    pub fn screen_update(&mut self, now: PumpInstant) -> Option<Screen> {
        let screen = self.menu.screen(&self.pump, now);
        if self.shown.as_ref() == Some(&screen) {
            return None;
        }
        self.shown = Some(screen.clone());
        Some(screen)
    }

    /// Forces the next `screen_update` to redraw, e.g. after a display error.
    pub fn invalidate_screen(&mut self) {
        self.shown = None;
    }
}
