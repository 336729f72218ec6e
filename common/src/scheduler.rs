//! Timed runs. A run is a channel put in motion together with the instant
//! it started and how long it should last; `tick` is the only place a run
//! ends on its own.

use generic::channel_status::RunState;
use generic::pump_error::{AddressError, ConfigError, PumpError};
use generic::pump_proto::{ChannelAddress, MotorDirection};
use heapless::Vec;

use crate::channel::{Channel, ChannelBank, ChannelLayout, MotorDriver, MAX_CHANNELS};
use crate::storage::ChannelSnapshot;
use crate::timer::{elapsed_since, PumpDuration, PumpInstant};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunTimer {
    pub started: PumpInstant,
    pub duration: PumpDuration,
}

impl RunTimer {
    pub fn is_expired(&self, now: PumpInstant) -> bool {
        elapsed_since(now, self.started) >= self.duration
    }

    pub fn remaining(&self, now: PumpInstant) -> PumpDuration {
        self.duration.checked_sub(elapsed_since(now, self.started)).unwrap_or(PumpDuration::from_ticks(0))
    }
}

fn run_state(direction: MotorDirection) -> RunState {
    match direction {
        MotorDirection::Forward => RunState::Forward,
        MotorDirection::Backward => RunState::Backward,
    }
}

pub struct ActuationScheduler {
    bank: ChannelBank,
    timers: [Option<RunTimer>; MAX_CHANNELS],
}

impl ActuationScheduler {
    pub fn new(layout: ChannelLayout) -> Self {
        ActuationScheduler { bank: ChannelBank::new(layout), timers: [None; MAX_CHANNELS] }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.bank.layout()
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    pub fn channel(&self, address: ChannelAddress) -> Result<&Channel, AddressError> {
        self.bank.get(address)
    }

    pub fn set_duty(&mut self, address: ChannelAddress, duty: u8) -> Result<(), AddressError> {
        self.bank.set_duty(address, duty)
    }

    /// Sets the channel moving and arms its timer, replacing any run already
    /// in progress on it.
    pub fn start(
        &mut self,
        address: ChannelAddress,
        direction: MotorDirection,
        duration: PumpDuration,
        now: PumpInstant,
    ) -> Result<(), PumpError> {
        let index = self.bank.layout().index_of(address)?;
        if duration.ticks() == 0 {
            return Err(ConfigError::ZeroDuration.into());
        }
        self.bank.set_state_at(index, run_state(direction));
        self.timers[index] = Some(RunTimer { started: now, duration });
        info!(
            "S{}M{} {} for {} ms at duty {}",
            address.board,
            address.motor,
            direction.name(),
            duration.ticks(),
            self.bank.channel_at(index).duty()
        );
        Ok(())
    }

    fn halt(&mut self, index: usize) {
        self.bank.set_state_at(index, RunState::Stopped);
        self.bank.set_duty_at(index, 0);
        self.timers[index] = None;
    }

    /// Stops every run whose time is up and returns the stopped channels.
    pub fn tick(&mut self, now: PumpInstant) -> Vec<ChannelAddress, MAX_CHANNELS> {
        let mut stopped = Vec::new();
        for index in 0..self.bank.layout().channel_count() {
            let expired = matches!(self.timers[index], Some(timer) if timer.is_expired(now));
            if expired {
                self.halt(index);
                let address = self.bank.layout().address_of(index);
                info!("S{}M{} finished its run", address.board, address.motor);
                // at most channel_count entries
                let _ = stopped.push(address);
            }
        }
        stopped
    }

    pub fn stop(&mut self, address: ChannelAddress) -> Result<(), AddressError> {
        let index = self.bank.layout().index_of(address)?;
        self.halt(index);
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for index in 0..self.bank.layout().channel_count() {
            self.halt(index);
        }
        info!("all channels stopped");
    }

    pub fn is_running(&self, address: ChannelAddress) -> bool {
        self.bank.get(address).map(|c| c.is_running()).unwrap_or(false)
    }

    pub fn remaining(&self, address: ChannelAddress, now: PumpInstant) -> Option<PumpDuration> {
        let index = self.bank.layout().index_of(address).ok()?;
        self.timers[index].map(|timer| timer.remaining(now))
    }

    /// Brings back persisted duties. Every channel comes back stopped.
    pub fn restore(&mut self, snapshots: &[ChannelSnapshot]) {
        let count = self.bank.layout().channel_count();
        for (index, snapshot) in snapshots.iter().take(count).enumerate() {
            self.bank.set_duty_at(index, snapshot.duty);
            self.bank.set_state_at(index, RunState::Stopped);
            self.timers[index] = None;
        }
    }

    pub fn sync<D: MotorDriver>(&mut self, driver: &mut D) -> Result<(), PumpError> {
        self.bank.sync(driver)
    }
}
