use generic::pump_error::{ConfigError, PumpError};
use generic::pump_proto::ChannelAddress;

use crate::calibration::Calibration;
use crate::channel::{ChannelLayout, MotorDriver};
use crate::flow_rate::{map_flow_rate, GearSelection};
use crate::scheduler::ActuationScheduler;
use crate::storage::{CalibrationStore, NvStorage};
use crate::timer::{PumpDuration, PumpInstant};

/// Everything the control loop mutates, owned in one place and lent to
/// the menu and the command interpreter in turn.
pub struct PumpState<S: NvStorage> {
    store: CalibrationStore<S>,
    scheduler: ActuationScheduler,
    gear: GearSelection,
    target: Result<PumpDuration, ConfigError>,
    local_channel: ChannelAddress,
}

impl<S: NvStorage> PumpState<S> {
    /// Loads the stored calibration and channel duties; nothing runs after boot.
    pub fn new(storage: S, layout: ChannelLayout, local_channel: ChannelAddress) -> Self {
        let mut store = CalibrationStore::new(storage);
        let calibration = store.load();
        let mut scheduler = ActuationScheduler::new(layout);
        scheduler.restore(store.channels());
        if layout.index_of(local_channel).is_err() {
            warn!("local channel S{}M{} is not fitted", local_channel.board, local_channel.motor);
        }
        PumpState {
            store,
            scheduler,
            gear: map_flow_rate(&calibration),
            target: calibration.target_duration(),
            local_channel,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        self.store.calibration()
    }

    pub fn store(&self) -> &CalibrationStore<S> {
        &self.store
    }

    pub fn scheduler(&self) -> &ActuationScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut ActuationScheduler {
        &mut self.scheduler
    }

    pub fn gear(&self) -> GearSelection {
        self.gear
    }

    pub fn target_duration(&self) -> Result<PumpDuration, ConfigError> {
        self.target
    }

    pub fn local_channel(&self) -> ChannelAddress {
        self.local_channel
    }

    /// Adopts an already validated calibration: gear and run time are
    /// recomputed and the record is persisted. A failed write still leaves
    /// the new calibration in effect.
    pub fn commit(&mut self, candidate: Calibration) -> Result<(), PumpError> {
        self.gear = map_flow_rate(&candidate);
        self.target = candidate.target_duration();
        self.store.save(candidate)
    }

    /// Runs the local channel at the mapped duty for the time the configured
    /// volume takes. Returns that time.
    pub fn start_local(&mut self, now: PumpInstant) -> Result<PumpDuration, PumpError> {
        let duration = self.target?;
        let address = self.local_channel;
        self.scheduler.set_duty(address, self.gear.duty)?;
        self.scheduler.start(address, self.calibration().direction().motor_direction(), duration, now)?;
        Ok(duration)
    }

    pub fn save_channels(&mut self) -> Result<(), PumpError> {
        self.store.save_channels(self.scheduler.bank())
    }

    /// Called after any duty or state change so a reboot sees the same
    /// duties. Write failures are logged only.
    pub fn persist_channels(&mut self) {
        if let Err(e) = self.save_channels() {
            error!("saving channel duties failed: {:?}", e);
        }
    }

    pub fn sync<D: MotorDriver>(&mut self, driver: &mut D) -> Result<(), PumpError> {
        self.scheduler.sync(driver)
    }

    pub fn into_storage(self) -> S {
        self.store.into_storage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{FlowUnit, PumpDirection};
    use crate::storage::RamStorage;
    use generic::channel_status::RunState;

    const LOCAL: ChannelAddress = ChannelAddress::new(1, 1);

    fn state() -> PumpState<RamStorage<256>> {
        PumpState::new(RamStorage::new(), ChannelLayout::new(1, 2), LOCAL)
    }

    #[test]
    fn test_commit_recomputes_and_persists() {
        let mut s = state();
        let candidate =
            Calibration::new(2.0, 14.5, FlowUnit::MicrolitersPerSecond, PumpDirection::Withdraw, 1_000).unwrap();
        s.commit(candidate).unwrap();
        assert_eq!(s.target_duration().map(|d| d.ticks()), Ok(5_000));
        assert_eq!(s.gear(), map_flow_rate(&candidate));
        assert_eq!(s.store().generation(), 2);
    }

    #[test]
    fn test_start_local_uses_direction_and_duty() {
        let mut s = state();
        let duration = s.start_local(PumpInstant::from_ticks(0)).unwrap();
        // default: 1.00 ml at 1 ml/min
        assert_eq!(duration.ticks(), 60_000);
        let channel = s.scheduler().channel(LOCAL).unwrap();
        assert_eq!(channel.state(), RunState::Forward);
        assert_eq!(channel.duty(), s.gear().duty);
    }

    #[test]
    fn test_percent_rate_cannot_start_local() {
        let mut s = state();
        let mut candidate = *s.calibration();
        candidate.set_flow_unit(FlowUnit::Percent);
        s.commit(candidate).unwrap();
        assert_eq!(
            s.start_local(PumpInstant::from_ticks(0)),
            Err(PumpError::Config(ConfigError::PercentRateNotTimed))
        );
        assert!(!s.scheduler().is_running(LOCAL));
    }

    #[test]
    fn test_boot_restores_duties_stopped() {
        let mut s = state();
        s.scheduler_mut().set_duty(ChannelAddress::new(1, 2), 77).unwrap();
        s.save_channels().unwrap();
        s.start_local(PumpInstant::from_ticks(0)).unwrap();
        s.save_channels().unwrap();

        let rebooted = PumpState::new(s.into_storage(), ChannelLayout::new(1, 2), LOCAL);
        assert_eq!(rebooted.scheduler().channel(ChannelAddress::new(1, 2)).unwrap().duty(), 77);
        assert!(!rebooted.scheduler().is_running(LOCAL));
    }
}
