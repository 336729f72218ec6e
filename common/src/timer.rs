use fugit::{TimerDurationU64, TimerInstantU64};

/// Millisecond resolution is plenty for runs measured in seconds.
pub type PumpInstant = TimerInstantU64<1_000>;
pub type PumpDuration = TimerDurationU64<1_000>;

pub trait PumpTimer {
    fn now(&self) -> PumpInstant;
}

/// Time elapsed since `start`, zero if the clock reads earlier than `start`.
pub fn elapsed_since(now: PumpInstant, start: PumpInstant) -> PumpDuration {
    now.checked_duration_since(start).unwrap_or(PumpDuration::from_ticks(0))
}

/// A hand-driven clock for host builds and tests.
#[derive(Debug, Default)]
pub struct ManualTimer {
    ticks: core::cell::Cell<u64>,
}

impl ManualTimer {
    pub fn new(start_ms: u64) -> Self {
        ManualTimer { ticks: core::cell::Cell::new(start_ms) }
    }

    pub fn set(&self, ms: u64) {
        self.ticks.set(ms);
    }

    pub fn advance(&self, duration: PumpDuration) {
        self.ticks.set(self.ticks.get() + duration.ticks());
    }
}

impl PumpTimer for ManualTimer {
    fn now(&self) -> PumpInstant {
        PumpInstant::from_ticks(self.ticks.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fugit::ExtU64;

    #[test]
    fn test_manual_timer() {
        let timer = ManualTimer::new(100);
        timer.advance(2.secs());
        assert_eq!(timer.now().ticks(), 2_100);
        assert_eq!(elapsed_since(timer.now(), PumpInstant::from_ticks(100)).ticks(), 2_000);
        assert_eq!(elapsed_since(PumpInstant::from_ticks(5), timer.now()).ticks(), 0);
    }
}
