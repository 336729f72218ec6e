use common::timer::{PumpInstant, PumpTimer};
use rp2040_hal::Timer;

/// The RP2040 free-running microsecond counter, read in milliseconds.
#[derive(Copy, Clone)]
pub struct Rp2040Timer(Timer);

impl Rp2040Timer {
    pub fn new(timer: Timer) -> Self {
        Rp2040Timer(timer)
    }
}

impl PumpTimer for Rp2040Timer {
    fn now(&self) -> PumpInstant {
        PumpInstant::from_ticks(self.0.get_counter().ticks() / 1_000)
    }
}
