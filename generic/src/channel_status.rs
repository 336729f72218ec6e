#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    #[default]
    Stopped,
    Forward,
    Backward,
}

impl RunState {
    /// Numeric code used by the status reply and the persisted record.
    pub fn code(self) -> u8 {
        match self {
            RunState::Stopped => 0,
            RunState::Forward => 1,
            RunState::Backward => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RunState::Stopped),
            1 => Some(RunState::Forward),
            2 => Some(RunState::Backward),
            _ => None,
        }
    }

    pub fn is_running(self) -> bool {
        !matches!(self, RunState::Stopped)
    }
}
