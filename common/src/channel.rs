use generic::channel_status::RunState;
use generic::pump_error::{AddressError, PumpError};
use generic::pump_proto::ChannelAddress;
use heapless::Vec;

pub const MAX_BOARDS: u8 = 9;
pub const MAX_MOTORS_PER_BOARD: u8 = 4;
pub const MAX_CHANNELS: usize = MAX_BOARDS as usize * MAX_MOTORS_PER_BOARD as usize;

/// Hardware seam: whatever actually spins a motor.
pub trait MotorDriver {
    fn drive(&mut self, address: ChannelAddress, duty: u8, state: RunState) -> Result<(), PumpError>;
}

/// How many shields are stacked and how many motors each one carries.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelLayout {
    boards: u8,
    motors_per_board: u8,
}

impl ChannelLayout {
    pub const fn new(boards: u8, motors_per_board: u8) -> Self {
        let boards = if boards == 0 {
            1
        } else if boards > MAX_BOARDS {
            MAX_BOARDS
        } else {
            boards
        };
        let motors_per_board = if motors_per_board == 0 {
            1
        } else if motors_per_board > MAX_MOTORS_PER_BOARD {
            MAX_MOTORS_PER_BOARD
        } else {
            motors_per_board
        };
        ChannelLayout { boards, motors_per_board }
    }

    pub fn boards(&self) -> u8 {
        self.boards
    }

    pub fn motors_per_board(&self) -> u8 {
        self.motors_per_board
    }

    pub fn channel_count(&self) -> usize {
        self.boards as usize * self.motors_per_board as usize
    }

    pub fn index_of(&self, address: ChannelAddress) -> Result<usize, AddressError> {
        if address.board == 0 || address.board > self.boards {
            return Err(AddressError::BoardOutOfRange(address.board));
        }
        if address.motor == 0 || address.motor > self.motors_per_board {
            return Err(AddressError::MotorOutOfRange(address.motor));
        }
        Ok((address.board - 1) as usize * self.motors_per_board as usize + (address.motor - 1) as usize)
    }

    pub fn address_of(&self, index: usize) -> ChannelAddress {
        let per_board = self.motors_per_board as usize;
        ChannelAddress::new((index / per_board) as u8 + 1, (index % per_board) as u8 + 1)
    }

    /// All addresses, board-major.
    pub fn addresses(&self) -> impl Iterator<Item = ChannelAddress> + '_ {
        (0..self.channel_count()).map(move |i| self.address_of(i))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    duty: u8,
    state: RunState,
    /// Set whenever duty or state changes and not yet pushed to the driver.
    dirty: bool,
}

impl Channel {
    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// Every physical motor, owned by the control loop.
pub struct ChannelBank {
    layout: ChannelLayout,
    channels: Vec<Channel, MAX_CHANNELS>,
}

impl ChannelBank {
    pub fn new(layout: ChannelLayout) -> Self {
        let mut channels = Vec::new();
        for _ in 0..layout.channel_count() {
            // layout.channel_count() never exceeds MAX_CHANNELS
            let _ = channels.push(Channel { dirty: true, ..Channel::default() });
        }
        ChannelBank { layout, channels }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn get(&self, address: ChannelAddress) -> Result<&Channel, AddressError> {
        let index = self.layout.index_of(address)?;
        Ok(&self.channels[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelAddress, &Channel)> + '_ {
        self.channels.iter().enumerate().map(|(i, c)| (self.layout.address_of(i), c))
    }

    pub(crate) fn set_duty_at(&mut self, index: usize, duty: u8) {
        let channel = &mut self.channels[index];
        if channel.duty != duty {
            channel.duty = duty;
            channel.dirty = true;
        }
    }

    pub(crate) fn set_state_at(&mut self, index: usize, state: RunState) {
        let channel = &mut self.channels[index];
        if channel.state != state {
            channel.state = state;
            channel.dirty = true;
        }
    }

    pub(crate) fn channel_at(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    pub fn set_duty(&mut self, address: ChannelAddress, duty: u8) -> Result<(), AddressError> {
        let index = self.layout.index_of(address)?;
        self.set_duty_at(index, duty);
        Ok(())
    }

    /// Pushes every changed channel to the driver. A channel whose write
    /// fails stays dirty and is retried on the next call.
    pub fn sync<D: MotorDriver>(&mut self, driver: &mut D) -> Result<(), PumpError> {
        let mut result = Ok(());
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if !channel.dirty {
                continue;
            }
            let address = self.layout.address_of(i);
            match driver.drive(address, channel.duty, channel.state) {
                Ok(()) => channel.dirty = false,
                Err(e) => {
                    warn!("failed to drive S{}M{}: {:?}", address.board, address.motor, e);
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    /// Records every call so tests can check what reached the hardware.
    #[derive(Default)]
    pub(crate) struct RecordingDriver {
        pub calls: StdVec<(ChannelAddress, u8, RunState)>,
        pub fail: bool,
    }

    impl MotorDriver for RecordingDriver {
        fn drive(&mut self, address: ChannelAddress, duty: u8, state: RunState) -> Result<(), PumpError> {
            if self.fail {
                return Err(PumpError::MotorDriverError);
            }
            self.calls.push((address, duty, state));
            Ok(())
        }
    }

    #[test]
    fn test_layout_addressing() {
        let layout = ChannelLayout::new(2, 3);
        assert_eq!(layout.channel_count(), 6);
        assert_eq!(layout.index_of(ChannelAddress::new(1, 1)), Ok(0));
        assert_eq!(layout.index_of(ChannelAddress::new(2, 3)), Ok(5));
        assert_eq!(layout.index_of(ChannelAddress::new(3, 1)), Err(AddressError::BoardOutOfRange(3)));
        assert_eq!(layout.index_of(ChannelAddress::new(0, 1)), Err(AddressError::BoardOutOfRange(0)));
        assert_eq!(layout.index_of(ChannelAddress::new(1, 4)), Err(AddressError::MotorOutOfRange(4)));
        for (i, address) in layout.addresses().enumerate() {
            assert_eq!(layout.index_of(address), Ok(i));
        }
    }

    #[test]
    fn test_layout_is_clamped() {
        let layout = ChannelLayout::new(12, 7);
        assert_eq!(layout.boards(), MAX_BOARDS);
        assert_eq!(layout.motors_per_board(), MAX_MOTORS_PER_BOARD);
        assert_eq!(layout.channel_count(), MAX_CHANNELS);
    }

    #[test]
    fn test_sync_only_pushes_changes() {
        let mut bank = ChannelBank::new(ChannelLayout::new(1, 2));
        let mut driver = RecordingDriver::default();
        // everything is pushed once at start so the hardware matches
        bank.sync(&mut driver).unwrap();
        assert_eq!(driver.calls.len(), 2);

        driver.calls.clear();
        bank.set_duty(ChannelAddress::new(1, 2), 120).unwrap();
        bank.set_duty(ChannelAddress::new(1, 2), 120).unwrap();
        bank.sync(&mut driver).unwrap();
        assert_eq!(driver.calls, [(ChannelAddress::new(1, 2), 120, RunState::Stopped)]);

        driver.calls.clear();
        bank.sync(&mut driver).unwrap();
        assert!(driver.calls.is_empty());
    }

    #[test]
    fn test_failed_sync_is_retried() {
        let mut bank = ChannelBank::new(ChannelLayout::new(1, 1));
        let mut driver = RecordingDriver { fail: true, ..Default::default() };
        assert_eq!(bank.sync(&mut driver), Err(PumpError::MotorDriverError));
        driver.fail = false;
        bank.sync(&mut driver).unwrap();
        assert_eq!(driver.calls, [(ChannelAddress::new(1, 1), 0, RunState::Stopped)]);
        bank.sync(&mut driver).unwrap();
        assert_eq!(driver.calls.len(), 1);
    }
}
