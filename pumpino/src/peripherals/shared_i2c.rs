use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation};

/// Bus handed out to every device on I2C0; installed once at start-up.
pub type I2cBus<I2C> = Mutex<RefCell<Option<I2C>>>;

#[derive(Debug)]
pub enum SharedI2cError<E> {
    /// The bus has not been installed yet.
    Unavailable,
    Bus(E),
}

impl<E: i2c::Error> i2c::Error for SharedI2cError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            SharedI2cError::Unavailable => ErrorKind::Other,
            SharedI2cError::Bus(e) => e.kind(),
        }
    }
}

/// One device's handle on the shared bus. Each transaction runs inside a
/// critical section so transfers from different devices never interleave.
pub struct SharedI2c<I2C: 'static> {
    bus: &'static I2cBus<I2C>,
}

impl<I2C> SharedI2c<I2C> {
    pub fn new(bus: &'static I2cBus<I2C>) -> Self {
        SharedI2c { bus }
    }
}

impl<I2C: I2c> ErrorType for SharedI2c<I2C> {
    type Error = SharedI2cError<I2C::Error>;
}

impl<I2C: I2c> I2c for SharedI2c<I2C> {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        critical_section::with(|cs| {
            let mut bus = self.bus.borrow_ref_mut(cs);
            let i2c = bus.as_mut().ok_or(SharedI2cError::Unavailable)?;
            i2c.transaction(address, operations).map_err(SharedI2cError::Bus)
        })
    }
}
