use common::storage::NvStorage;
use defmt::warn;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use generic::pump_error::PumpError;

/// AT24C32/64 page size.
const PAGE_SIZE: usize = 32;
/// Worst-case internal write cycle.
const WRITE_CYCLE_MS: u32 = 5;

/// AT24-series serial EEPROM with two address bytes.
pub struct At24Eeprom<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    capacity: u32,
}

impl<I2C: I2c, D: DelayNs> At24Eeprom<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8, capacity: u32) -> Self {
        At24Eeprom { i2c, delay, address, capacity }
    }

    fn check_range(&self, offset: u32, len: usize) -> bool {
        offset as u64 + len as u64 <= self.capacity as u64
    }
}

impl<I2C: I2c, D: DelayNs> NvStorage for At24Eeprom<I2C, D> {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), PumpError> {
        if !self.check_range(offset, buf.len()) {
            return Err(PumpError::StorageReadError);
        }
        let memory_address = (offset as u16).to_be_bytes();
        self.i2c.write_read(self.address, &memory_address, buf).map_err(|_| PumpError::StorageReadError)
    }

    /// Writes page by page; a write may not cross a page boundary.
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), PumpError> {
        if !self.check_range(offset, data.len()) {
            return Err(PumpError::StorageWriteError);
        }
        let mut offset = offset as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let room = PAGE_SIZE - offset % PAGE_SIZE;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));

            let mut frame = [0u8; PAGE_SIZE + 2];
            frame[..2].copy_from_slice(&(offset as u16).to_be_bytes());
            frame[2..2 + chunk.len()].copy_from_slice(chunk);
            if self.i2c.write(self.address, &frame[..2 + chunk.len()]).is_err() {
                warn!("eeprom write at {} failed", offset);
                return Err(PumpError::StorageWriteError);
            }
            self.delay.delay_ms(WRITE_CYCLE_MS);

            offset += chunk.len();
            rest = tail;
        }
        Ok(())
    }
}
