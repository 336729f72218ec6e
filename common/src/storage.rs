//! Power-loss safe persistence of the calibration and the channel duties.
//!
//! The record lives twice in non-volatile memory. Every save goes to the slot
//! that does not hold the current record, with the generation bumped, so a
//! torn write leaves the older complete record readable.

use generic::channel_status::RunState;
use generic::pump_error::PumpError;

use crate::calibration::{Calibration, FlowUnit, PumpDirection};
use crate::channel::{ChannelBank, MAX_CHANNELS};

pub const RECORD_MARKER: u8 = 0x5A;
pub const RECORD_VERSION: u8 = 1;
pub const RECORD_LEN: usize = 94;
pub const SLOT_A_OFFSET: u32 = 0;
pub const SLOT_B_OFFSET: u32 = 128;
/// Bytes a backing store must provide for both slots.
pub const STORAGE_SPAN: usize = SLOT_B_OFFSET as usize + RECORD_LEN;

const GENERATION_AT: usize = 2;
const RATE_AT: usize = 6;
const DIAMETER_AT: usize = 10;
const UNIT_AT: usize = 14;
const DIRECTION_AT: usize = 15;
const VOLUME_AT: usize = 16;
const CHANNELS_AT: usize = 20;
const CHECKSUM_AT: usize = CHANNELS_AT + 2 * MAX_CHANNELS;

const ERASED: u8 = 0xFF;

/// Byte-addressed non-volatile memory.
pub trait NvStorage {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), PumpError>;
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), PumpError>;
}

/// Volatile stand-in, erased to `0xFF` like a fresh EEPROM.
#[derive(Clone)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
    /// Bytes still accepted before writes start failing, `None` for unlimited.
    write_budget: Option<usize>,
}

impl<const N: usize> RamStorage<N> {
    pub fn new() -> Self {
        RamStorage { bytes: [ERASED; N], write_budget: None }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Simulates power loss: only the next `bytes` bytes written land.
    pub fn cut_power_after(&mut self, bytes: usize) {
        self.write_budget = Some(bytes);
    }

    pub fn restore_power(&mut self) {
        self.write_budget = None;
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NvStorage for RamStorage<N> {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), PumpError> {
        let start = offset as usize;
        let src = self.bytes.get(start..start + buf.len()).ok_or(PumpError::StorageReadError)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), PumpError> {
        let start = offset as usize;
        let dst = self.bytes.get_mut(start..start + data.len()).ok_or(PumpError::StorageWriteError)?;
        match self.write_budget {
            None => {
                dst.copy_from_slice(data);
                Ok(())
            }
            Some(budget) => {
                let landed = budget.min(data.len());
                dst[..landed].copy_from_slice(&data[..landed]);
                self.write_budget = Some(budget - landed);
                if landed < data.len() {
                    Err(PumpError::StorageWriteError)
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSnapshot {
    pub duty: u8,
    pub state: RunState,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistedState {
    pub calibration: Calibration,
    pub channels: [ChannelSnapshot; MAX_CHANNELS],
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState { calibration: Calibration::default(), channels: [ChannelSnapshot::default(); MAX_CHANNELS] }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn offset(self) -> u32 {
        match self {
            Slot::A => SLOT_A_OFFSET,
            Slot::B => SLOT_B_OFFSET,
        }
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum1: u16 = 0;
    let mut sum2: u16 = 0;
    for &byte in data {
        sum1 = (sum1 + byte as u16) % 255;
        sum2 = (sum2 + sum1) % 255;
    }
    (sum2 << 8) | sum1
}

fn read_u32(record: &[u8; RECORD_LEN], at: usize) -> u32 {
    u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
}

fn read_f32(record: &[u8; RECORD_LEN], at: usize) -> f32 {
    f32::from_bits(read_u32(record, at))
}

pub fn encode_record(state: &PersistedState, generation: u32) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    let calibration = &state.calibration;
    record[0] = RECORD_MARKER;
    record[1] = RECORD_VERSION;
    record[GENERATION_AT..RATE_AT].copy_from_slice(&generation.to_le_bytes());
    record[RATE_AT..DIAMETER_AT].copy_from_slice(&calibration.rate().to_le_bytes());
    record[DIAMETER_AT..UNIT_AT].copy_from_slice(&calibration.diameter_mm().to_le_bytes());
    record[UNIT_AT] = calibration.flow_unit().code();
    record[DIRECTION_AT] = calibration.direction().code();
    record[VOLUME_AT..CHANNELS_AT].copy_from_slice(&calibration.target_volume_hundredths().to_le_bytes());
    for (i, channel) in state.channels.iter().enumerate() {
        record[CHANNELS_AT + 2 * i] = channel.duty;
        record[CHANNELS_AT + 2 * i + 1] = channel.state.code();
    }
    let checksum = fletcher16(&record[..CHECKSUM_AT]);
    record[CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
    record
}

/// Returns the generation and contents of a complete, valid record.
pub fn decode_record(record: &[u8; RECORD_LEN]) -> Option<(u32, PersistedState)> {
    if record[0] != RECORD_MARKER || record[1] != RECORD_VERSION {
        return None;
    }
    let stored = u16::from_le_bytes([record[CHECKSUM_AT], record[CHECKSUM_AT + 1]]);
    if stored != fletcher16(&record[..CHECKSUM_AT]) {
        return None;
    }
    let calibration = Calibration::new(
        read_f32(record, RATE_AT),
        read_f32(record, DIAMETER_AT),
        FlowUnit::from_code(record[UNIT_AT]).ok()?,
        PumpDirection::from_code(record[DIRECTION_AT]).ok()?,
        read_u32(record, VOLUME_AT),
    )
    .ok()?;
    let mut channels = [ChannelSnapshot::default(); MAX_CHANNELS];
    for (i, channel) in channels.iter_mut().enumerate() {
        channel.duty = record[CHANNELS_AT + 2 * i];
        channel.state = RunState::from_code(record[CHANNELS_AT + 2 * i + 1])?;
    }
    Some((read_u32(record, GENERATION_AT), PersistedState { calibration, channels }))
}

pub struct CalibrationStore<S: NvStorage> {
    storage: S,
    state: PersistedState,
    generation: u32,
    /// Slot holding the newest valid record, if any.
    active: Option<Slot>,
}

impl<S: NvStorage> CalibrationStore<S> {
    pub fn new(storage: S) -> Self {
        CalibrationStore { storage, state: PersistedState::default(), generation: 0, active: None }
    }

    fn read_slot(&mut self, slot: Slot) -> Option<(u32, PersistedState)> {
        let mut record = [0u8; RECORD_LEN];
        match self.storage.read(slot.offset(), &mut record) {
            Ok(()) => decode_record(&record),
            Err(e) => {
                error!("reading slot {:?} failed: {:?}", slot, e);
                None
            }
        }
    }

    /// Reads the newest valid record. With none present the defaults are
    /// written back so the next boot finds an initialized store.
    pub fn load(&mut self) -> Calibration {
        let newest = match (self.read_slot(Slot::A), self.read_slot(Slot::B)) {
            (Some(a), Some(b)) if b.0 > a.0 => Some((Slot::B, b)),
            (Some(a), _) => Some((Slot::A, a)),
            (None, Some(b)) => Some((Slot::B, b)),
            (None, None) => None,
        };
        match newest {
            Some((slot, (generation, state))) => {
                info!("loaded calibration generation {} from slot {:?}", generation, slot);
                self.state = state;
                self.generation = generation;
                self.active = Some(slot);
            }
            None => {
                warn!("{}", PumpError::StorageUninitialized);
                self.state = PersistedState::default();
                self.generation = 0;
                self.active = None;
                if let Err(e) = self.persist() {
                    error!("writing defaults failed: {:?}", e);
                }
            }
        }
        self.state.calibration
    }

    fn persist(&mut self) -> Result<(), PumpError> {
        let slot = self.active.map_or(Slot::A, Slot::other);
        let generation = self.generation.wrapping_add(1);
        let record = encode_record(&self.state, generation);
        let offset = slot.offset();
        // the old marker is erased first and the new one goes last, so a
        // torn write never looks like a record
        self.storage.write(offset, &[ERASED])?;
        self.storage.write(offset + 1, &record[1..])?;
        self.storage.write(offset, &record[..1])?;
        debug!("saved generation {} to slot {:?}", generation, slot);
        self.generation = generation;
        self.active = Some(slot);
        Ok(())
    }

    pub fn calibration(&self) -> &Calibration {
        &self.state.calibration
    }

    pub fn channels(&self) -> &[ChannelSnapshot; MAX_CHANNELS] {
        &self.state.channels
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn active_slot(&self) -> Option<Slot> {
        self.active
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Replaces the whole calibration and persists it. The in-memory copy is
    /// updated even if the write fails.
    pub fn save(&mut self, calibration: Calibration) -> Result<(), PumpError> {
        self.state.calibration = calibration;
        self.persist()
    }

    /// Records the current duty and state of every channel. After a failed
    /// write the next call writes again.
    pub fn save_channels(&mut self, bank: &ChannelBank) -> Result<(), PumpError> {
        let mut channels = [ChannelSnapshot::default(); MAX_CHANNELS];
        for ((_, channel), snapshot) in bank.iter().zip(channels.iter_mut()) {
            snapshot.duty = channel.duty();
            snapshot.state = channel.state();
        }
        if channels == self.state.channels {
            return Ok(());
        }
        let previous = core::mem::replace(&mut self.state.channels, channels);
        let result = self.persist();
        if result.is_err() {
            self.state.channels = previous;
        }
        result
    }

    fn update<F>(&mut self, apply: F) -> Result<(), PumpError>
    where
        F: FnOnce(&mut Calibration) -> Result<(), PumpError>,
    {
        let mut candidate = self.state.calibration;
        apply(&mut candidate)?;
        self.save(candidate)
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<(), PumpError> {
        self.update(|c| Ok(c.set_rate(rate)?))
    }

    pub fn set_diameter(&mut self, diameter_mm: f32) -> Result<(), PumpError> {
        self.update(|c| Ok(c.set_diameter(diameter_mm)?))
    }

    pub fn set_flow_unit(&mut self, flow_unit: FlowUnit) -> Result<(), PumpError> {
        self.update(|c| {
            c.set_flow_unit(flow_unit);
            Ok(())
        })
    }

    pub fn set_direction(&mut self, direction: PumpDirection) -> Result<(), PumpError> {
        self.update(|c| {
            c.set_direction(direction);
            Ok(())
        })
    }

    pub fn set_target_volume(&mut self, volume: f32) -> Result<(), PumpError> {
        self.update(|c| Ok(c.set_target_volume(volume)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::REFERENCE_DIAMETER_MM;
    use crate::channel::ChannelLayout;
    use generic::pump_error::ConfigError;
    use generic::pump_proto::ChannelAddress;

    type Eeprom = RamStorage<256>;

    fn sample() -> Calibration {
        Calibration::new(2.5, 20.3, FlowUnit::MicrolitersPerMinute, PumpDirection::Withdraw, 12_345).unwrap()
    }

    #[test]
    fn test_uninitialized_store_writes_defaults() {
        let mut store = CalibrationStore::new(Eeprom::new());
        assert_eq!(store.load(), Calibration::default());
        assert_eq!(store.storage().bytes()[0], RECORD_MARKER);
        assert_eq!(store.active_slot(), Some(Slot::A));

        let mut reopened = CalibrationStore::new(store.storage);
        assert_eq!(reopened.load(), Calibration::default());
        assert_eq!(reopened.generation(), 1);
    }

    #[test]
    fn test_save_then_load() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        store.save(sample()).unwrap();

        let mut reopened = CalibrationStore::new(store.storage);
        assert_eq!(reopened.load(), sample());
        assert!((reopened.calibration().diameter_scale() - sample().diameter_scale()).abs() < 1e-6);
    }

    #[test]
    fn test_save_then_load_edge_values() {
        let rates = [f32::MIN_POSITIVE, 0.001, 1.0, 26.0, 1.0e9, f32::MAX];
        let diameters = [f32::MIN_POSITIVE, 0.5, REFERENCE_DIAMETER_MM, 1.0e6, f32::MAX];
        let volumes = [0, 1, 100, u32::MAX];
        let directions = [PumpDirection::Infuse, PumpDirection::Withdraw];

        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        for (i, &unit) in FlowUnit::ALL.iter().enumerate() {
            for (j, &direction) in directions.iter().enumerate() {
                for &rate in &rates {
                    for &diameter in &diameters {
                        let volume = volumes[(i + j) % volumes.len()];
                        let calibration = Calibration::new(rate, diameter, unit, direction, volume).unwrap();
                        store.save(calibration).unwrap();

                        let mut reopened = CalibrationStore::new(store.storage().clone());
                        assert_eq!(reopened.load(), calibration);
                        assert_eq!(reopened.generation(), store.generation());
                    }
                }
            }
        }
    }

    #[test]
    fn test_saves_alternate_slots() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        assert_eq!(store.active_slot(), Some(Slot::A));
        store.set_rate(3.0).unwrap();
        assert_eq!(store.active_slot(), Some(Slot::B));
        store.set_rate(4.0).unwrap();
        assert_eq!(store.active_slot(), Some(Slot::A));
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn test_torn_write_keeps_previous_record() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        store.save(sample()).unwrap();

        let mut newer = sample();
        newer.set_rate(9.0).unwrap();
        store.storage_mut().cut_power_after(40);
        assert_eq!(store.save(newer), Err(PumpError::StorageWriteError));

        let mut storage = store.storage;
        storage.restore_power();
        let mut reopened = CalibrationStore::new(storage);
        assert_eq!(reopened.load(), sample());
    }

    #[test]
    fn test_torn_write_clears_old_marker() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        store.save(sample()).unwrap();
        assert_eq!(store.active_slot(), Some(Slot::B));
        // slot A still holds the defaults record and is the next target
        assert_eq!(store.storage().bytes()[SLOT_A_OFFSET as usize], RECORD_MARKER);

        let mut newer = sample();
        newer.set_rate(9.0).unwrap();
        store.storage_mut().cut_power_after(20);
        assert!(store.save(newer).is_err());
        assert_ne!(store.storage().bytes()[SLOT_A_OFFSET as usize], RECORD_MARKER);

        let mut storage = store.storage;
        storage.restore_power();
        let mut reopened = CalibrationStore::new(storage);
        assert_eq!(reopened.load(), sample());
        assert_eq!(reopened.active_slot(), Some(Slot::B));
    }

    #[test]
    fn test_corrupted_newest_slot_falls_back() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        store.save(sample()).unwrap();
        assert_eq!(store.active_slot(), Some(Slot::B));

        let mut storage = store.storage;
        storage.bytes_mut()[SLOT_B_OFFSET as usize + RATE_AT] ^= 0x40;
        let mut reopened = CalibrationStore::new(storage);
        assert_eq!(reopened.load(), Calibration::default());
        assert_eq!(reopened.active_slot(), Some(Slot::A));
    }

    #[test]
    fn test_unknown_version_is_uninitialized() {
        let mut storage = Eeprom::new();
        let mut record = encode_record(&PersistedState { calibration: sample(), ..Default::default() }, 7);
        record[1] = RECORD_VERSION + 1;
        storage.bytes_mut()[..RECORD_LEN].copy_from_slice(&record);
        let mut store = CalibrationStore::new(storage);
        assert_eq!(store.load(), Calibration::default());
    }

    #[test]
    fn test_setter_validation_keeps_record() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        let generation = store.generation();
        assert_eq!(store.set_diameter(-2.0), Err(PumpError::Config(ConfigError::NonPositiveDiameter)));
        assert_eq!(store.set_target_volume(f32::NAN), Err(PumpError::Config(ConfigError::VolumeOutOfRange)));
        assert_eq!(store.generation(), generation);
        assert_eq!(*store.calibration(), Calibration::default());

        store.set_flow_unit(FlowUnit::Percent).unwrap();
        store.set_direction(PumpDirection::Withdraw).unwrap();
        store.set_target_volume(0.5).unwrap();
        let mut reopened = CalibrationStore::new(store.storage);
        let loaded = reopened.load();
        assert_eq!(loaded.flow_unit(), FlowUnit::Percent);
        assert_eq!(loaded.direction(), PumpDirection::Withdraw);
        assert_eq!(loaded.target_volume_hundredths(), 50);
    }

    #[test]
    fn test_channel_snapshot_persists() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        let mut bank = ChannelBank::new(ChannelLayout::new(2, 2));
        bank.set_duty(ChannelAddress::new(2, 1), 180).unwrap();
        store.save_channels(&bank).unwrap();
        let generation = store.generation();
        // unchanged duties are not rewritten
        store.save_channels(&bank).unwrap();
        assert_eq!(store.generation(), generation);

        let mut reopened = CalibrationStore::new(store.storage);
        reopened.load();
        assert_eq!(reopened.channels()[2], ChannelSnapshot { duty: 180, state: RunState::Stopped });
    }

    #[test]
    fn test_failed_channel_save_is_retried() {
        let mut store = CalibrationStore::new(Eeprom::new());
        store.load();
        let generation = store.generation();
        let mut bank = ChannelBank::new(ChannelLayout::new(1, 2));
        bank.set_duty(ChannelAddress::new(1, 2), 90).unwrap();

        store.storage_mut().cut_power_after(0);
        assert_eq!(store.save_channels(&bank), Err(PumpError::StorageWriteError));
        assert_eq!(store.channels()[1], ChannelSnapshot::default());
        assert_eq!(store.generation(), generation);

        store.storage_mut().restore_power();
        store.save_channels(&bank).unwrap();
        assert_eq!(store.generation(), generation + 1);
        let mut reopened = CalibrationStore::new(store.storage);
        reopened.load();
        assert_eq!(reopened.channels()[1], ChannelSnapshot { duty: 90, state: RunState::Stopped });
    }

    #[test]
    fn test_fletcher16() {
        assert_eq!(fletcher16(b"abcde"), 0xC8F0);
        assert_eq!(fletcher16(b"abcdef"), 0x2057);
    }
}
