//! Fixed EEPROM map: persisted water cycle, log header, log ring.

use tracing::warn;

use crate::{
    error::StorageError,
    ring::RingRegion,
    schedule::{DayMask, WaterCycle},
    storage::Eeprom,
    types::ZONE_COUNT,
};

pub const EEPROM_SIZE: usize = 256;

pub const CYCLE_ADDR: usize = 0x00;
pub const CYCLE_LEN: usize = 2 + ZONE_COUNT + 2;

/// `head` then `tail`, both absolute byte offsets into the ring.
pub const LOG_HEADER_ADDR: usize = 0x20;
pub const RING_START: usize = 0x24;

/// Local seconds (u32 LE), zone byte, state byte.
pub const LOG_ELEM_SIZE: usize = 6;

/// Three on/off pairs per zone, plus one spare slot.
pub const LOG_CAPACITY: usize = 2 * ZONE_COUNT * 3 + 1;

pub const LOG_RING: RingRegion = RingRegion::new(RING_START, LOG_ELEM_SIZE, LOG_CAPACITY);

const _: () = assert!(CYCLE_ADDR + CYCLE_LEN <= LOG_HEADER_ADDR);
const _: () = assert!(LOG_RING.end() <= EEPROM_SIZE);

pub fn encode_cycle(cycle: &WaterCycle) -> [u8; CYCLE_LEN] {
    let mut raw = [0_u8; CYCLE_LEN];
    raw[..2].copy_from_slice(&cycle.start_minute.to_le_bytes());
    raw[2..2 + ZONE_COUNT].copy_from_slice(&cycle.zone_minutes);
    raw[2 + ZONE_COUNT] = cycle.active_days.0;
    raw[3 + ZONE_COUNT] = u8::from(cycle.enabled);
    raw
}

/// Decodes a stored cycle. Anything out of range (including erased
/// storage) comes back as the disabled default.
pub fn decode_cycle(raw: &[u8; CYCLE_LEN]) -> WaterCycle {
    let mut zone_minutes = [0_u8; ZONE_COUNT];
    zone_minutes.copy_from_slice(&raw[2..2 + ZONE_COUNT]);

    let cycle = WaterCycle {
        start_minute: u16::from_le_bytes([raw[0], raw[1]]),
        zone_minutes,
        active_days: DayMask(raw[2 + ZONE_COUNT] & DayMask::ALL.0),
        enabled: raw[3 + ZONE_COUNT] == 1,
    };

    match cycle.validate() {
        Ok(()) => cycle,
        Err(error) => {
            warn!(%error, "stored water cycle invalid, using disabled default");
            WaterCycle::default()
        }
    }
}

pub fn load_cycle(eeprom: &impl Eeprom) -> Result<WaterCycle, StorageError> {
    let mut raw = [0_u8; CYCLE_LEN];
    eeprom.read(CYCLE_ADDR, &mut raw)?;
    Ok(decode_cycle(&raw))
}

pub fn save_cycle(eeprom: &mut impl Eeprom, cycle: &WaterCycle) -> Result<(), StorageError> {
    eeprom.write(CYCLE_ADDR, &encode_cycle(cycle))
}
