//! Persistent activity log: a ring of fixed-size records in EEPROM.
//!
//! The ring keeps one slot free so `head == tail` always means empty; it
//! holds at most `LOG_CAPACITY - 1` entries and evicts the oldest when full.

use chrono::DateTime;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::StorageError,
    layout::{LOG_ELEM_SIZE, LOG_HEADER_ADDR, LOG_RING},
    storage::Eeprom,
    types::{LocalTime, ZoneId},
};

/// Zone byte marking a system reset record.
pub const RESET_MARKER: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LogEvent {
    ZoneChange { zone: ZoneId, on: bool },
    SystemReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// `None` when the clock was unknown at the time of the event.
    pub timestamp: Option<LocalTime>,
    #[serde(flatten)]
    pub event: LogEvent,
}

impl LogEntry {
    fn encode(&self) -> [u8; LOG_ELEM_SIZE] {
        let secs = self
            .timestamp
            .and_then(|t| u32::try_from(t.and_utc().timestamp()).ok())
            .unwrap_or(0);
        let (zone, state) = match self.event {
            LogEvent::ZoneChange { zone, on } => (zone.0, u8::from(on)),
            LogEvent::SystemReset => (RESET_MARKER, 0),
        };

        let mut raw = [0_u8; LOG_ELEM_SIZE];
        raw[..4].copy_from_slice(&secs.to_le_bytes());
        raw[4] = zone;
        raw[5] = state;
        raw
    }

    fn decode(raw: &[u8; LOG_ELEM_SIZE]) -> Option<Self> {
        let secs = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let timestamp = match secs {
            0 => None,
            secs => DateTime::from_timestamp(secs as i64, 0).map(|t| t.naive_utc()),
        };

        let event = match raw[4] {
            RESET_MARKER => LogEvent::SystemReset,
            zone if ZoneId(zone).is_valid() => LogEvent::ZoneChange {
                zone: ZoneId(zone),
                on: raw[5] != 0,
            },
            _ => return None,
        };

        Some(Self { timestamp, event })
    }
}

/// Ring pointers; the records themselves live only in EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityLog {
    head: usize,
    tail: usize,
}

impl ActivityLog {
    /// Loads the ring pointers, resetting the log if either is not a valid
    /// slot offset.
    pub fn open(eeprom: &mut impl Eeprom) -> Result<Self, StorageError> {
        let head = eeprom.read_u16(LOG_HEADER_ADDR)? as usize;
        let tail = eeprom.read_u16(LOG_HEADER_ADDR + 2)? as usize;

        if LOG_RING.contains(head) && LOG_RING.contains(tail) {
            let log = Self { head, tail };
            debug!(entries = log.len(), "activity log opened");
            return Ok(log);
        }

        warn!(head, tail, "activity log pointers invalid, resetting log");
        let mut log = Self {
            head: LOG_RING.start,
            tail: LOG_RING.start,
        };
        log.clear(eeprom)?;
        Ok(log)
    }

    pub fn len(&self) -> usize {
        LOG_RING.len(self.head, self.tail)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn add(
        &mut self,
        eeprom: &mut impl Eeprom,
        event: LogEvent,
        timestamp: Option<LocalTime>,
    ) -> Result<(), StorageError> {
        let entry = LogEntry { timestamp, event };
        eeprom.write(self.head, &entry.encode())?;

        let head = LOG_RING.advance(self.head);
        let tail = if head == self.tail {
            LOG_RING.advance(self.tail)
        } else {
            self.tail
        };
        self.store_pointers(eeprom, head, tail)
    }

    pub fn clear(&mut self, eeprom: &mut impl Eeprom) -> Result<(), StorageError> {
        self.store_pointers(eeprom, LOG_RING.start, LOG_RING.start)
    }

    pub fn entries_newest_first(&self, eeprom: &impl Eeprom) -> Result<Vec<LogEntry>, StorageError> {
        let mut entries = Vec::with_capacity(self.len());
        let mut offset = self.head;
        while offset != self.tail {
            offset = LOG_RING.retreat(offset);
            let mut raw = [0_u8; LOG_ELEM_SIZE];
            eeprom.read(offset, &mut raw)?;
            match LogEntry::decode(&raw) {
                Some(entry) => entries.push(entry),
                None => debug!(offset, zone = raw[4], "skipping unreadable log record"),
            }
        }
        Ok(entries)
    }

    fn store_pointers(
        &mut self,
        eeprom: &mut impl Eeprom,
        head: usize,
        tail: usize,
    ) -> Result<(), StorageError> {
        let mut raw = [0_u8; 4];
        raw[..2].copy_from_slice(&(head as u16).to_le_bytes());
        raw[2..].copy_from_slice(&(tail as u16).to_le_bytes());
        eeprom.write(LOG_HEADER_ADDR, &raw)?;
        self.head = head;
        self.tail = tail;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::{EEPROM_SIZE, LOG_CAPACITY},
        storage::MemEeprom,
    };
    use chrono::{NaiveDate, TimeDelta};
    use pretty_assertions::assert_eq;

    fn base() -> LocalTime {
        NaiveDate::from_ymd_opt(2026, 5, 4)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn zone_event(i: usize) -> LogEvent {
        LogEvent::ZoneChange {
            zone: ZoneId((i % 4) as u8),
            on: i % 2 == 0,
        }
    }

    #[test]
    fn blank_device_opens_as_empty_log() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let log = ActivityLog::open(&mut eeprom).unwrap();

        assert!(log.is_empty());
        assert_eq!(eeprom.read_u16(LOG_HEADER_ADDR).unwrap(), 0x24);
        assert_eq!(eeprom.read_u16(LOG_HEADER_ADDR + 2).unwrap(), 0x24);
    }

    #[test]
    fn entries_come_back_newest_first() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();

        log.add(&mut eeprom, LogEvent::SystemReset, None).unwrap();
        let on = LogEvent::ZoneChange { zone: ZoneId(2), on: true };
        log.add(&mut eeprom, on, Some(base())).unwrap();

        let entries = log.entries_newest_first(&eeprom).unwrap();
        assert_eq!(
            entries,
            vec![
                LogEntry { timestamp: Some(base()), event: on },
                LogEntry { timestamp: None, event: LogEvent::SystemReset },
            ]
        );
    }

    #[test]
    fn full_ring_evicts_oldest_entries() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();

        let total = LOG_CAPACITY + 5;
        for i in 0..total {
            let at = base() + TimeDelta::minutes(i as i64);
            log.add(&mut eeprom, zone_event(i), Some(at)).unwrap();
        }

        let entries = log.entries_newest_first(&eeprom).unwrap();
        assert_eq!(entries.len(), LOG_CAPACITY - 1);
        assert_eq!(log.len(), LOG_CAPACITY - 1);
        for (n, entry) in entries.iter().enumerate() {
            let i = total - 1 - n;
            assert_eq!(entry.timestamp, Some(base() + TimeDelta::minutes(i as i64)));
            assert_eq!(entry.event, zone_event(i));
        }
    }

    #[test]
    fn clear_empties_the_log() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();
        log.add(&mut eeprom, LogEvent::SystemReset, Some(base())).unwrap();

        log.clear(&mut eeprom).unwrap();
        assert!(log.is_empty());
        assert!(log.entries_newest_first(&eeprom).unwrap().is_empty());
    }

    #[test]
    fn entries_persist_across_reopen() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();
        for i in 0..30 {
            log.add(&mut eeprom, zone_event(i), Some(base())).unwrap();
        }
        let before = log.entries_newest_first(&eeprom).unwrap();

        let reopened = ActivityLog::open(&mut eeprom).unwrap();
        assert_eq!(reopened, log);
        assert_eq!(reopened.entries_newest_first(&eeprom).unwrap(), before);
    }

    #[test]
    fn corrupt_pointers_reset_the_log() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();
        log.add(&mut eeprom, LogEvent::SystemReset, None).unwrap();

        // Misaligned head.
        eeprom.write_u16(LOG_HEADER_ADDR, 0x25).unwrap();
        let log = ActivityLog::open(&mut eeprom).unwrap();
        assert!(log.is_empty());
        assert_eq!(eeprom.read_u16(LOG_HEADER_ADDR).unwrap(), 0x24);
    }

    #[test]
    fn failed_write_leaves_pointers_unchanged() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();
        log.add(&mut eeprom, LogEvent::SystemReset, None).unwrap();

        eeprom.fail_writes(true);
        assert!(log.add(&mut eeprom, LogEvent::SystemReset, None).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn reset_marker_is_stored_in_zone_byte() {
        let mut eeprom = MemEeprom::new(EEPROM_SIZE);
        let mut log = ActivityLog::open(&mut eeprom).unwrap();
        log.add(&mut eeprom, LogEvent::SystemReset, None).unwrap();

        assert_eq!(&eeprom.as_bytes()[0x24..0x2A], &[0, 0, 0, 0, RESET_MARKER, 0]);
    }
}
