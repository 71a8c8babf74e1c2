//! The controller context: every piece of core state, owned in one place
//! and driven by the host's tick.

use std::time::Instant;

use tracing::info;

use crate::{
    error::{ControlError, StorageError},
    layout::{load_cycle, save_cycle},
    log::{ActivityLog, LogEntry, LogEvent},
    schedule::{Event, ScheduleEngine, WaterCycle},
    storage::Eeprom,
    time::TimeSync,
    types::{ControllerStatus, LocalTime, Zone, ZoneId, ZONE_COUNT},
    zones::{Actuator, Journal, ZoneController},
};

pub struct Irrigator<E: Eeprom, A: Actuator> {
    eeprom: E,
    time: TimeSync,
    cycle: WaterCycle,
    schedule: ScheduleEngine,
    log: ActivityLog,
    zones: ZoneController<A>,
}

impl<E: Eeprom, A: Actuator> Irrigator<E, A> {
    /// Restores persisted state, forces every valve closed and records the
    /// reset.
    pub fn boot(
        mut eeprom: E,
        actuator: A,
        time: TimeSync,
        zone_names: &[String; ZONE_COUNT],
    ) -> Result<Self, StorageError> {
        let cycle = load_cycle(&eeprom)?;
        let log = ActivityLog::open(&mut eeprom)?;
        let mut zones = ZoneController::new(actuator, zone_names);
        zones.release_all();

        let mut irrigator = Self {
            eeprom,
            time,
            cycle,
            schedule: ScheduleEngine::new(),
            log,
            zones,
        };

        let now = irrigator.time.local_now();
        irrigator.journal(now).record(LogEvent::SystemReset);
        irrigator.zones.set_reset_time(now);

        info!(
            enabled = irrigator.cycle.enabled,
            log_entries = irrigator.log.len(),
            reset_time = ?now,
            "controller booted"
        );
        Ok(irrigator)
    }

    /// One control step: recompile when stale, then hand the schedule's
    /// wish to the zone controller.
    pub fn tick(&mut self, at: Instant) -> Result<(), ControlError> {
        let now = self.time.local_now_at(at);
        if let Some(now) = now {
            if self.schedule.is_stale(now) {
                self.schedule.compile(&self.cycle, Some(now));
            }
        }

        let wanted = self.schedule.active_zone(&self.cycle, now);
        let mut journal = Journal {
            eeprom: &mut self.eeprom,
            log: &mut self.log,
            now,
        };
        self.zones.apply_schedule(wanted, &mut journal)
    }

    /// Validates, persists and activates a replacement cycle.
    pub fn update_cycle(&mut self, cycle: WaterCycle, at: Instant) -> Result<(), ControlError> {
        cycle.validate()?;
        save_cycle(&mut self.eeprom, &cycle)?;
        info!(
            start_minute = cycle.start_minute,
            zone_minutes = ?cycle.zone_minutes,
            total_minutes = cycle.total_minutes(),
            active_days = cycle.active_days.0,
            enabled = cycle.enabled,
            "water cycle updated"
        );
        self.cycle = cycle;
        self.schedule.compile(&self.cycle, self.time.local_now_at(at));
        Ok(())
    }

    pub fn manual_on(&mut self, zone: ZoneId, at: Instant) -> Result<(), ControlError> {
        let now = self.time.local_now_at(at);
        let mut journal = Journal {
            eeprom: &mut self.eeprom,
            log: &mut self.log,
            now,
        };
        self.zones.manual_on(zone, &mut journal)
    }

    pub fn manual_off(&mut self, zone: ZoneId, at: Instant) -> Result<(), ControlError> {
        let now = self.time.local_now_at(at);
        let mut journal = Journal {
            eeprom: &mut self.eeprom,
            log: &mut self.log,
            now,
        };
        self.zones.manual_off(zone, &mut journal)
    }

    pub fn manual_all_off(&mut self, at: Instant) {
        let now = self.time.local_now_at(at);
        let mut journal = Journal {
            eeprom: &mut self.eeprom,
            log: &mut self.log,
            now,
        };
        self.zones.manual_all_off(&mut journal);
    }

    pub fn log_entries(&self) -> Result<Vec<LogEntry>, StorageError> {
        self.log.entries_newest_first(&self.eeprom)
    }

    pub fn clear_log(&mut self) -> Result<(), StorageError> {
        self.log.clear(&mut self.eeprom)?;
        info!("activity log cleared");
        Ok(())
    }

    pub fn status(&self, at: Instant) -> ControllerStatus {
        let utc = self.time.now_utc_at(at);
        let status = self.zones.status();
        ControllerStatus {
            mode: status.mode.as_str(),
            reset_time: status.reset_time,
            zones: self.zones.zones().to_vec(),
            active_zone: self.zones.active_zone(),
            time_synced: self.time.is_synced(),
            local_time: utc.map(|utc| self.time.to_local(utc)),
            is_dst: utc.is_some_and(|utc| self.time.is_dst(utc)),
            zone_abbrev: utc.map(|utc| self.time.abbreviation(utc)),
            cycle_enabled: self.cycle.enabled,
            next_event_start: self.schedule.next_event_start(),
            log_entries: self.log.len(),
        }
    }

    pub fn cycle(&self) -> &WaterCycle {
        &self.cycle
    }

    pub fn events(&self) -> &[Event] {
        self.schedule.events()
    }

    pub fn zones(&self) -> &[Zone] {
        self.zones.zones()
    }

    pub fn actuator(&self) -> &A {
        self.zones.actuator()
    }

    pub fn time(&self) -> &TimeSync {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeSync {
        &mut self.time
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    fn journal(&mut self, now: Option<LocalTime>) -> Journal<'_, E> {
        Journal {
            eeprom: &mut self.eeprom,
            log: &mut self.log,
            now,
        }
    }
}
