use chrono::{Datelike, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::CycleError,
    types::{LocalTime, ZoneId, ZONE_COUNT},
};

/// Compiled events kept at once.
pub const EVENT_CAPACITY: usize = 1;

/// Longest single-zone run the persisted cycle can describe.
pub const MAX_ZONE_MINUTES: u8 = 34;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Candidate days examined per compile before giving up.
const MAX_SCAN_DAYS: usize = 7 * (EVENT_CAPACITY + 1);

/// Weekday set; bit 0 is Sunday, bit 6 is Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(pub u8);

impl DayMask {
    pub const ALL: DayMask = DayMask(0x7F);

    pub fn from_days(days: &[Weekday]) -> Self {
        Self(
            days.iter()
                .fold(0, |mask, day| mask | (1 << day.num_days_from_sunday())),
        )
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }
}

/// The operator's weekly watering plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterCycle {
    #[serde(rename = "startMinute")]
    pub start_minute: u16,
    #[serde(rename = "zoneMinutes")]
    pub zone_minutes: [u8; ZONE_COUNT],
    #[serde(rename = "activeDays")]
    pub active_days: DayMask,
    pub enabled: bool,
}

impl Default for WaterCycle {
    fn default() -> Self {
        Self {
            start_minute: 6 * 60,
            zone_minutes: [0; ZONE_COUNT],
            active_days: DayMask::default(),
            enabled: false,
        }
    }
}

impl WaterCycle {
    pub fn validate(&self) -> Result<(), CycleError> {
        if self.start_minute >= MINUTES_PER_DAY {
            return Err(CycleError::StartMinute(self.start_minute));
        }

        for zone in ZoneId::all() {
            let minutes = self.zone_minutes[zone.index()];
            if minutes > MAX_ZONE_MINUTES {
                return Err(CycleError::ZoneDuration {
                    zone,
                    minutes,
                    max: MAX_ZONE_MINUTES,
                });
            }
        }

        Ok(())
    }

    /// Whether this cycle can ever produce an event. A cycle with no
    /// watering minutes has nothing to run.
    pub fn is_runnable(&self) -> bool {
        self.enabled && !self.active_days.is_empty() && self.total_minutes() > 0
    }

    pub fn total_minutes(&self) -> u32 {
        self.zone_minutes.iter().map(|m| *m as u32).sum()
    }
}

/// One concrete run of the cycle. Zone `i` waters over
/// `[zone_stops[i - 1], zone_stops[i])`, zone 0 starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub start: LocalTime,
    #[serde(rename = "zoneStops")]
    pub zone_stops: [LocalTime; ZONE_COUNT],
}

impl Event {
    fn new(start: LocalTime, zone_minutes: &[u8; ZONE_COUNT]) -> Self {
        let mut zone_stops = [start; ZONE_COUNT];
        let mut cursor = start;
        for (stop, minutes) in zone_stops.iter_mut().zip(zone_minutes) {
            cursor += TimeDelta::minutes(*minutes as i64);
            *stop = cursor;
        }
        Self { start, zone_stops }
    }

    pub fn end(&self) -> LocalTime {
        self.zone_stops[ZONE_COUNT - 1]
    }

    pub fn zone_at(&self, now: LocalTime) -> Option<ZoneId> {
        if now < self.start {
            return None;
        }
        self.zone_stops
            .iter()
            .position(|stop| *stop > now)
            .map(|index| ZoneId(index as u8))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleEngine {
    events: Vec<Event>,
}

impl ScheduleEngine {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn compile(&mut self, cycle: &WaterCycle, now: Option<LocalTime>) {
        self.events.clear();

        let Some(now) = now else {
            debug!("schedule compile skipped: time unknown");
            return;
        };
        if !cycle.is_runnable() {
            debug!(enabled = cycle.enabled, "schedule compile skipped: cycle idle");
            return;
        }
        let Some(midnight) = now.date().and_hms_opt(0, 0, 0) else {
            return;
        };

        let mut candidate = midnight + TimeDelta::minutes(cycle.start_minute as i64);
        while candidate < now {
            candidate += TimeDelta::days(1);
        }

        let mut scanned = 0;
        while self.events.len() < EVENT_CAPACITY && scanned < MAX_SCAN_DAYS {
            if cycle.active_days.contains(candidate.weekday()) {
                self.events.push(Event::new(candidate, &cycle.zone_minutes));
            }
            candidate += TimeDelta::days(1);
            scanned += 1;
        }

        info!(
            events = self.events.len(),
            next = ?self.next_event_start(),
            "schedule compiled"
        );
    }

    pub fn active_zone(&self, cycle: &WaterCycle, now: Option<LocalTime>) -> Option<ZoneId> {
        if !cycle.enabled {
            return None;
        }
        let now = now?;
        self.events.iter().find_map(|event| event.zone_at(now))
    }

    pub fn is_stale(&self, now: LocalTime) -> bool {
        self.events.last().map_or(true, |event| now >= event.end())
    }

    pub fn next_event_start(&self) -> Option<LocalTime> {
        self.events.first().map(|event| event.start)
    }
}
