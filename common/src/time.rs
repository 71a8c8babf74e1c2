//! Time base: UTC anchored by network sync, converted to zone-local wall
//! clock through a [`LocalZone`].
//!
//! The controller never reads the host clock for wall time. Until the first
//! successful sync `now_utc` is `None` and everything downstream treats the
//! time as unknown.

use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::LocalTime;

/// Offset in effect at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneOffset {
    pub offset_minutes: i32,
    pub is_dst: bool,
    pub abbreviation: String,
}

pub trait LocalZone: Send {
    fn offset_at(&self, utc: DateTime<Utc>) -> ZoneOffset;

    fn to_local(&self, utc: DateTime<Utc>) -> LocalTime {
        let offset = self.offset_at(utc);
        utc.naive_utc() + TimeDelta::minutes(offset.offset_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Week {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl Week {
    fn nth(self) -> i64 {
        match self {
            Self::First | Self::Last => 1,
            Self::Second => 2,
            Self::Third => 3,
            Self::Fourth => 4,
        }
    }
}

/// One half of a DST rule pair: "the `week` `weekday` of `month` at `hour`
/// local time, switch to `offset_minutes` from UTC".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeChangeRule {
    pub abbrev: String,
    pub week: Week,
    pub weekday: Weekday,
    pub month: u32,
    pub hour: u32,
    #[serde(rename = "offsetMinutes")]
    pub offset_minutes: i32,
}

impl TimeChangeRule {
    /// Local wall-clock instant of the change in `year`, expressed in the
    /// offset that was in effect before it.
    fn local_transition(&self, year: i32) -> Option<NaiveDateTime> {
        let (mut y, mut m) = (year, self.month);
        if self.week == Week::Last {
            m += 1;
            if m > 12 {
                m = 1;
                y += 1;
            }
        }

        let first = NaiveDate::from_ymd_opt(y, m, 1)?;
        let shift = (7 + self.weekday.num_days_from_sunday()
            - first.weekday().num_days_from_sunday())
            % 7;
        let mut date = first + TimeDelta::days(shift as i64 + 7 * (self.week.nth() - 1));
        if self.week == Week::Last {
            date -= TimeDelta::days(7);
        }

        date.and_hms_opt(self.hour, 0, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstRules {
    pub daylight: TimeChangeRule,
    pub standard: TimeChangeRule,
}

impl Default for DstRules {
    fn default() -> Self {
        Self::us_eastern()
    }
}

impl DstRules {
    pub fn us_eastern() -> Self {
        Self {
            daylight: TimeChangeRule {
                abbrev: "EDT".to_string(),
                week: Week::Second,
                weekday: Weekday::Sun,
                month: 3,
                hour: 2,
                offset_minutes: -240,
            },
            standard: TimeChangeRule {
                abbrev: "EST".to_string(),
                week: Week::First,
                weekday: Weekday::Sun,
                month: 11,
                hour: 2,
                offset_minutes: -300,
            },
        }
    }

    /// Single fixed offset, no daylight saving.
    pub fn fixed(abbrev: &str, offset_minutes: i32) -> Self {
        let rule = TimeChangeRule {
            abbrev: abbrev.to_string(),
            week: Week::First,
            weekday: Weekday::Sun,
            month: 1,
            hour: 0,
            offset_minutes,
        };
        Self {
            daylight: rule.clone(),
            standard: rule,
        }
    }

    pub fn observes_dst(&self) -> bool {
        self.daylight.offset_minutes != self.standard.offset_minutes
    }

    /// UTC instants at which daylight and standard time begin in `year`.
    fn transitions_utc(&self, year: i32) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let dst_start = self.daylight.local_transition(year)?
            - TimeDelta::minutes(self.standard.offset_minutes as i64);
        let std_start = self.standard.local_transition(year)?
            - TimeDelta::minutes(self.daylight.offset_minutes as i64);
        Some((dst_start, std_start))
    }

    pub fn is_dst(&self, utc: DateTime<Utc>) -> bool {
        if !self.observes_dst() {
            return false;
        }

        let Some((dst_start, std_start)) = self.transitions_utc(utc.year()) else {
            return false;
        };
        let now = utc.naive_utc();

        if dst_start < std_start {
            dst_start <= now && now < std_start
        } else {
            // Southern hemisphere: daylight time spans the new year.
            !(std_start <= now && now < dst_start)
        }
    }
}

impl LocalZone for DstRules {
    fn offset_at(&self, utc: DateTime<Utc>) -> ZoneOffset {
        let is_dst = self.is_dst(utc);
        let rule = if is_dst {
            &self.daylight
        } else {
            &self.standard
        };
        ZoneOffset {
            offset_minutes: rule.offset_minutes,
            is_dst,
            abbreviation: rule.abbrev.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SyncAnchor {
    unix_secs: i64,
    at: Instant,
}

pub struct TimeSync {
    zone: Box<dyn LocalZone>,
    anchor: Option<SyncAnchor>,
    last_attempt: Option<Instant>,
    last_attempt_failed: bool,
    sync_interval: Duration,
    retry_interval: Duration,
}

impl TimeSync {
    pub fn new(zone: Box<dyn LocalZone>, sync_interval: Duration, retry_interval: Duration) -> Self {
        Self {
            zone,
            anchor: None,
            last_attempt: None,
            last_attempt_failed: false,
            sync_interval,
            retry_interval,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn needs_sync(&self, at: Instant) -> bool {
        let Some(last) = self.last_attempt else {
            return true;
        };
        let wait = if self.last_attempt_failed {
            self.retry_interval
        } else {
            self.sync_interval
        };
        at.saturating_duration_since(last) >= wait
    }

    pub fn record_sync(&mut self, unix_secs: i64, at: Instant) {
        let drift = self
            .now_utc_at(at)
            .map(|previous| unix_secs - previous.timestamp());
        self.anchor = Some(SyncAnchor { unix_secs, at });
        self.last_attempt = Some(at);
        self.last_attempt_failed = false;
        info!(unix_secs, ?drift, "time synchronized");
    }

    pub fn record_failure(&mut self, at: Instant) {
        self.last_attempt = Some(at);
        self.last_attempt_failed = true;
        warn!(
            synced = self.is_synced(),
            retry_secs = self.retry_interval.as_secs(),
            "time sync failed"
        );
    }

    pub fn now_utc_at(&self, at: Instant) -> Option<DateTime<Utc>> {
        let anchor = self.anchor?;
        let elapsed = at.saturating_duration_since(anchor.at).as_secs() as i64;
        DateTime::from_timestamp(anchor.unix_secs + elapsed, 0)
    }

    pub fn now_utc(&self) -> Option<DateTime<Utc>> {
        self.now_utc_at(Instant::now())
    }

    pub fn to_local(&self, utc: DateTime<Utc>) -> LocalTime {
        self.zone.to_local(utc)
    }

    pub fn is_dst(&self, utc: DateTime<Utc>) -> bool {
        self.zone.offset_at(utc).is_dst
    }

    pub fn abbreviation(&self, utc: DateTime<Utc>) -> String {
        self.zone.offset_at(utc).abbreviation
    }

    pub fn local_now_at(&self, at: Instant) -> Option<LocalTime> {
        self.now_utc_at(at).map(|utc| self.to_local(utc))
    }

    pub fn local_now(&self) -> Option<LocalTime> {
        self.local_now_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> LocalTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn last_week_rule_resolves_to_final_weekday() {
        let rule = TimeChangeRule {
            abbrev: "CEST".into(),
            week: Week::Last,
            weekday: Weekday::Sun,
            month: 3,
            hour: 2,
            offset_minutes: 120,
        };
        // March 29, 2026 is the last Sunday of March.
        assert_eq!(rule.local_transition(2026), Some(local(2026, 3, 29, 2, 0)));
    }

    #[test]
    fn spring_forward_switches_at_transition_instant() {
        let rules = DstRules::us_eastern();
        // 2026-03-08 02:00 EST == 07:00 UTC.
        let before = utc(2026, 3, 8, 6, 59);
        let after = utc(2026, 3, 8, 7, 0);

        assert!(!rules.is_dst(before));
        assert_eq!(rules.to_local(before), local(2026, 3, 8, 1, 59));
        assert!(rules.is_dst(after));
        assert_eq!(rules.to_local(after), local(2026, 3, 8, 3, 0));
        assert_eq!(rules.offset_at(after).abbreviation, "EDT");
    }

    #[test]
    fn fall_back_repeats_the_hour() {
        let rules = DstRules::us_eastern();
        // 2026-11-01 02:00 EDT == 06:00 UTC.
        let before = utc(2026, 11, 1, 5, 59);
        let after = utc(2026, 11, 1, 6, 0);

        assert!(rules.is_dst(before));
        assert_eq!(rules.to_local(before), local(2026, 11, 1, 1, 59));
        assert!(!rules.is_dst(after));
        assert_eq!(rules.to_local(after), local(2026, 11, 1, 1, 0));
        assert_eq!(rules.offset_at(after).abbreviation, "EST");
    }

    #[test]
    fn southern_hemisphere_dst_spans_new_year() {
        let rules = DstRules {
            daylight: TimeChangeRule {
                abbrev: "AEDT".into(),
                week: Week::First,
                weekday: Weekday::Sun,
                month: 10,
                hour: 2,
                offset_minutes: 660,
            },
            standard: TimeChangeRule {
                abbrev: "AEST".into(),
                week: Week::First,
                weekday: Weekday::Sun,
                month: 4,
                hour: 3,
                offset_minutes: 600,
            },
        };

        assert!(rules.is_dst(utc(2026, 1, 15, 0, 0)));
        assert!(!rules.is_dst(utc(2026, 7, 15, 0, 0)));
        assert!(rules.is_dst(utc(2026, 12, 15, 0, 0)));
    }

    #[test]
    fn fixed_zone_never_observes_dst() {
        let rules = DstRules::fixed("UTC", 0);
        assert!(!rules.is_dst(utc(2026, 7, 1, 12, 0)));
        assert_eq!(rules.to_local(utc(2026, 7, 1, 12, 0)), local(2026, 7, 1, 12, 0));
    }

    #[test]
    fn unsynced_clock_reports_unknown_time() {
        let sync = TimeSync::new(
            Box::new(DstRules::us_eastern()),
            Duration::from_secs(86_400),
            Duration::from_secs(300),
        );
        assert!(!sync.is_synced());
        assert_eq!(sync.now_utc(), None);
        assert_eq!(sync.local_now(), None);
        assert!(sync.needs_sync(Instant::now()));
    }

    #[test]
    fn synced_clock_advances_with_monotonic_time() {
        let mut sync = TimeSync::new(
            Box::new(DstRules::fixed("UTC", 0)),
            Duration::from_secs(86_400),
            Duration::from_secs(300),
        );
        let base = Instant::now();
        let unix = utc(2026, 6, 1, 12, 0).timestamp();
        sync.record_sync(unix, base);

        let later = base + Duration::from_secs(90);
        assert_eq!(sync.now_utc_at(later), Some(utc(2026, 6, 1, 12, 1) + TimeDelta::seconds(30)));
        assert!(!sync.needs_sync(later));
        assert!(sync.needs_sync(base + Duration::from_secs(86_400)));
    }

    #[test]
    fn failed_sync_retries_on_shorter_interval() {
        let mut sync = TimeSync::new(
            Box::new(DstRules::us_eastern()),
            Duration::from_secs(86_400),
            Duration::from_secs(300),
        );
        let base = Instant::now();
        sync.record_failure(base);

        assert!(!sync.needs_sync(base + Duration::from_secs(299)));
        assert!(sync.needs_sync(base + Duration::from_secs(300)));
        assert!(!sync.is_synced());
    }
}
