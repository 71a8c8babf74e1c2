use anyhow::anyhow;
use chrono::{DateTime, Offset, TimeDelta, Utc};
use chrono_tz::{OffsetComponents, Tz};
use irrigation_common::{LocalZone, TimeZoneConfig, ZoneOffset};

/// An IANA time zone from the tz database.
#[derive(Debug, Clone, Copy)]
pub struct NamedZone(pub Tz);

impl LocalZone for NamedZone {
    fn offset_at(&self, utc: DateTime<Utc>) -> ZoneOffset {
        let local = utc.with_timezone(&self.0);
        let offset = local.offset();
        ZoneOffset {
            offset_minutes: offset.fix().local_minus_utc() / 60,
            is_dst: offset.dst_offset() != TimeDelta::zero(),
            abbreviation: local.format("%Z").to_string(),
        }
    }
}

pub fn build_zone(config: &TimeZoneConfig) -> anyhow::Result<Box<dyn LocalZone>> {
    match config {
        TimeZoneConfig::Named(name) => {
            let tz: Tz = name
                .parse()
                .map_err(|err| anyhow!("unknown timezone '{name}': {err}"))?;
            Ok(Box::new(NamedZone(tz)))
        }
        TimeZoneConfig::Rules(rules) => Ok(Box::new(rules.clone())),
    }
}
