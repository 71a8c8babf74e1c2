pub mod config;
pub mod error;
pub mod irrigator;
pub mod layout;
pub mod log;
pub mod ntp;
pub mod ring;
pub mod schedule;
pub mod storage;
pub mod time;
pub mod types;
pub mod zones;

pub use config::{ControllerConfig, RuntimeConfig, TimeZoneConfig};
pub use error::{ControlError, CycleError, NtpError, StorageError};
pub use irrigator::Irrigator;
pub use log::{ActivityLog, LogEntry, LogEvent};
pub use schedule::{DayMask, Event, ScheduleEngine, WaterCycle};
pub use storage::{Eeprom, MemEeprom};
pub use time::{DstRules, LocalZone, TimeSync, ZoneOffset};
pub use types::{ControllerStatus, LocalTime, SystemMode, SystemStatus, Zone, ZoneId, ZONE_COUNT};
pub use zones::{Actuator, ZoneController};
