use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Number of physical valves wired to the controller.
pub const ZONE_COUNT: usize = 4;

/// Longest zone name kept for display.
pub const MAX_ZONE_NAME_LEN: usize = 12;

/// Zone-local wall-clock time.
pub type LocalTime = NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u8);

impl ZoneId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = ZoneId> {
        (0..ZONE_COUNT as u8).map(ZoneId)
    }

    pub fn is_valid(self) -> bool {
        self.index() < ZONE_COUNT
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    #[serde(rename = "isOn")]
    pub is_on: bool,
}

impl Zone {
    pub fn new(id: ZoneId, name: &str) -> Self {
        Self {
            id,
            name: name.chars().take(MAX_ZONE_NAME_LEN).collect(),
            is_on: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemMode {
    Idle,
    Manual,
    Auto,
}

impl SystemMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Manual => "MANUAL",
            Self::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub mode: SystemMode,
    #[serde(rename = "resetTime")]
    pub reset_time: Option<LocalTime>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            mode: SystemMode::Idle,
            reset_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub mode: &'static str,
    #[serde(rename = "resetTime")]
    pub reset_time: Option<LocalTime>,
    pub zones: Vec<Zone>,
    #[serde(rename = "activeZone")]
    pub active_zone: Option<ZoneId>,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    #[serde(rename = "localTime")]
    pub local_time: Option<LocalTime>,
    #[serde(rename = "isDst")]
    pub is_dst: bool,
    #[serde(rename = "zoneAbbrev")]
    pub zone_abbrev: Option<String>,
    #[serde(rename = "cycleEnabled")]
    pub cycle_enabled: bool,
    #[serde(rename = "nextEventStart")]
    pub next_event_start: Option<LocalTime>,
    #[serde(rename = "logEntries")]
    pub log_entries: usize,
}
