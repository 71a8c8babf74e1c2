use serde::{Deserialize, Serialize};

use crate::{
    time::DstRules,
    types::{MAX_ZONE_NAME_LEN, ZONE_COUNT},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerConfig {
    pub tick_ms: u64,
    pub time_sync_interval_secs: u64,
    pub sync_retry_secs: u64,
    pub ntp_timeout_ms: u64,
    pub settle_ms: u64,
    pub liveness_deadline_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            time_sync_interval_secs: 86_400,
            sync_retry_secs: 300,
            ntp_timeout_ms: 1_500,
            settle_ms: 50,
            liveness_deadline_ms: 8_000,
        }
    }
}

impl ControllerConfig {
    pub fn sanitize(&mut self) {
        self.tick_ms = self.tick_ms.clamp(100, 10_000);
        self.time_sync_interval_secs = self.time_sync_interval_secs.clamp(60, 7 * 86_400);
        self.sync_retry_secs = self.sync_retry_secs.clamp(5, self.time_sync_interval_secs);
        self.ntp_timeout_ms = self.ntp_timeout_ms.clamp(100, 5_000);
        self.settle_ms = self.settle_ms.min(500);

        // A tick has to fit one sync wait plus settle pauses for a full switch-over.
        let floor = self.tick_ms + self.ntp_timeout_ms + self.settle_ms * (ZONE_COUNT as u64 + 1);
        if self.liveness_deadline_ms < floor {
            self.liveness_deadline_ms = floor;
        }
    }
}

/// Either an IANA zone name (`"Europe/Berlin"`) or explicit DST rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TimeZoneConfig {
    Named(String),
    Rules(DstRules),
}

impl Default for TimeZoneConfig {
    fn default() -> Self {
        Self::Rules(DstRules::us_eastern())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String,
    #[serde(default)]
    pub timezone: TimeZoneConfig,
    #[serde(default = "default_zone_names")]
    pub zone_names: [String; ZONE_COUNT],
}

fn default_ntp_server() -> String {
    "pool.ntp.org:123".to_string()
}

fn default_zone_names() -> [String; ZONE_COUNT] {
    std::array::from_fn(|i| format!("Zone {}", i + 1))
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            ntp_server: default_ntp_server(),
            timezone: TimeZoneConfig::default(),
            zone_names: default_zone_names(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.controller.sanitize();

        if self.ntp_server.trim().is_empty() {
            self.ntp_server = default_ntp_server();
        }

        for (i, name) in self.zone_names.iter_mut().enumerate() {
            let trimmed = name.trim();
            *name = if trimmed.is_empty() {
                format!("Zone {}", i + 1)
            } else {
                trimmed.chars().take(MAX_ZONE_NAME_LEN).collect()
            };
        }
    }
}
