use std::time::Duration;

use irrigation_common::{Actuator, ZoneId, ZONE_COUNT};
use tracing::info;

/// Valve board stand-in for hosts without GPIO: tracks and logs each
/// command.
#[derive(Debug)]
pub struct LoggingActuator {
    settle: Duration,
    energized: [bool; ZONE_COUNT],
}

impl LoggingActuator {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            energized: [false; ZONE_COUNT],
        }
    }

    pub fn energized(&self) -> Option<ZoneId> {
        self.energized
            .iter()
            .position(|on| *on)
            .map(|index| ZoneId(index as u8))
    }
}

impl Actuator for LoggingActuator {
    fn set(&mut self, zone: ZoneId, energized: bool) {
        if let Some(slot) = self.energized.get_mut(zone.index()) {
            *slot = energized;
        }
        info!(zone = %zone, state = if energized { "ON" } else { "OFF" }, "valve command");
    }

    fn settle_time(&self) -> Duration {
        self.settle
    }
}
