use std::time::Duration;

use tracing::{info, warn};

use crate::{
    error::ControlError,
    log::{ActivityLog, LogEvent},
    storage::Eeprom,
    types::{LocalTime, SystemMode, SystemStatus, Zone, ZoneId, ZONE_COUNT},
};

/// Drives one valve per zone.
pub trait Actuator {
    /// Energizes or releases `zone`. Assumed to take effect by the time the
    /// settle delay has elapsed.
    fn set(&mut self, zone: ZoneId, energized: bool);

    fn settle_time(&self) -> Duration {
        Duration::ZERO
    }
}

/// Where zone transitions get recorded. Appends are best-effort: a failed
/// write is reported and the transition stands.
pub struct Journal<'a, E: Eeprom> {
    pub eeprom: &'a mut E,
    pub log: &'a mut ActivityLog,
    pub now: Option<LocalTime>,
}

impl<E: Eeprom> Journal<'_, E> {
    pub(crate) fn record(&mut self, event: LogEvent) {
        if let Err(error) = self.log.add(&mut *self.eeprom, event, self.now) {
            warn!(%error, ?event, "activity log append failed");
        }
    }
}

pub struct ZoneController<A: Actuator> {
    actuator: A,
    zones: Vec<Zone>,
    status: SystemStatus,
}

impl<A: Actuator> ZoneController<A> {
    pub fn new(actuator: A, names: &[String; ZONE_COUNT]) -> Self {
        let zones = ZoneId::all()
            .map(|id| Zone::new(id, &names[id.index()]))
            .collect();
        Self {
            actuator,
            zones,
            status: SystemStatus::default(),
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn status(&self) -> SystemStatus {
        self.status
    }

    pub fn mode(&self) -> SystemMode {
        self.status.mode
    }

    pub fn set_reset_time(&mut self, at: Option<LocalTime>) {
        self.status.reset_time = at;
    }

    pub fn active_zone(&self) -> Option<ZoneId> {
        self.zones.iter().find(|zone| zone.is_on).map(|zone| zone.id)
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Releases every valve regardless of recorded state. Used at boot,
    /// before the recorded flags can be trusted.
    pub fn release_all(&mut self) {
        for zone in ZoneId::all() {
            self.actuator.set(zone, false);
            self.zones[zone.index()].is_on = false;
        }
        self.settle();
    }

    pub fn turn_on<E: Eeprom>(
        &mut self,
        zone: ZoneId,
        journal: &mut Journal<'_, E>,
    ) -> Result<(), ControlError> {
        let index = Self::check(zone)?;
        if self.zones[index].is_on {
            return Ok(());
        }

        for other in ZoneId::all().filter(|other| *other != zone) {
            self.switch(other, false, journal);
        }
        self.switch(zone, true, journal);
        Ok(())
    }

    pub fn turn_off<E: Eeprom>(
        &mut self,
        zone: ZoneId,
        journal: &mut Journal<'_, E>,
    ) -> Result<(), ControlError> {
        Self::check(zone)?;
        self.switch(zone, false, journal);
        Ok(())
    }

    pub fn all_off<E: Eeprom>(&mut self, journal: &mut Journal<'_, E>) {
        for zone in ZoneId::all() {
            self.switch(zone, false, journal);
        }
    }

    pub fn manual_on<E: Eeprom>(
        &mut self,
        zone: ZoneId,
        journal: &mut Journal<'_, E>,
    ) -> Result<(), ControlError> {
        self.turn_on(zone, journal)?;
        self.set_mode(SystemMode::Manual);
        Ok(())
    }

    pub fn manual_off<E: Eeprom>(
        &mut self,
        zone: ZoneId,
        journal: &mut Journal<'_, E>,
    ) -> Result<(), ControlError> {
        self.turn_off(zone, journal)?;
        let mode = if self.active_zone().is_some() {
            SystemMode::Manual
        } else {
            SystemMode::Idle
        };
        self.set_mode(mode);
        Ok(())
    }

    pub fn manual_all_off<E: Eeprom>(&mut self, journal: &mut Journal<'_, E>) {
        self.all_off(journal);
        self.set_mode(SystemMode::Idle);
    }

    /// Resolves what the schedule wants against manual control.
    pub fn apply_schedule<E: Eeprom>(
        &mut self,
        wanted: Option<ZoneId>,
        journal: &mut Journal<'_, E>,
    ) -> Result<(), ControlError> {
        if self.status.mode == SystemMode::Manual {
            return Ok(());
        }

        match wanted {
            Some(zone) => {
                self.turn_on(zone, journal)?;
                self.set_mode(SystemMode::Auto);
            }
            None => {
                self.all_off(journal);
                self.set_mode(SystemMode::Idle);
            }
        }
        Ok(())
    }

    fn check(zone: ZoneId) -> Result<usize, ControlError> {
        if zone.is_valid() {
            Ok(zone.index())
        } else {
            Err(ControlError::UnknownZone(zone))
        }
    }

    fn switch<E: Eeprom>(&mut self, zone: ZoneId, on: bool, journal: &mut Journal<'_, E>) {
        let index = zone.index();
        if self.zones[index].is_on == on {
            return;
        }

        self.actuator.set(zone, on);
        self.zones[index].is_on = on;
        self.settle();
        info!(zone = %zone, name = %self.zones[index].name, on, "zone switched");
        journal.record(LogEvent::ZoneChange { zone, on });
    }

    fn set_mode(&mut self, mode: SystemMode) {
        if self.status.mode != mode {
            info!(from = self.status.mode.as_str(), to = mode.as_str(), "mode changed");
            self.status.mode = mode;
        }
    }

    fn settle(&self) {
        let pause = self.actuator.settle_time();
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{layout::EEPROM_SIZE, storage::MemEeprom};
    use pretty_assertions::assert_eq;

    /// Records every command and checks exclusivity as it goes.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingActuator {
        pub commands: Vec<(ZoneId, bool)>,
        energized: [bool; ZONE_COUNT],
    }

    impl Actuator for RecordingActuator {
        fn set(&mut self, zone: ZoneId, energized: bool) {
            self.energized[zone.index()] = energized;
            assert!(
                self.energized.iter().filter(|on| **on).count() <= 1,
                "two zones energized at once: {:?}",
                self.energized
            );
            self.commands.push((zone, energized));
        }
    }

    pub(crate) fn names() -> [String; ZONE_COUNT] {
        ["Front", "Back", "Garden", "Side"].map(String::from)
    }

    struct Rig {
        eeprom: MemEeprom,
        log: ActivityLog,
        zones: ZoneController<RecordingActuator>,
    }

    impl Rig {
        fn new() -> Self {
            let mut eeprom = MemEeprom::new(EEPROM_SIZE);
            let log = ActivityLog::open(&mut eeprom).unwrap();
            Self {
                eeprom,
                log,
                zones: ZoneController::new(RecordingActuator::default(), &names()),
            }
        }

        fn journal(&mut self) -> (&mut ZoneController<RecordingActuator>, Journal<'_, MemEeprom>) {
            (
                &mut self.zones,
                Journal {
                    eeprom: &mut self.eeprom,
                    log: &mut self.log,
                    now: None,
                },
            )
        }

        fn events(&self) -> Vec<LogEvent> {
            self.log
                .entries_newest_first(&self.eeprom)
                .unwrap()
                .into_iter()
                .rev()
                .map(|entry| entry.event)
                .collect()
        }

        fn on_count(&self) -> usize {
            self.zones.zones().iter().filter(|zone| zone.is_on).count()
        }
    }

    fn change(zone: u8, on: bool) -> LogEvent {
        LogEvent::ZoneChange { zone: ZoneId(zone), on }
    }

    #[test]
    fn turning_on_switches_off_the_previous_zone_first() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();
        zones.turn_on(ZoneId(0), &mut journal).unwrap();
        zones.turn_on(ZoneId(2), &mut journal).unwrap();

        assert_eq!(rig.zones.active_zone(), Some(ZoneId(2)));
        assert_eq!(
            rig.zones.actuator().commands,
            vec![(ZoneId(0), true), (ZoneId(0), false), (ZoneId(2), true)]
        );
        assert_eq!(rig.events(), vec![change(0, true), change(0, false), change(2, true)]);
    }

    #[test]
    fn repeated_commands_are_no_ops() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();
        zones.turn_on(ZoneId(1), &mut journal).unwrap();
        zones.turn_on(ZoneId(1), &mut journal).unwrap();
        zones.turn_off(ZoneId(3), &mut journal).unwrap();
        zones.all_off(&mut journal);
        zones.all_off(&mut journal);

        assert_eq!(rig.events(), vec![change(1, true), change(1, false)]);
        assert_eq!(rig.zones.actuator().commands.len(), 2);
    }

    #[test]
    fn at_most_one_zone_is_on_for_any_command_sequence() {
        let mut rig = Rig::new();
        let sequence = [0_u8, 3, 3, 1, 2, 0, 1, 1, 3, 2];
        for (step, zone) in sequence.iter().enumerate() {
            let (zones, mut journal) = rig.journal();
            if step % 3 == 2 {
                zones.turn_off(ZoneId(*zone), &mut journal).unwrap();
            } else {
                zones.turn_on(ZoneId(*zone), &mut journal).unwrap();
            }
            assert!(rig.on_count() <= 1);
        }

        // Every flag change produced exactly one log entry.
        let commands = rig.zones.actuator().commands.len();
        assert_eq!(rig.log.len(), commands);
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();
        assert!(matches!(
            zones.turn_on(ZoneId(4), &mut journal),
            Err(ControlError::UnknownZone(ZoneId(4)))
        ));
        assert!(rig.zones.actuator().commands.is_empty());
    }

    #[test]
    fn manual_commands_take_precedence_over_schedule() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();

        zones.manual_on(ZoneId(1), &mut journal).unwrap();
        assert_eq!(zones.mode(), SystemMode::Manual);

        zones.apply_schedule(Some(ZoneId(3)), &mut journal).unwrap();
        zones.apply_schedule(None, &mut journal).unwrap();
        assert_eq!(zones.active_zone(), Some(ZoneId(1)));
        assert_eq!(zones.mode(), SystemMode::Manual);

        zones.manual_all_off(&mut journal);
        assert_eq!(zones.mode(), SystemMode::Idle);

        zones.apply_schedule(Some(ZoneId(3)), &mut journal).unwrap();
        assert_eq!(zones.mode(), SystemMode::Auto);
        assert_eq!(zones.active_zone(), Some(ZoneId(3)));

        zones.apply_schedule(None, &mut journal).unwrap();
        assert_eq!(zones.mode(), SystemMode::Idle);
        assert_eq!(zones.active_zone(), None);
    }

    #[test]
    fn manual_off_of_last_zone_returns_to_idle() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();

        zones.manual_on(ZoneId(2), &mut journal).unwrap();
        zones.manual_off(ZoneId(0), &mut journal).unwrap();
        assert_eq!(zones.mode(), SystemMode::Manual);

        zones.manual_off(ZoneId(2), &mut journal).unwrap();
        assert_eq!(zones.mode(), SystemMode::Idle);
    }

    #[test]
    fn manual_on_during_auto_takes_over() {
        let mut rig = Rig::new();
        let (zones, mut journal) = rig.journal();

        zones.apply_schedule(Some(ZoneId(0)), &mut journal).unwrap();
        zones.manual_on(ZoneId(1), &mut journal).unwrap();

        assert_eq!(zones.mode(), SystemMode::Manual);
        assert_eq!(zones.active_zone(), Some(ZoneId(1)));
    }

    #[test]
    fn failed_log_writes_do_not_block_actuation() {
        let mut rig = Rig::new();
        rig.eeprom.fail_writes(true);
        let (zones, mut journal) = rig.journal();

        zones.turn_on(ZoneId(2), &mut journal).unwrap();
        assert_eq!(zones.active_zone(), Some(ZoneId(2)));
        assert_eq!(zones.actuator().commands, vec![(ZoneId(2), true)]);
        assert!(rig.log.is_empty());
    }

    #[test]
    fn release_all_commands_every_channel() {
        let mut rig = Rig::new();
        rig.zones.release_all();

        assert_eq!(rig.zones.actuator().commands.len(), ZONE_COUNT);
        assert!(rig.zones.actuator().commands.iter().all(|(_, on)| !on));
        assert!(rig.log.is_empty());
    }

    #[test]
    fn zone_names_are_truncated() {
        let mut long = names();
        long[0] = "A very long zone name".to_string();
        let zones = ZoneController::new(RecordingActuator::default(), &long);
        assert_eq!(zones.zones()[0].name, "A very long ");
    }
}
