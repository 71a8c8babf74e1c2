use thiserror::Error;

use crate::types::ZoneId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("access of {len} bytes at {addr:#06x} is outside the {size}-byte device")]
    OutOfRange { addr: usize, len: usize, size: usize },
    #[error("storage write failed at {addr:#06x}")]
    WriteFailed { addr: usize },
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NtpError {
    #[error("reply too short: {0} bytes")]
    ShortReply(usize),
    #[error("transmit timestamp {0} predates the unix epoch")]
    BeforeUnixEpoch(u32),
    #[error("transmit timestamp is the unix epoch itself")]
    EpochZero,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("start minute {0} out of range (0-1439)")]
    StartMinute(u16),
    #[error("zone {zone} duration {minutes}min exceeds {max}min")]
    ZoneDuration { zone: ZoneId, minutes: u8, max: u8 },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown zone {0}")]
    UnknownZone(ZoneId),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
