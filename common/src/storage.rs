//! Byte-addressable non-volatile storage.

use crate::error::StorageError;

/// An EEPROM-like device. Writes are synchronous and atomic per call.
pub trait Eeprom {
    fn size(&self) -> usize;

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError>;

    fn check_range(&self, addr: usize, len: usize) -> Result<(), StorageError> {
        match addr.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(StorageError::OutOfRange {
                addr,
                len,
                size: self.size(),
            }),
        }
    }

    fn read_u16(&self, addr: usize) -> Result<u16, StorageError> {
        let mut raw = [0_u8; 2];
        self.read(addr, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    fn write_u16(&mut self, addr: usize, value: u16) -> Result<(), StorageError> {
        self.write(addr, &value.to_le_bytes())
    }
}

/// RAM-backed device, blank (0xFF) like erased EEPROM.
#[derive(Debug, Clone)]
pub struct MemEeprom {
    bytes: Vec<u8>,
    fail_writes: bool,
}

impl MemEeprom {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
            fail_writes: false,
        }
    }

    /// Makes every subsequent write fail, as worn-out cells would.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Eeprom for MemEeprom {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError> {
        self.check_range(addr, data.len())?;
        if self.fail_writes {
            return Err(StorageError::WriteFailed { addr });
        }
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}
