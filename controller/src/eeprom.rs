//! EEPROM image kept in a file so the controller's persisted state survives
//! restarts on a host.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use irrigation_common::{Eeprom, StorageError};
use tracing::info;

pub struct FileEeprom {
    path: PathBuf,
    file: File,
    image: Vec<u8>,
}

impl FileEeprom {
    /// Opens the image at `path`, creating it erased (all `0xFF`) when it
    /// does not exist and padding it when it is shorter than `size`.
    pub fn open(path: impl AsRef<Path>, size: usize) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open eeprom image {}", path.display()))?;

        let mut image = Vec::with_capacity(size);
        file.read_to_end(&mut image)
            .with_context(|| format!("failed to read eeprom image {}", path.display()))?;

        if image.len() < size {
            let existing = image.len();
            image.resize(size, 0xFF);
            file.seek(SeekFrom::Start(existing as u64))?;
            file.write_all(&image[existing..])?;
            file.sync_data()?;
            info!(path = %path.display(), existing, size, "eeprom image initialized");
        }
        image.truncate(size);

        Ok(Self { path, file, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Eeprom for FileEeprom {
    fn size(&self) -> usize {
        self.image.len()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_range(addr, buf.len())?;
        buf.copy_from_slice(&self.image[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError> {
        self.check_range(addr, data.len())?;
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        self.image[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}
