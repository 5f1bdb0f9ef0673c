//! SD card backing for the byte-store image and the file volume
//!
//! Both stores live on the FAT volume of one card: the byte-store image is
//! the file [`STORE_IMAGE_FILE`] in the root directory, and every other root
//! file belongs to the flat filesystem.
//!
//! FAT keeps 8.3 names without case, so names come back from the card in
//! lowercase and paths that do not fit 8.3 are reported as absent.

extern crate alloc;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use bringup_core::storage::{
    EntryInfo, FlashVolume, PersistentMedium, StorageError, StorageResult, medium::ERASED_BYTE,
};
use embedded_sdmmc::{
    DirEntry, Directory, Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use log::{error, info};

/// Root file holding the byte-store image
pub const STORE_IMAGE_FILE: &str = "EEPROM.BIN";

/// Size of the byte-store image on the card
pub const STORE_IMAGE_SIZE: usize = 4096;

type SdError = embedded_sdmmc::Error<SdCardError>;
type RootDir<'a, S, D, T> = Directory<'a, SdCard<S, D>, T, 4, 4, 1>;

/// Fixed timestamp for file metadata; the board has no RTC
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

fn storage_error(e: SdError) -> StorageError {
    match e {
        embedded_sdmmc::Error::NotFound => StorageError::NotFound,
        embedded_sdmmc::Error::FileAlreadyExists => StorageError::AlreadyExists,
        embedded_sdmmc::Error::DiskFull => StorageError::NoSpace,
        embedded_sdmmc::Error::FilenameError(_) => StorageError::InvalidPath,
        other => StorageError::device(other),
    }
}

/// Card name for a store path: the leading `/` is dropped
fn card_name(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Store path for a card entry
fn store_path(entry: &DirEntry) -> alloc::string::String {
    format!("/{}", entry.name).to_ascii_lowercase()
}

/// Blocking access to the card's first FAT volume
///
/// Nothing else shares the SPI bus with the card.
pub struct SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
    card_bytes: u64,
}

impl<S, D, T> SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Create a new SD card storage manager
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let card_bytes = match sd_card.num_bytes() {
            Ok(bytes) => {
                info!("SD card size: {} bytes", bytes);
                bytes
            }
            Err(e) => {
                error!("SD card not responding: {:?}", e);
                0
            }
        };

        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
            card_bytes,
        }
    }

    /// The byte-store image file as a [`PersistentMedium`]
    pub fn medium(&self) -> SdMedium<'_, S, D, T> {
        SdMedium { storage: self }
    }

    /// The root directory as a [`FlashVolume`]
    pub fn volume(&self) -> SdVolume<'_, S, D, T> {
        SdVolume { storage: self }
    }

    /// Open volume 0 and its root directory, run `f`, and close both again
    fn with_root<R>(&self, f: impl FnOnce(&RootDir<'_, S, D, T>) -> Result<R, SdError>) -> Result<R, SdError> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let result = f(&root_dir);

        // Resources are closed on drop as well; close explicitly to see errors
        root_dir.close()?;
        volume0.close()?;
        result
    }

    fn read_whole(&self, name: &str) -> Result<Vec<u8>, SdError> {
        self.with_root(|root| {
            let file = root.open_file_in_dir(name, Mode::ReadOnly)?;
            let mut data = vec![0u8; file.length() as usize];
            let mut filled = 0;
            while filled < data.len() {
                let read = file.read(&mut data[filled..])?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            data.truncate(filled);
            file.close()?;
            Ok(data)
        })
    }

    fn write_whole(&self, name: &str, data: &[u8], mode: Mode) -> Result<(), SdError> {
        self.with_root(|root| {
            let file = root.open_file_in_dir(name, mode)?;
            file.write(data)?;
            file.close()?;
            Ok(())
        })
    }

    fn size_of(&self, name: &str) -> Result<Option<usize>, SdError> {
        let found = self.with_root(|root| root.find_directory_entry(name));
        match found {
            Ok(entry) => Ok(Some(entry.size as usize)),
            Err(embedded_sdmmc::Error::NotFound | embedded_sdmmc::Error::FilenameError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> Result<Vec<EntryInfo>, SdError> {
        let image = format!("/{}", STORE_IMAGE_FILE).to_ascii_lowercase();
        let mut entries = Vec::new();
        self.with_root(|root| {
            root.iterate_dir(|entry| {
                if entry.attributes.is_directory() || entry.attributes.is_volume() {
                    return;
                }
                let name = store_path(entry);
                if name != image {
                    entries.push(EntryInfo {
                        name,
                        size: entry.size as usize,
                    });
                }
            })
        })?;
        Ok(entries)
    }
}

/// Byte-store image kept in [`STORE_IMAGE_FILE`]
///
/// A missing image reads as erased flash.
pub struct SdMedium<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    storage: &'a SdCardStorage<S, D, T>,
}

impl<S, D, T> PersistentMedium for SdMedium<'_, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn size(&self) -> usize {
        STORE_IMAGE_SIZE
    }

    fn load(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        buf.fill(ERASED_BYTE);
        match self.storage.read_whole(STORE_IMAGE_FILE) {
            Ok(image) => {
                let len = image.len().min(buf.len());
                buf[..len].copy_from_slice(&image[..len]);
                Ok(())
            }
            Err(embedded_sdmmc::Error::NotFound) => {
                info!("No {} on card, starting erased", STORE_IMAGE_FILE);
                Ok(())
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    fn store(&mut self, data: &[u8]) -> StorageResult<()> {
        if data.len() > STORE_IMAGE_SIZE {
            return Err(StorageError::OutOfRange {
                addr: 0,
                len: data.len(),
                capacity: STORE_IMAGE_SIZE,
            });
        }
        self.storage
            .write_whole(STORE_IMAGE_FILE, data, Mode::ReadWriteCreateOrTruncate)
            .map_err(storage_error)
    }
}

/// Root directory of the card as a flat volume
pub struct SdVolume<'a, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    storage: &'a SdCardStorage<S, D, T>,
}

impl<S, D, T> FlashVolume for SdVolume<'_, S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn mount(&mut self) -> StorageResult<()> {
        self.storage.with_root(|_| Ok(())).map_err(|e| {
            error!("SD volume mount failed: {:?}", e);
            StorageError::MountFailure
        })
    }

    fn format(&mut self) -> StorageResult<()> {
        Err(StorageError::device("formatting the card is not supported"))
    }

    fn total_bytes(&self) -> u64 {
        self.storage.card_bytes
    }

    fn used_bytes(&mut self) -> StorageResult<u64> {
        let entries = self.storage.list().map_err(storage_error)?;
        Ok(entries.iter().map(|e| e.size as u64).sum())
    }

    fn file_size(&mut self, path: &str) -> StorageResult<Option<usize>> {
        self.storage.size_of(card_name(path)).map_err(storage_error)
    }

    fn read_file(&mut self, path: &str) -> StorageResult<Vec<u8>> {
        self.storage.read_whole(card_name(path)).map_err(storage_error)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.storage
            .write_whole(card_name(path), data, Mode::ReadWriteCreateOrTruncate)
            .map_err(storage_error)
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.storage
            .write_whole(card_name(path), data, Mode::ReadWriteCreateOrAppend)
            .map_err(storage_error)
    }

    fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        self.storage
            .with_root(|root| root.delete_file_in_dir(card_name(path)))
            .map_err(storage_error)
    }

    /// FAT rename is not exposed by the card driver; copy then delete
    fn rename_file(&mut self, from: &str, to: &str) -> StorageResult<()> {
        let data = self.read_file(from)?;
        self.storage
            .write_whole(card_name(to), &data, Mode::ReadWriteCreate)
            .map_err(storage_error)?;
        self.remove_file(from)
    }

    fn entries(&mut self) -> StorageResult<Vec<EntryInfo>> {
        self.storage.list().map_err(storage_error)
    }
}
