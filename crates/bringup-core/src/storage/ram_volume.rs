//! RAM-backed [`FlashVolume`] for the simulator and tests.
//!
//! Content can be snapshotted to a postcard-encoded [`VolumeImage`] and
//! restored, which lets the simulator keep its "flash" between runs.

extern crate alloc;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::file_store::{EntryInfo, FlashVolume};
use super::{StorageError, StorageResult};

/// Serializable content of a [`RamVolume`]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct VolumeImage {
    pub capacity: u64,
    pub files: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Clone)]
pub struct RamVolume {
    capacity: u64,
    files: BTreeMap<String, Vec<u8>>,
    formatted: bool,
    mounted: bool,
    fail_mount: bool,
}

impl RamVolume {
    /// Create an empty, formatted volume
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            files: BTreeMap::new(),
            formatted: true,
            mounted: false,
            fail_mount: false,
        }
    }

    /// Create a volume that refuses to mount until it is formatted
    pub fn unformatted(capacity: u64) -> Self {
        Self {
            formatted: false,
            ..Self::new(capacity)
        }
    }

    /// Make every mount fail, formatted or not
    pub fn fail_mounts(&mut self, fail: bool) {
        self.fail_mount = fail;
    }

    /// Encode the volume content with postcard
    pub fn snapshot(&self) -> StorageResult<Vec<u8>> {
        let image = VolumeImage {
            capacity: self.capacity,
            files: self
                .files
                .iter()
                .map(|(name, data)| (name.clone(), data.clone()))
                .collect(),
        };
        postcard::to_allocvec(&image).map_err(StorageError::device)
    }

    /// Rebuild a formatted volume from a [`snapshot`](Self::snapshot)
    pub fn restore(bytes: &[u8]) -> StorageResult<Self> {
        let image: VolumeImage = postcard::from_bytes(bytes).map_err(StorageError::device)?;
        let mut volume = Self::new(image.capacity);
        volume.files = image.files.into_iter().collect();
        Ok(volume)
    }

    fn ensure_mounted(&self) -> StorageResult<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::MountFailure)
        }
    }

    fn used(&self) -> u64 {
        self.files.values().map(|data| data.len() as u64).sum()
    }

    /// Check that `path` can grow from its current size to `new_len`
    fn reserve(&self, path: &str, new_len: usize) -> StorageResult<()> {
        let current = self.files.get(path).map_or(0, |data| data.len() as u64);
        let after = self.used() - current + new_len as u64;
        if after > self.capacity {
            return Err(StorageError::NoSpace);
        }
        Ok(())
    }
}

impl FlashVolume for RamVolume {
    fn mount(&mut self) -> StorageResult<()> {
        if self.fail_mount || !self.formatted {
            return Err(StorageError::MountFailure);
        }
        self.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> StorageResult<()> {
        self.files.clear();
        self.formatted = true;
        Ok(())
    }

    fn total_bytes(&self) -> u64 {
        self.capacity
    }

    fn used_bytes(&mut self) -> StorageResult<u64> {
        self.ensure_mounted()?;
        Ok(self.used())
    }

    fn file_size(&mut self, path: &str) -> StorageResult<Option<usize>> {
        self.ensure_mounted()?;
        Ok(self.files.get(path).map(Vec::len))
    }

    fn read_file(&mut self, path: &str) -> StorageResult<Vec<u8>> {
        self.ensure_mounted()?;
        self.files.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.ensure_mounted()?;
        self.reserve(path, data.len())?;
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        self.ensure_mounted()?;
        let current = self.files.get(path).map_or(0, Vec::len);
        self.reserve(path, current + data.len())?;
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        self.ensure_mounted()?;
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    fn rename_file(&mut self, from: &str, to: &str) -> StorageResult<()> {
        self.ensure_mounted()?;
        if self.files.contains_key(to) {
            return Err(StorageError::AlreadyExists);
        }
        let data = self.files.remove(from).ok_or(StorageError::NotFound)?;
        self.files.insert(to.to_string(), data);
        Ok(())
    }

    fn entries(&mut self) -> StorageResult<Vec<EntryInfo>> {
        self.ensure_mounted()?;
        Ok(self
            .files
            .iter()
            .map(|(name, data)| EntryInfo {
                name: name.clone(),
                size: data.len(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_operations_require_mount() {
        let mut volume = RamVolume::new(64);
        assert_eq!(volume.used_bytes(), Err(StorageError::MountFailure));
        volume.mount().unwrap();
        assert_eq!(volume.used_bytes(), Ok(0));
    }

    #[test]
    fn test_snapshot_restores_files() {
        let mut volume = RamVolume::new(256);
        volume.mount().unwrap();
        volume.write_file("/a.txt", b"hello").unwrap();
        volume.append_file("/a.txt", b" world").unwrap();
        volume.write_file("/b.bin", &[1, 2, 3]).unwrap();

        let bytes = volume.snapshot().unwrap();
        let mut restored = RamVolume::restore(&bytes).unwrap();
        restored.mount().unwrap();

        assert_eq!(restored.total_bytes(), 256);
        assert_eq!(restored.read_file("/a.txt").unwrap(), b"hello world");
        assert_eq!(restored.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        assert!(RamVolume::restore(&[0xFF, 0xFF, 0xFF]).is_err());
    }

    #[test]
    fn test_append_respects_capacity() {
        let mut volume = RamVolume::new(4);
        volume.mount().unwrap();
        volume.write_file("/x", &[0, 1, 2]).unwrap();
        assert_eq!(volume.append_file("/x", &[3, 4]), Err(StorageError::NoSpace));
        assert_eq!(volume.read_file("/x").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_format_erases_files() {
        let mut volume = RamVolume::new(64);
        volume.mount().unwrap();
        volume.write_file("/x", &[1]).unwrap();
        volume.format().unwrap();
        assert_eq!(volume.file_size("/x"), Ok(None));
    }
}
