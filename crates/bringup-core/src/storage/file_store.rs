//! Flat flash filesystem accessed through stream-style file handles.
//!
//! [`FileStore`] sits on top of a [`FlashVolume`] backend (SPI flash, an SD
//! card, or RAM in the simulator) and adds the handle layer: open modes,
//! cursors, buffered writes that land on close, and the namespace rules.
//!
//! Paths are flat: a leading `/` followed by a name with no further
//! separators, at most [`MAX_PATH_LEN`] bytes in total. Names are
//! case-sensitive.

extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{error, warn};

use super::{StorageError, StorageResult};

/// Longest accepted path, leading `/` included
pub const MAX_PATH_LEN: usize = 32;

/// Name and size of one file on the volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: usize,
}

/// Backend that stores whole files on a mounted volume.
///
/// Implementations can assume paths were validated by [`FileStore`] and that
/// rename/remove preconditions were already checked.
pub trait FlashVolume {
    /// Mount the volume. Fails if it holds no valid filesystem.
    fn mount(&mut self) -> StorageResult<()>;

    /// Erase the volume and lay down an empty filesystem.
    fn format(&mut self) -> StorageResult<()>;

    /// Capacity in bytes
    fn total_bytes(&self) -> u64;

    /// Bytes currently taken by file content
    fn used_bytes(&mut self) -> StorageResult<u64>;

    /// Size of `path`, or `None` if it does not exist
    fn file_size(&mut self, path: &str) -> StorageResult<Option<usize>>;

    /// Whole content of `path`
    fn read_file(&mut self, path: &str) -> StorageResult<Vec<u8>>;

    /// Replace the content of `path`, creating it if absent
    fn write_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Add `data` to the end of `path`, creating it if absent
    fn append_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()>;

    fn remove_file(&mut self, path: &str) -> StorageResult<()>;

    fn rename_file(&mut self, from: &str, to: &str) -> StorageResult<()>;

    /// All files in the root directory
    fn entries(&mut self) -> StorageResult<Vec<EntryInfo>>;
}

impl<V: FlashVolume + ?Sized> FlashVolume for &mut V {
    fn mount(&mut self) -> StorageResult<()> {
        (**self).mount()
    }

    fn format(&mut self) -> StorageResult<()> {
        (**self).format()
    }

    fn total_bytes(&self) -> u64 {
        (**self).total_bytes()
    }

    fn used_bytes(&mut self) -> StorageResult<u64> {
        (**self).used_bytes()
    }

    fn file_size(&mut self, path: &str) -> StorageResult<Option<usize>> {
        (**self).file_size(path)
    }

    fn read_file(&mut self, path: &str) -> StorageResult<Vec<u8>> {
        (**self).read_file(path)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        (**self).write_file(path, data)
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> StorageResult<()> {
        (**self).append_file(path, data)
    }

    fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        (**self).remove_file(path)
    }

    fn rename_file(&mut self, from: &str, to: &str) -> StorageResult<()> {
        (**self).rename_file(from, to)
    }

    fn entries(&mut self) -> StorageResult<Vec<EntryInfo>> {
        (**self).entries()
    }
}

/// Access mode of an [`OpenFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start. The file must exist.
    Read,
    /// Create or truncate on open, then write from the start
    WriteTruncate,
    /// Create if absent, then write after the existing content
    Append,
}

/// Capacity accounting snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub total: u64,
    pub used: u64,
}

impl VolumeUsage {
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }

    /// Used share of the volume in percent, 0.0 for a zero-sized volume
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f32 / self.total as f32 * 100.0
    }
}

/// Enumeration of the root directory
///
/// The listing is a snapshot taken when [`FileStore::list_root`] was called;
/// call it again to restart.
#[derive(Debug)]
pub struct DirectoryListing {
    entries: alloc::vec::IntoIter<EntryInfo>,
}

impl Iterator for DirectoryListing {
    type Item = EntryInfo;

    fn next(&mut self) -> Option<EntryInfo> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for DirectoryListing {}

fn validate_path(path: &str) -> StorageResult<()> {
    let valid = path.len() > 1
        && path.len() <= MAX_PATH_LEN
        && path.starts_with('/')
        && !path[1..].contains('/');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath)
    }
}

/// Mounted flat filesystem
pub struct FileStore<V: FlashVolume> {
    volume: V,
}

impl<V: FlashVolume> FileStore<V> {
    /// Mount `volume`, optionally formatting it once if the first mount fails
    pub fn mount(mut volume: V, format_on_failure: bool) -> StorageResult<Self> {
        if let Err(e) = volume.mount() {
            if !format_on_failure {
                warn!("Volume mount failed: {:?}", e);
                return Err(StorageError::MountFailure);
            }

            warn!("Volume mount failed ({:?}), formatting", e);
            volume.format().map_err(|e| {
                error!("Volume format failed: {:?}", e);
                StorageError::MountFailure
            })?;
            volume.mount().map_err(|e| {
                error!("Volume mount after format failed: {:?}", e);
                StorageError::MountFailure
            })?;
        }

        Ok(Self { volume })
    }

    /// Give back the volume
    pub fn into_volume(self) -> V {
        self.volume
    }

    /// Open `path` in `mode`
    ///
    /// The returned handle borrows the store; close it (or drop it) before the
    /// next filesystem operation.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> StorageResult<OpenFile<'_, V>> {
        validate_path(path)?;

        let (data, base_len) = match mode {
            OpenMode::Read => (self.volume.read_file(path)?, 0),
            OpenMode::WriteTruncate => {
                self.volume.write_file(path, &[])?;
                (Vec::new(), 0)
            }
            OpenMode::Append => {
                let existing = match self.volume.file_size(path)? {
                    Some(size) => size,
                    None => {
                        self.volume.write_file(path, &[])?;
                        0
                    }
                };
                (Vec::new(), existing)
            }
        };

        Ok(OpenFile {
            store: self,
            path: path.to_string(),
            mode,
            data,
            base_len,
            cursor: 0,
            pending: false,
        })
    }

    pub fn exists(&mut self, path: &str) -> bool {
        if validate_path(path).is_err() {
            return false;
        }
        matches!(self.volume.file_size(path), Ok(Some(_)))
    }

    /// Rename `from` to `to`. Fails if `from` is absent or `to` is taken.
    pub fn rename(&mut self, from: &str, to: &str) -> StorageResult<()> {
        validate_path(from)?;
        validate_path(to)?;
        if self.volume.file_size(from)?.is_none() {
            return Err(StorageError::NotFound);
        }
        if self.volume.file_size(to)?.is_some() {
            return Err(StorageError::AlreadyExists);
        }
        self.volume.rename_file(from, to)
    }

    pub fn remove(&mut self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        if self.volume.file_size(path)?.is_none() {
            return Err(StorageError::NotFound);
        }
        self.volume.remove_file(path)
    }

    pub fn list_root(&mut self) -> StorageResult<DirectoryListing> {
        let mut entries = self.volume.entries()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(DirectoryListing {
            entries: entries.into_iter(),
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.volume.total_bytes()
    }

    pub fn used_bytes(&mut self) -> StorageResult<u64> {
        self.volume.used_bytes()
    }

    pub fn free_bytes(&mut self) -> StorageResult<u64> {
        Ok(self.usage()?.free())
    }

    /// Used share of the volume in percent, 0.0 for a zero-sized volume
    pub fn usage_percent(&mut self) -> StorageResult<f32> {
        Ok(self.usage()?.percent())
    }

    pub fn usage(&mut self) -> StorageResult<VolumeUsage> {
        Ok(VolumeUsage {
            total: self.total_bytes(),
            used: self.used_bytes()?,
        })
    }
}

/// Handle on one open file
///
/// Writes are buffered in the handle and reach the volume on [`close`],
/// [`flush`] or drop. Use `close` when the outcome matters: a flush error on
/// drop can only be logged.
///
/// [`close`]: OpenFile::close
/// [`flush`]: OpenFile::flush
pub struct OpenFile<'a, V: FlashVolume> {
    store: &'a mut FileStore<V>,
    path: String,
    mode: OpenMode,
    /// Read: whole content. Write: content since open. Append: bytes not yet flushed.
    data: Vec<u8>,
    /// Append: content already on the volume
    base_len: usize,
    cursor: usize,
    pending: bool,
}

impl<V: FlashVolume> OpenFile<'_, V> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Total size of the file as seen through this handle
    pub fn size(&self) -> usize {
        self.base_len + self.data.len()
    }

    /// Cursor position from the start of the file
    pub fn position(&self) -> usize {
        match self.mode {
            OpenMode::Read => self.cursor,
            OpenMode::WriteTruncate | OpenMode::Append => self.size(),
        }
    }

    /// Bytes left to read
    pub fn available(&self) -> usize {
        match self.mode {
            OpenMode::Read => self.data.len() - self.cursor,
            OpenMode::WriteTruncate | OpenMode::Append => 0,
        }
    }

    /// Next byte, or `None` at end of file (or on a write handle)
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.mode != OpenMode::Read {
            return None;
        }
        let byte = *self.data.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }

    /// Read through the next `delim` or to end of file
    ///
    /// The delimiter is consumed but not returned.
    pub fn read_line_until(&mut self, delim: u8) -> String {
        let mut line = Vec::new();
        while let Some(byte) = self.read_byte() {
            if byte == delim {
                break;
            }
            line.push(byte);
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    /// Buffer `data` for writing and return the number of bytes accepted
    pub fn write_bytes(&mut self, data: &[u8]) -> StorageResult<usize> {
        if self.mode == OpenMode::Read {
            return Err(StorageError::NotWritable);
        }
        self.data.extend_from_slice(data);
        self.pending = true;
        Ok(data.len())
    }

    /// Write `text` followed by a newline
    pub fn write_line(&mut self, text: &str) -> StorageResult<()> {
        self.write_bytes(text.as_bytes())?;
        self.write_bytes(b"\n")?;
        Ok(())
    }

    /// Push buffered writes to the volume
    pub fn flush(&mut self) -> StorageResult<()> {
        if !self.pending {
            return Ok(());
        }

        match self.mode {
            OpenMode::Read => {}
            OpenMode::WriteTruncate => self.store.volume.write_file(&self.path, &self.data)?,
            OpenMode::Append => {
                self.store.volume.append_file(&self.path, &self.data)?;
                self.base_len += self.data.len();
                self.data.clear();
            }
        }
        self.pending = false;
        Ok(())
    }

    /// Flush and release the handle
    ///
    /// A failed flush is reported here and not retried on drop.
    pub fn close(mut self) -> StorageResult<()> {
        let result = self.flush();
        self.pending = false;
        result
    }
}

impl<V: FlashVolume> core::fmt::Write for OpenFile<'_, V> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes())
            .map(|_| ())
            .map_err(|_| core::fmt::Error)
    }
}

impl<V: FlashVolume> Drop for OpenFile<'_, V> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush {} on drop: {:?}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RamVolume;
    use alloc::vec;
    use core::fmt::Write;

    fn store() -> FileStore<RamVolume> {
        FileStore::mount(RamVolume::new(4096), false).unwrap()
    }

    fn read_lines(fs: &mut FileStore<RamVolume>, path: &str) -> Vec<String> {
        let mut file = fs.open(path, OpenMode::Read).unwrap();
        let mut lines = Vec::new();
        while file.available() > 0 {
            lines.push(file.read_line_until(b'\n'));
        }
        lines
    }

    #[test]
    fn test_binary_file_round_trip() {
        let mut fs = store();
        let data: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

        let mut file = fs.open("/data.bin", OpenMode::WriteTruncate).unwrap();
        assert_eq!(file.write_bytes(&data).unwrap(), 10);
        file.close().unwrap();

        let mut file = fs.open("/data.bin", OpenMode::Read).unwrap();
        assert_eq!(file.size(), 10);
        let mut read = Vec::new();
        while let Some(b) = file.read_byte() {
            read.push(b);
        }
        assert_eq!(read, data);
        assert_eq!(file.available(), 0);
    }

    #[test]
    fn test_append_keeps_original_lines_in_order() {
        let mut fs = store();

        let mut file = fs.open("/test.txt", OpenMode::WriteTruncate).unwrap();
        for i in 0..5 {
            writeln!(file, "Line {}", i).unwrap();
        }
        file.close().unwrap();

        let mut file = fs.open("/test.txt", OpenMode::Append).unwrap();
        file.write_line("Appended line 1").unwrap();
        file.write_line("Appended line 2").unwrap();
        file.close().unwrap();

        let lines = read_lines(&mut fs, "/test.txt");
        assert_eq!(
            lines,
            vec![
                "Line 0",
                "Line 1",
                "Line 2",
                "Line 3",
                "Line 4",
                "Appended line 1",
                "Appended line 2"
            ]
        );
    }

    #[test]
    fn test_write_truncate_discards_old_content() {
        let mut fs = store();
        fs.open("/a.txt", OpenMode::WriteTruncate)
            .unwrap()
            .write_line("long old content")
            .unwrap();

        let mut file = fs.open("/a.txt", OpenMode::WriteTruncate).unwrap();
        file.write_line("new").unwrap();
        file.close().unwrap();

        assert_eq!(read_lines(&mut fs, "/a.txt"), vec!["new"]);
    }

    #[test]
    fn test_append_creates_missing_file() {
        let mut fs = store();
        let mut file = fs.open("/log.txt", OpenMode::Append).unwrap();
        assert_eq!(file.size(), 0);
        file.write_line("first").unwrap();
        file.close().unwrap();
        assert!(fs.exists("/log.txt"));
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let mut fs = store();
        {
            let mut file = fs.open("/drop.txt", OpenMode::WriteTruncate).unwrap();
            file.write_line("kept").unwrap();
        }
        assert_eq!(read_lines(&mut fs, "/drop.txt"), vec!["kept"]);
    }

    #[test]
    fn test_open_missing_file_for_read_fails() {
        let mut fs = store();
        assert!(matches!(
            fs.open("/missing.txt", OpenMode::Read),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn test_read_handle_is_not_writable() {
        let mut fs = store();
        fs.open("/r.txt", OpenMode::WriteTruncate).unwrap().close().unwrap();
        let mut file = fs.open("/r.txt", OpenMode::Read).unwrap();
        assert_eq!(file.write_bytes(b"x"), Err(StorageError::NotWritable));
    }

    #[test]
    fn test_rename_preserves_content() {
        let mut fs = store();
        let mut file = fs.open("/data.bin", OpenMode::WriteTruncate).unwrap();
        file.write_bytes(&[9, 8, 7]).unwrap();
        file.close().unwrap();

        fs.rename("/data.bin", "/renamed.bin").unwrap();

        assert!(!fs.exists("/data.bin"));
        assert!(fs.exists("/renamed.bin"));
        let mut file = fs.open("/renamed.bin", OpenMode::Read).unwrap();
        let read: Vec<u8> = core::iter::from_fn(|| file.read_byte()).collect();
        assert_eq!(read, vec![9, 8, 7]);
    }

    #[test]
    fn test_rename_errors() {
        let mut fs = store();
        assert_eq!(fs.rename("/a", "/b"), Err(StorageError::NotFound));

        fs.open("/a", OpenMode::WriteTruncate).unwrap().close().unwrap();
        fs.open("/b", OpenMode::WriteTruncate).unwrap().close().unwrap();
        assert_eq!(fs.rename("/a", "/b"), Err(StorageError::AlreadyExists));
    }

    #[test]
    fn test_delete_is_terminal() {
        let mut fs = store();
        fs.open("/gone.txt", OpenMode::WriteTruncate).unwrap().close().unwrap();

        fs.remove("/gone.txt").unwrap();
        assert!(!fs.exists("/gone.txt"));
        assert_eq!(fs.remove("/gone.txt"), Err(StorageError::NotFound));
    }

    #[test]
    fn test_listing_matches_exists_and_sizes() {
        let mut fs = store();
        assert_eq!(fs.list_root().unwrap().len(), 0);

        fs.open("/one.txt", OpenMode::WriteTruncate)
            .unwrap()
            .write_bytes(b"1")
            .unwrap();
        fs.open("/two.txt", OpenMode::WriteTruncate)
            .unwrap()
            .write_bytes(b"22")
            .unwrap();

        let listing: Vec<EntryInfo> = fs.list_root().unwrap().collect();
        assert_eq!(listing.len(), 2);
        for entry in &listing {
            assert!(fs.exists(&entry.name));
            let file = fs.open(&entry.name, OpenMode::Read).unwrap();
            assert_eq!(file.size(), entry.size);
        }
        for (path, size) in [("/one.txt", 1), ("/two.txt", 2)] {
            assert!(
                listing.iter().any(|e| e.name == path && e.size == size),
                "{} missing from {:?}",
                path,
                listing
            );
        }

        fs.remove("/one.txt").unwrap();
        let names: Vec<String> = fs.list_root().unwrap().map(|e| e.name).collect();
        assert_eq!(names, vec!["/two.txt"]);
        assert!(!fs.exists("/one.txt"));
    }

    #[test]
    fn test_invalid_paths() {
        let mut fs = store();
        for path in ["", "/", "no-slash", "/nested/file", "/this-name-is-far-too-long-for-flash"] {
            assert!(matches!(
                fs.open(path, OpenMode::WriteTruncate),
                Err(StorageError::InvalidPath)
            ));
            assert!(!fs.exists(path));
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut fs = store();
        fs.open("/File.txt", OpenMode::WriteTruncate).unwrap().close().unwrap();
        assert!(fs.exists("/File.txt"));
        assert!(!fs.exists("/file.txt"));
    }

    #[test]
    fn test_full_volume_rejects_write() {
        let mut fs = FileStore::mount(RamVolume::new(8), false).unwrap();
        let mut file = fs.open("/big.bin", OpenMode::WriteTruncate).unwrap();
        file.write_bytes(&[0u8; 16]).unwrap();
        assert_eq!(file.close(), Err(StorageError::NoSpace));
    }

    #[test]
    fn test_format_on_failure() {
        assert!(matches!(
            FileStore::mount(RamVolume::unformatted(1024), false),
            Err(StorageError::MountFailure)
        ));

        let mut fs = FileStore::mount(RamVolume::unformatted(1024), true).unwrap();
        assert_eq!(fs.list_root().unwrap().len(), 0);
    }

    #[test]
    fn test_mount_failure_after_format() {
        let mut volume = RamVolume::unformatted(1024);
        volume.fail_mounts(true);
        assert!(matches!(
            FileStore::mount(volume, true),
            Err(StorageError::MountFailure)
        ));
    }

    #[test]
    fn test_usage_percent() {
        let mut fs = store();
        fs.open("/q.bin", OpenMode::WriteTruncate)
            .unwrap()
            .write_bytes(&[0u8; 1024])
            .unwrap();

        let usage = fs.usage().unwrap();
        assert_eq!(usage.used, 1024);
        assert_eq!(usage.free(), 3072);
        let delta = usage.percent() - 25.0;
        assert!(delta > -1e-3 && delta < 1e-3);
        assert_eq!(fs.free_bytes().unwrap(), 3072);

        let empty = VolumeUsage { total: 0, used: 0 };
        assert_eq!(empty.percent(), 0.0);
    }
}
