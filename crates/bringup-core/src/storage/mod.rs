//! Durable storage: the persistent byte-store and the flat flash filesystem.
//!
//! Both stores are plain values built from an explicit backing device
//! ([`PersistentMedium`] / [`FlashVolume`]) and handed to whoever needs
//! them. There are no process-wide instances.

pub mod byte_store;
pub mod file_store;
pub mod medium;
pub mod ram_volume;

pub use byte_store::{ByteStore, StoreValue};
pub use file_store::{
    DirectoryListing, EntryInfo, FileStore, FlashVolume, MAX_PATH_LEN, OpenFile, OpenMode, VolumeUsage,
};
pub use medium::{PersistentMedium, RamMedium};
pub use ram_volume::{RamVolume, VolumeImage};

use core::fmt::Write;

use thiserror_no_std::Error;

/// Error types for byte-store and filesystem operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The store or filesystem could not be initialized
    #[error("Mount failed")]
    MountFailure,

    /// Open, rename or remove target does not exist
    #[error("Not found")]
    NotFound,

    /// Rename target already exists
    #[error("Already exists")]
    AlreadyExists,

    /// Address range outside the store capacity
    #[error("Address range {addr}+{len} outside capacity {capacity}")]
    OutOfRange {
        /// First byte of the rejected access
        addr: usize,
        /// Length of the rejected access
        len: usize,
        /// Capacity of the store
        capacity: usize,
    },

    /// Path is empty, not rooted, nested or too long
    #[error("Invalid path")]
    InvalidPath,

    /// The volume has no room for the data
    #[error("No space left on volume")]
    NoSpace,

    /// Write attempted through a read-only handle
    #[error("Handle not open for writing")]
    NotWritable,

    /// Backend device fault
    #[error("Device error: {0}")]
    Device(heapless::String<64>),
}

impl StorageError {
    /// Build a [`StorageError::Device`] from any debuggable backend error.
    ///
    /// The message is truncated to the 64 bytes the variant can hold.
    pub fn device(err: impl core::fmt::Debug) -> Self {
        let mut msg = heapless::String::<64>::new();
        let _ = write!(Truncating(&mut msg), "{:?}", err);
        Self::Device(msg)
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// `fmt::Write` adapter that drops whatever no longer fits.
struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_truncates_long_messages() {
        let long = "x".repeat(200);
        match StorageError::device(long) {
            StorageError::Device(msg) => assert_eq!(msg.len(), 64),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
