//! Fixed-capacity persistent byte-store with explicit commit.
//!
//! Models an EEPROM emulated on flash: the whole region is mirrored in RAM,
//! reads and writes only touch the mirror, and [`ByteStore::commit`] is the
//! single point where data becomes durable. Anything written but not
//! committed is lost when the store is dropped.
//!
//! Record placement is the caller's job. The store checks every access
//! against its capacity but does not know where one record ends and the
//! next begins, so overlapping records silently clobber each other.

extern crate alloc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;

use super::{PersistentMedium, StorageError, StorageResult};

/// A value with a fixed-width little-endian encoding in the store
pub trait StoreValue: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes long
    fn encode(&self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `SIZE` bytes long
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_store_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StoreValue for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                fn encode(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_store_value!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<const N: usize> StoreValue for [u8; N] {
    const SIZE: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; N];
        raw.copy_from_slice(bytes);
        raw
    }
}

/// String terminator written by [`ByteStore::write_cstr`]
pub const CSTR_SENTINEL: u8 = 0;

/// Persistent byte-store mirrored in RAM
pub struct ByteStore<M: PersistentMedium> {
    medium: M,
    mirror: Vec<u8>,
    dirty: bool,
}

impl<M: PersistentMedium> ByteStore<M> {
    /// Mount a store of `capacity` bytes over `medium`
    ///
    /// Loads the durable image into the mirror. Fails with
    /// [`StorageError::MountFailure`] when the capacity is zero or larger than
    /// the medium, or when the medium cannot be read.
    pub fn mount(mut medium: M, capacity: usize) -> StorageResult<Self> {
        if capacity == 0 || capacity > medium.size() {
            return Err(StorageError::MountFailure);
        }

        let mut mirror = vec![0u8; capacity];
        medium.load(&mut mirror).map_err(|e| {
            debug!("Byte-store load failed: {:?}", e);
            StorageError::MountFailure
        })?;

        Ok(Self {
            medium,
            mirror,
            dirty: false,
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.mirror.len()
    }

    /// Whether the mirror holds writes that have not been committed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Give back the medium, discarding any uncommitted writes
    pub fn into_medium(self) -> M {
        self.medium
    }

    /// Capacity-checked view of `len` bytes at `addr`
    fn span(&self, addr: usize, len: usize) -> StorageResult<core::ops::Range<usize>> {
        let capacity = self.capacity();
        match addr.checked_add(len) {
            Some(end) if end <= capacity => Ok(addr..end),
            _ => Err(StorageError::OutOfRange {
                addr,
                len,
                capacity,
            }),
        }
    }

    pub fn read_byte(&self, addr: usize) -> StorageResult<u8> {
        let range = self.span(addr, 1)?;
        Ok(self.mirror[range.start])
    }

    pub fn write_byte(&mut self, addr: usize, value: u8) -> StorageResult<()> {
        let range = self.span(addr, 1)?;
        self.mirror[range.start] = value;
        self.dirty = true;
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `addr` into `buf`
    pub fn read_bytes(&self, addr: usize, buf: &mut [u8]) -> StorageResult<()> {
        let range = self.span(addr, buf.len())?;
        buf.copy_from_slice(&self.mirror[range]);
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: usize, data: &[u8]) -> StorageResult<()> {
        let range = self.span(addr, data.len())?;
        self.mirror[range].copy_from_slice(data);
        self.dirty = true;
        Ok(())
    }

    /// Set `len` bytes starting at `addr` to `value`
    pub fn fill(&mut self, addr: usize, len: usize, value: u8) -> StorageResult<()> {
        let range = self.span(addr, len)?;
        self.mirror[range].fill(value);
        self.dirty = true;
        Ok(())
    }

    /// Write a fixed-width value at `addr`
    pub fn put<T: StoreValue>(&mut self, addr: usize, value: &T) -> StorageResult<()> {
        let range = self.span(addr, T::SIZE)?;
        value.encode(&mut self.mirror[range]);
        self.dirty = true;
        Ok(())
    }

    /// Read a fixed-width value at `addr`
    pub fn get<T: StoreValue>(&self, addr: usize) -> StorageResult<T> {
        let range = self.span(addr, T::SIZE)?;
        Ok(T::decode(&self.mirror[range]))
    }

    /// Write `text` followed by [`CSTR_SENTINEL`]
    pub fn write_cstr(&mut self, addr: usize, text: &str) -> StorageResult<()> {
        let bytes = text.as_bytes();
        let range = self.span(addr, bytes.len() + 1)?;
        let (body, tail) = self.mirror[range].split_at_mut(bytes.len());
        body.copy_from_slice(bytes);
        tail[0] = CSTR_SENTINEL;
        self.dirty = true;
        Ok(())
    }

    /// Read bytes from `addr` until [`CSTR_SENTINEL`] or `max_len` bytes
    ///
    /// Bytes that are not valid UTF-8 are replaced, so erased flash (0xFF)
    /// reads back as replacement characters rather than an error.
    pub fn read_cstr(&self, addr: usize, max_len: usize) -> StorageResult<String> {
        let mut raw = Vec::new();
        for offset in 0..max_len {
            let byte = self.read_byte(addr.saturating_add(offset))?;
            if byte == CSTR_SENTINEL {
                break;
            }
            raw.push(byte);
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Flush the mirror to the medium
    ///
    /// A commit with nothing dirty does not touch the medium. On failure the
    /// store stays dirty and the mirror is left as is.
    pub fn commit(&mut self) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.medium.store(&self.mirror)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RamMedium;

    fn mounted(medium: &mut RamMedium) -> ByteStore<&mut RamMedium> {
        ByteStore::mount(medium, 512).unwrap()
    }

    #[test]
    fn test_integer_round_trip_at_address_10() {
        let mut medium = RamMedium::new(512);
        let mut store = mounted(&mut medium);

        store.put(10, &12345i32).unwrap();
        store.commit().unwrap();

        assert_eq!(store.get::<i32>(10).unwrap(), 12345);
    }

    #[test]
    fn test_exact_round_trips() {
        let mut medium = RamMedium::new(512);
        let mut store = mounted(&mut medium);

        store.write_byte(0, 42).unwrap();
        store.put(40, &-7i64).unwrap();
        store.put(60, &u16::MAX).unwrap();
        store.put(100, &[10u8, 20, 30, 40, 50]).unwrap();
        store.write_cstr(30, "ESP32-S3").unwrap();
        store.commit().unwrap();

        assert_eq!(store.read_byte(0).unwrap(), 42);
        assert_eq!(store.get::<i64>(40).unwrap(), -7);
        assert_eq!(store.get::<u16>(60).unwrap(), u16::MAX);
        assert_eq!(store.get::<[u8; 5]>(100).unwrap(), [10, 20, 30, 40, 50]);
        assert_eq!(store.read_cstr(30, 50).unwrap(), "ESP32-S3");
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_float_round_trip_within_tolerance() {
        let mut medium = RamMedium::new(512);
        let mut store = mounted(&mut medium);

        let written = 3.14159f32;
        store.put(20, &written).unwrap();
        store.commit().unwrap();

        let read: f32 = store.get(20).unwrap();
        let delta = written - read;
        assert!(delta > -1e-4 && delta < 1e-4);
    }

    #[test]
    fn test_uncommitted_write_visible_in_session_but_lost_on_remount() {
        let mut medium = RamMedium::new(512);
        {
            let mut store = mounted(&mut medium);
            store.write_byte(5, 0x11).unwrap();
            store.commit().unwrap();

            store.write_byte(5, 0x22).unwrap();
            assert_eq!(store.read_byte(5).unwrap(), 0x22);
            assert!(store.is_dirty());
        }

        let store = mounted(&mut medium);
        assert_eq!(store.read_byte(5).unwrap(), 0x11);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut medium = RamMedium::new(512);
        {
            let mut store = mounted(&mut medium);
            store.write_byte(3, 9).unwrap();
            store.commit().unwrap();
            store.commit().unwrap();
            assert_eq!(store.read_byte(3).unwrap(), 9);
        }
        assert_eq!(medium.store_count(), 1);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let mut medium = RamMedium::new(512);
        let mut store = mounted(&mut medium);

        assert_eq!(
            store.write_byte(512, 1),
            Err(StorageError::OutOfRange {
                addr: 512,
                len: 1,
                capacity: 512
            })
        );
        assert!(store.get::<i32>(510).is_err());
        assert!(store.read_bytes(usize::MAX, &mut [0u8; 2]).is_err());
        assert!(store.write_cstr(505, "ESP32-S3").is_err());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_read_cstr_stops_at_cap() {
        let mut medium = RamMedium::new(512);
        let mut store = mounted(&mut medium);

        store.fill(0, 100, b'a').unwrap();
        assert_eq!(store.read_cstr(0, 50).unwrap().len(), 50);
    }

    #[test]
    fn test_mount_failures() {
        let mut medium = RamMedium::new(64);
        assert!(matches!(
            ByteStore::mount(&mut medium, 0),
            Err(StorageError::MountFailure)
        ));
        assert!(matches!(
            ByteStore::mount(&mut medium, 128),
            Err(StorageError::MountFailure)
        ));

        medium.fail_loads(true);
        assert!(matches!(
            ByteStore::mount(&mut medium, 64),
            Err(StorageError::MountFailure)
        ));
    }

    #[test]
    fn test_failed_commit_keeps_mirror_and_dirty_flag() {
        let mut medium = RamMedium::new(512);
        medium.fail_stores(true);
        let mut store = mounted(&mut medium);

        store.write_byte(0, 7).unwrap();
        assert!(store.commit().is_err());
        assert!(store.is_dirty());
        assert_eq!(store.read_byte(0).unwrap(), 7);
    }
}
