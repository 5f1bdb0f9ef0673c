//! Backing media for the [`ByteStore`](super::ByteStore).

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use super::{StorageError, StorageResult};

/// Durable region that a [`ByteStore`](super::ByteStore) mirrors.
///
/// A medium only ever moves whole images: the store loads the region once at
/// mount and writes it back in one go on commit, so each physical write is a
/// single (expensive) operation.
pub trait PersistentMedium {
    /// Size of the durable region in bytes
    fn size(&self) -> usize;

    /// Fill `buf` with the first `buf.len()` bytes of the region.
    fn load(&mut self, buf: &mut [u8]) -> StorageResult<()>;

    /// Persist `data` at the start of the region.
    fn store(&mut self, data: &[u8]) -> StorageResult<()>;
}

impl<M: PersistentMedium + ?Sized> PersistentMedium for &mut M {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn load(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        (**self).load(buf)
    }

    fn store(&mut self, data: &[u8]) -> StorageResult<()> {
        (**self).store(data)
    }
}

/// Value of an erased flash byte
pub const ERASED_BYTE: u8 = 0xFF;

/// RAM-backed medium used by the simulator and tests
///
/// Holds the "durable" image separately from any store mirror, so dropping a
/// [`ByteStore`](super::ByteStore) without committing behaves like a power
/// cycle. Load and store faults can be injected.
#[derive(Debug, Clone)]
pub struct RamMedium {
    image: Vec<u8>,
    fail_load: bool,
    fail_store: bool,
    store_count: usize,
}

impl RamMedium {
    /// Create an erased medium of `size` bytes
    pub fn new(size: usize) -> Self {
        Self::from_image(vec![ERASED_BYTE; size])
    }

    /// Create a medium holding an existing image
    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            image,
            fail_load: false,
            fail_store: false,
            store_count: 0,
        }
    }

    /// The durable image
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Number of successful `store` calls
    pub fn store_count(&self) -> usize {
        self.store_count
    }

    /// Make every subsequent `load` fail
    pub fn fail_loads(&mut self, fail: bool) {
        self.fail_load = fail;
    }

    /// Make every subsequent `store` fail
    pub fn fail_stores(&mut self, fail: bool) {
        self.fail_store = fail;
    }
}

impl PersistentMedium for RamMedium {
    fn size(&self) -> usize {
        self.image.len()
    }

    fn load(&mut self, buf: &mut [u8]) -> StorageResult<()> {
        if self.fail_load {
            return Err(StorageError::device("injected load fault"));
        }
        let src = self.image.get(..buf.len()).ok_or(StorageError::OutOfRange {
            addr: 0,
            len: buf.len(),
            capacity: self.image.len(),
        })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn store(&mut self, data: &[u8]) -> StorageResult<()> {
        if self.fail_store {
            return Err(StorageError::device("injected store fault"));
        }
        let capacity = self.image.len();
        let dst = self
            .image
            .get_mut(..data.len())
            .ok_or(StorageError::OutOfRange {
                addr: 0,
                len: data.len(),
                capacity,
            })?;
        dst.copy_from_slice(data);
        self.store_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_medium_is_erased() {
        let medium = RamMedium::new(16);
        assert!(medium.image().iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn test_store_then_load() {
        let mut medium = RamMedium::new(8);
        medium.store(&[1, 2, 3]).unwrap();

        let mut buf = [0u8; 4];
        medium.load(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, ERASED_BYTE]);
        assert_eq!(medium.store_count(), 1);
    }

    #[test]
    fn test_injected_faults() {
        let mut medium = RamMedium::new(8);
        medium.fail_stores(true);
        assert!(matches!(medium.store(&[0]), Err(StorageError::Device(_))));
        medium.fail_loads(true);
        assert!(medium.load(&mut [0u8; 1]).is_err());
    }

    #[test]
    fn test_load_past_end_is_rejected() {
        let mut medium = RamMedium::new(4);
        assert!(matches!(
            medium.load(&mut [0u8; 8]),
            Err(StorageError::OutOfRange { .. })
        ));
    }
}
