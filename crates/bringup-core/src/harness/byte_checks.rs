//! Byte-store battery
//!
//! Every check writes its record, commits straight away and reads it back.

extern crate alloc;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use log::info;

use super::{CheckFailure, CheckOutcome, Finding, Verdict, run_battery};
use crate::config::HarnessConfig;
use crate::storage::{ByteStore, PersistentMedium, StorageResult};

struct ByteBattery<'a, M: PersistentMedium> {
    store: &'a mut ByteStore<M>,
    config: &'a HarnessConfig,
}

impl<M: PersistentMedium> ByteBattery<'_, M> {
    fn single_byte(&mut self) -> StorageResult<Finding> {
        let addr = self.config.layout.byte.addr;
        let written = self.config.test_byte;

        self.store.write_byte(addr, written)?;
        self.store.commit()?;
        let read = self.store.read_byte(addr)?;

        Ok(Finding::pass_if(
            read == written,
            CheckFailure::Mismatch,
            format!("Written: {}, Read: {}", written, read),
        ))
    }

    fn integer(&mut self) -> StorageResult<Finding> {
        let addr = self.config.layout.integer.addr;
        let written = self.config.test_integer;

        self.store.put(addr, &written)?;
        self.store.commit()?;
        let read: i32 = self.store.get(addr)?;

        Ok(Finding::pass_if(
            read == written,
            CheckFailure::Mismatch,
            format!("Written: {}, Read: {}", written, read),
        ))
    }

    fn float(&mut self) -> StorageResult<Finding> {
        let addr = self.config.layout.float.addr;
        let written = self.config.test_float;

        self.store.put(addr, &written)?;
        self.store.commit()?;
        let read: f32 = self.store.get(addr)?;

        // A NaN read-back yields a NaN delta and fails the comparison
        let delta = if read > written { read - written } else { written - read };
        Ok(Finding::pass_if(
            delta < self.config.float_tolerance,
            CheckFailure::ToleranceExceeded { delta },
            format!("Written: {:.5}, Read: {:.5}", written, read),
        ))
    }

    fn string(&mut self) -> StorageResult<Finding> {
        let addr = self.config.layout.string.addr;
        let written = self.config.test_string.as_str();

        self.store.write_cstr(addr, written)?;
        self.store.commit()?;
        let read = self.store.read_cstr(addr, self.config.string_cap)?;

        Ok(Finding::pass_if(
            read == written,
            CheckFailure::Mismatch,
            format!("Written: '{}', Read: '{}'", written, read),
        ))
    }

    fn byte_array(&mut self) -> StorageResult<Finding> {
        let addr = self.config.layout.array.addr;
        let written = self.config.test_array;

        for (i, &b) in written.iter().enumerate() {
            self.store.write_byte(addr + i, b)?;
        }
        self.store.commit()?;

        let mut read = [0u8; 5];
        for (i, slot) in read.iter_mut().enumerate() {
            *slot = self.store.read_byte(addr + i)?;
        }

        info!("  Written: {:?}", written);
        info!("  Read:    {:?}", read);

        Ok(Finding::pass_if(
            read == written,
            CheckFailure::Mismatch,
            format!("Result: {} of {} bytes match", matching(&written, &read), written.len()),
        ))
    }

    fn clear_section(&mut self) -> StorageResult<Finding> {
        let region = self.config.layout.clear;
        let value = self.config.clear_value;

        self.store.fill(region.addr, region.len, value)?;
        self.store.commit()?;

        let mut read = vec![0u8; region.len];
        self.store.read_bytes(region.addr, &mut read)?;
        let cleared = read.iter().filter(|&&b| b == value).count();

        Ok(Finding::pass_if(
            cleared == region.len,
            CheckFailure::Mismatch,
            format!("Cleared {} of {} bytes to 0x{:02X}", cleared, region.len, value),
        ))
    }
}

type ByteCheck<'a, M> = fn(&mut ByteBattery<'a, M>) -> StorageResult<Finding>;

/// The checks in running order
fn byte_check_table<'a, M: PersistentMedium>() -> [(&'static str, ByteCheck<'a, M>); 6] {
    [
        ("Write/Read single byte", ByteBattery::single_byte),
        ("Write/Read integer", ByteBattery::integer),
        ("Write/Read float", ByteBattery::float),
        ("Write/Read string", ByteBattery::string),
        ("Write/Read byte array", ByteBattery::byte_array),
        ("Clear byte-store section", ByteBattery::clear_section),
    ]
}

fn matching(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x == y).count()
}

/// Run the six byte-store checks against a mounted store
///
/// The record layout is validated first; an unusable layout is reported as a
/// single failed check and nothing is written.
pub fn run_byte_checks<M: PersistentMedium>(
    store: &mut ByteStore<M>,
    config: &HarnessConfig,
) -> Vec<CheckOutcome> {
    if let Err(e) = config.validate(store.capacity()) {
        let outcome = CheckOutcome {
            name: "Record layout",
            detail: format!("{}", e),
            verdict: Verdict::Fail(CheckFailure::Layout(e)),
        };
        outcome.log();
        return vec![outcome];
    }

    let mut battery = ByteBattery { store, config };
    run_battery(&mut battery, &byte_check_table())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LayoutError, Region};
    use crate::storage::RamMedium;

    fn run(config: &HarnessConfig, medium: &mut RamMedium) -> Vec<CheckOutcome> {
        let mut store = ByteStore::mount(medium, config.store_capacity).unwrap();
        run_byte_checks(&mut store, config)
    }

    #[test]
    fn test_all_checks_pass_and_persist() {
        let config = HarnessConfig::default();
        let mut medium = RamMedium::new(512);

        let outcomes = run(&config, &mut medium);
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.verdict.is_pass()), "{:#?}", outcomes);

        // Every check committed, so a fresh mount sees the records
        let store = ByteStore::mount(&mut medium, 512).unwrap();
        assert_eq!(store.read_byte(0).unwrap(), 42);
        assert_eq!(store.get::<i32>(10).unwrap(), 12345);
        assert_eq!(store.read_cstr(30, 50).unwrap(), "ESP32-S3");
        assert_eq!(store.get::<[u8; 5]>(100).unwrap(), [10, 20, 30, 40, 50]);
        assert_eq!(store.get::<[u8; 10]>(200).unwrap(), [0xFF; 10]);
    }

    #[test]
    fn test_clear_check_overwrites_previous_content() {
        let config = HarnessConfig::default();
        let mut medium = RamMedium::from_image(vec![0u8; 512]);

        let outcomes = run(&config, &mut medium);
        assert!(outcomes[5].verdict.is_pass());
        assert_eq!(&medium.image()[200..210], &[0xFF; 10]);
    }

    #[test]
    fn test_commit_failure_is_reported_per_check() {
        let config = HarnessConfig::default();
        let mut medium = RamMedium::new(512);
        medium.fail_stores(true);

        let outcomes = run(&config, &mut medium);
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| matches!(
            o.verdict,
            Verdict::Fail(CheckFailure::Storage(_))
        )));
    }

    #[test]
    fn test_overlapping_layout_is_refused() {
        let mut config = HarnessConfig::default();
        config.layout.array = Region::new(35, 5);
        let mut medium = RamMedium::new(512);

        let outcomes = run(&config, &mut medium);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].verdict,
            Verdict::Fail(CheckFailure::Layout(_))
        ));
        assert_eq!(medium.store_count(), 0);
    }

    #[test]
    fn test_short_integer_region_is_refused_before_writing() {
        let mut config = HarnessConfig::default();
        config.layout.integer = Region::new(10, 1);
        config.layout.float = Region::new(11, 4);
        let mut medium = RamMedium::new(512);

        let outcomes = run(&config, &mut medium);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].verdict,
            Verdict::Fail(CheckFailure::Layout(LayoutError::RegionTooShort { name: "integer", .. }))
        ));
        assert_eq!(medium.store_count(), 0);
    }

    #[test]
    fn test_float_outside_tolerance_fails() {
        let config = HarnessConfig {
            float_tolerance: 0.0,
            ..HarnessConfig::default()
        };
        let mut medium = RamMedium::new(512);

        let outcomes = run(&config, &mut medium);
        assert!(matches!(
            outcomes[2].verdict,
            Verdict::Fail(CheckFailure::ToleranceExceeded { .. })
        ));
    }
}
