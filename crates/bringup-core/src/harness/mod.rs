//! Storage self-test harness
//!
//! Runs a fixed battery of write / read / compare checks against the
//! byte-store and then the filesystem, logging a PASS/FAIL line per check and
//! collecting the outcomes in a [`HarnessReport`].
//!
//! A failing check never stops a battery. A failed mount skips the battery
//! that needed it and nothing else.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = HarnessConfig::default();
//! let harness = SelfTestHarness::new(&config);
//! let report = harness.run(&mut medium, &mut volume, &|| uptime_ms());
//! ```

mod byte_checks;
mod file_checks;

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::config::{HarnessConfig, LayoutError};
use crate::storage::{ByteStore, FileStore, FlashVolume, PersistentMedium, StorageError};

pub use byte_checks::run_byte_checks;
pub use file_checks::run_file_checks;

/// Source of the milliseconds-since-boot value written into the text file
pub trait Uptime {
    fn uptime_ms(&self) -> u64;
}

impl<F: Fn() -> u64> Uptime for F {
    fn uptime_ms(&self) -> u64 {
        self()
    }
}

/// Why a check failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    /// Read-back differs from what was written
    #[error("Value mismatch")]
    Mismatch,

    /// Float read-back outside the configured tolerance
    #[error("Tolerance exceeded (delta {delta})")]
    ToleranceExceeded { delta: f32 },

    /// A storage operation failed while running the check
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// The byte-store record layout is unusable
    #[error("Layout error: {0}")]
    Layout(LayoutError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(CheckFailure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Console token for the verdict
    pub fn token(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail(_) => "FAIL",
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub verdict: Verdict,
    /// Written / expected / actual values, human readable
    pub detail: String,
}

impl CheckOutcome {
    pub fn storage_error(name: &'static str, err: StorageError) -> Self {
        Self {
            name,
            detail: alloc::format!("{}", err),
            verdict: Verdict::Fail(CheckFailure::Storage(err)),
        }
    }

    fn log(&self) {
        match &self.verdict {
            Verdict::Pass => info!("  {} - {}", self.detail, self.verdict.token()),
            Verdict::Fail(why) => warn!("  {} - {} ({})", self.detail, self.verdict.token(), why),
        }
    }
}

/// Verdict and detail produced by a check body; the battery adds the name
pub(crate) struct Finding {
    verdict: Verdict,
    detail: String,
}

impl Finding {
    /// Pass when `ok`, otherwise fail with `failure`
    pub(crate) fn pass_if(ok: bool, failure: CheckFailure, detail: String) -> Self {
        Self {
            verdict: if ok { Verdict::Pass } else { Verdict::Fail(failure) },
            detail,
        }
    }
}

/// Which store a section of the report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    ByteStore,
    FileStore,
}

impl Section {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ByteStore => "Byte-store",
            Self::FileStore => "Filesystem",
        }
    }
}

/// Outcomes of one battery
#[derive(Debug, Clone, PartialEq)]
pub struct SectionReport {
    pub section: Section,
    /// False when the store could not be mounted and no check ran
    pub mounted: bool,
    pub checks: Vec<CheckOutcome>,
}

impl SectionReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.verdict.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.mounted && self.failed() == 0
    }

    /// Outcome of the check called `name`
    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Outcomes of a full harness run
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessReport {
    pub byte_store: SectionReport,
    pub file_store: SectionReport,
}

impl HarnessReport {
    pub fn passed(&self) -> usize {
        self.byte_store.passed() + self.file_store.passed()
    }

    pub fn failed(&self) -> usize {
        self.byte_store.failed() + self.file_store.failed()
    }

    pub fn all_passed(&self) -> bool {
        self.byte_store.all_passed() && self.file_store.all_passed()
    }
}

/// Run each `(name, check)` pair in order, logging a heading and verdict for each
fn run_battery<S: ?Sized>(
    subject: &mut S,
    checks: &[(&'static str, fn(&mut S) -> Result<Finding, StorageError>)],
) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::with_capacity(checks.len());
    for (i, &(name, check)) in checks.iter().enumerate() {
        info!("");
        info!("Test {}: {}", i + 1, name);
        let outcome = match check(&mut *subject) {
            Ok(finding) => CheckOutcome {
                name,
                verdict: finding.verdict,
                detail: finding.detail,
            },
            Err(e) => CheckOutcome::storage_error(name, e),
        };
        outcome.log();
        outcomes.push(outcome);
    }
    outcomes
}

/// Drives both batteries
pub struct SelfTestHarness<'c> {
    config: &'c HarnessConfig,
}

impl<'c> SelfTestHarness<'c> {
    pub fn new(config: &'c HarnessConfig) -> Self {
        Self { config }
    }

    /// Run the byte-store battery, then the filesystem battery
    pub fn run<M, V, U>(&self, medium: M, volume: V, uptime: &U) -> HarnessReport
    where
        M: PersistentMedium,
        V: FlashVolume,
        U: Uptime + ?Sized,
    {
        let byte_store = self.run_byte_store(medium);
        let file_store = self.run_file_store(volume, uptime);
        let report = HarnessReport {
            byte_store,
            file_store,
        };

        info!("");
        info!("========================================");
        info!(
            "All tests completed! {} passed, {} failed",
            report.passed(),
            report.failed()
        );
        info!("========================================");
        report
    }

    /// Mount a byte-store over `medium` and run its battery
    pub fn run_byte_store<M: PersistentMedium>(&self, medium: M) -> SectionReport {
        let section = Section::ByteStore;
        section_banner(section, "Start");

        let mut report = SectionReport {
            section,
            mounted: false,
            checks: Vec::new(),
        };

        match ByteStore::mount(medium, self.config.store_capacity) {
            Ok(mut store) => {
                info!("✓ Byte-store initialized successfully");
                info!("✓ Byte-store size: {} bytes", store.capacity());
                report.mounted = true;
                report.checks = run_byte_checks(&mut store, self.config);
            }
            Err(e) => error!("✗ Failed to initialize byte-store: {}", e),
        }

        section_banner(section, "Complete");
        report
    }

    /// Mount a filesystem over `volume` and run its battery
    pub fn run_file_store<V, U>(&self, volume: V, uptime: &U) -> SectionReport
    where
        V: FlashVolume,
        U: Uptime + ?Sized,
    {
        let section = Section::FileStore;
        section_banner(section, "Start");

        let mut report = SectionReport {
            section,
            mounted: false,
            checks: Vec::new(),
        };

        match FileStore::mount(volume, self.config.format_on_failure) {
            Ok(mut fs) => {
                info!("✓ Filesystem mounted successfully");
                report.mounted = true;
                report.checks = run_file_checks(&mut fs, self.config, uptime.uptime_ms());
            }
            Err(e) => error!("✗ Filesystem mount failed: {}", e),
        }

        section_banner(section, "Complete");
        report
    }
}

fn section_banner(section: Section, phase: &str) {
    info!("");
    info!("--- {} Test {} ---", section.label(), phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RamMedium, RamVolume};

    #[test]
    fn test_full_run_passes_on_healthy_media() {
        let config = HarnessConfig::default();
        let mut medium = RamMedium::new(4096);
        let mut volume = RamVolume::new(64 * 1024);

        let report = SelfTestHarness::new(&config).run(&mut medium, &mut volume, &|| 1234u64);

        assert!(report.all_passed(), "{:#?}", report);
        assert_eq!(report.byte_store.checks.len(), 6);
        assert_eq!(report.file_store.checks.len(), 9);
        assert_eq!(report.passed(), 15);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn test_byte_store_mount_failure_does_not_stop_file_battery() {
        let config = HarnessConfig::default();
        let mut medium = RamMedium::new(4096);
        medium.fail_loads(true);
        let volume = RamVolume::new(64 * 1024);

        let report = SelfTestHarness::new(&config).run(&mut medium, volume, &|| 0u64);

        assert!(!report.byte_store.mounted);
        assert!(report.byte_store.checks.is_empty());
        assert!(!report.byte_store.all_passed());
        assert!(report.file_store.all_passed());
    }

    #[test]
    fn test_file_mount_failure_skips_file_battery() {
        let config = HarnessConfig {
            format_on_failure: false,
            ..HarnessConfig::default()
        };
        let report = SelfTestHarness::new(&config).run(
            RamMedium::new(512),
            RamVolume::unformatted(1024),
            &|| 0u64,
        );

        assert!(report.byte_store.all_passed());
        assert!(!report.file_store.mounted);
        assert!(report.file_store.checks.is_empty());
    }

    #[test]
    fn test_unformatted_volume_is_formatted_and_tested() {
        let config = HarnessConfig::default();
        let report = SelfTestHarness::new(&config).run(
            RamMedium::new(512),
            RamVolume::unformatted(8 * 1024),
            &|| 0u64,
        );
        assert!(report.file_store.all_passed());
    }

    #[test]
    fn test_closures_provide_uptime() {
        let uptime = || 42u64;
        assert_eq!(uptime.uptime_ms(), 42);
    }
}
