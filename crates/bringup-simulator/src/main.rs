//! Desktop runner for the bringup-rs board sequence.
//!
//! Runs the same start-up sequence as the firmware against in-memory
//! storage: actuator pulses, the byte-store and filesystem self-test, then
//! the GPS ingest loop fed from a recorded NMEA stream.
//!
//! # Environment
//!
//! Read from the process environment or a `.env` file.
//!
//! | Variable            | Effect                                                  |
//! |---------------------|---------------------------------------------------------|
//! | `BRINGUP_STATE_DIR` | Keep the byte-store and volume images here between runs |
//! | `BRINGUP_NMEA`      | Replay this NMEA capture instead of the built-in one    |
//! | `RUST_LOG`          | Log filter, `info` by default                           |

use std::collections::VecDeque;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use bringup_core::actuators::{Actuator, PulseTiming, pulse_sequence};
use bringup_core::config::{BoardConfig, HarnessConfig};
use bringup_core::harness::SelfTestHarness;
use bringup_core::storage::{RamMedium, RamVolume};
use bringup_core::telemetry::{TelemetryIngestor, log_fix};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of the simulated flash volume
const VOLUME_CAPACITY: u64 = 1024 * 1024;

const STORE_IMAGE_FILE: &str = "bytestore.bin";
const VOLUME_IMAGE_FILE: &str = "volume.bin";

/// A short drive: a void fix while the receiver acquires, then three fixes
const BUILTIN_NMEA: &str = "\
$GPGGA,081531.00,,,,,0,00,99.9,,M,,M,,*51\r\n\
$GPRMC,081531.00,V,,,,,,,191026,,,N*7E\r\n\
$GPGSV,1,1,01,05,40,083,46*40\r\n\
$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n\
$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n\
$GNGGA,081530.50,3351.500,S,15112.600,W,2,11,1.2,38.0,M,22.1,M,,*4C\r\n\
$GNRMC,081530.50,A,3351.500,S,15112.600,W,010.0,271.5,191026,,,A*49\r\n";

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// Output pin that only logs its level
struct LoggedPin {
    gpio: u8,
}

impl ErrorType for LoggedPin {
    type Error = Infallible;
}

impl OutputPin for LoggedPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        log::debug!("GPIO{} -> low", self.gpio);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        log::debug!("GPIO{} -> high", self.gpio);
        Ok(())
    }
}

/// Blocking delay backed by `thread::sleep`
struct SleepDelay;

impl DelayNs for SleepDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Bytes arriving at the GPS baud rate over one ingest tick, at least one
fn bytes_per_tick(board: &BoardConfig) -> usize {
    // 8N1 framing: ten bit times per byte
    let per_second = board.gps_baud / 10;
    ((per_second * board.ingest_tick_ms) / 1000).max(1) as usize
}

// ---------------------------------------------------------------------------
// Persistent state
// ---------------------------------------------------------------------------

fn state_dir() -> Option<PathBuf> {
    std::env::var_os("BRINGUP_STATE_DIR").map(PathBuf::from)
}

fn load_medium(dir: Option<&Path>, capacity: usize) -> RamMedium {
    let Some(dir) = dir else {
        return RamMedium::new(capacity);
    };
    let path = dir.join(STORE_IMAGE_FILE);
    match std::fs::read(&path) {
        Ok(image) if image.len() >= capacity => {
            info!("Loaded byte-store image from {}", path.display());
            RamMedium::from_image(image)
        }
        Ok(image) => {
            warn!(
                "Ignoring {}: {} bytes, need {}",
                path.display(),
                image.len(),
                capacity
            );
            RamMedium::new(capacity)
        }
        Err(_) => RamMedium::new(capacity),
    }
}

fn load_volume(dir: Option<&Path>) -> RamVolume {
    let Some(dir) = dir else {
        return RamVolume::new(VOLUME_CAPACITY);
    };
    let path = dir.join(VOLUME_IMAGE_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        return RamVolume::new(VOLUME_CAPACITY);
    };
    match RamVolume::restore(&bytes) {
        Ok(volume) => {
            info!("Loaded volume image from {}", path.display());
            volume
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            RamVolume::new(VOLUME_CAPACITY)
        }
    }
}

fn save_state(dir: &Path, medium: &RamMedium, volume: &RamVolume) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        error!("Cannot create {}: {}", dir.display(), e);
        return;
    }

    let store_path = dir.join(STORE_IMAGE_FILE);
    if let Err(e) = std::fs::write(&store_path, medium.image()) {
        error!("Failed to save {}: {}", store_path.display(), e);
    }

    let volume_path = dir.join(VOLUME_IMAGE_FILE);
    match volume.snapshot() {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(&volume_path, bytes) {
                error!("Failed to save {}: {}", volume_path.display(), e);
            }
        }
        Err(e) => error!("Failed to snapshot volume: {}", e),
    }
    info!("State saved to {}", dir.display());
}

fn load_nmea() -> Vec<u8> {
    let Some(path) = std::env::var_os("BRINGUP_NMEA") else {
        return BUILTIN_NMEA.as_bytes().to_vec();
    };
    match std::fs::read(&path) {
        Ok(bytes) => {
            info!("Replaying {}", Path::new(&path).display());
            bytes
        }
        Err(e) => {
            warn!(
                "Cannot read {}: {}, using built-in capture",
                Path::new(&path).display(),
                e
            );
            BUILTIN_NMEA.as_bytes().to_vec()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let boot = Instant::now();
    let uptime_ms = || boot.elapsed().as_millis() as u64;

    let board = BoardConfig::default();
    let config = HarnessConfig::default();

    info!("");
    info!("========================================");
    info!("ESP32-S3 GPS, filesystem and byte-store bring-up (simulator)");
    info!("========================================");

    // --- Actuators ---------------------------------------------------------
    let mut actuators = [
        Actuator::new("Buzzer", LoggedPin { gpio: board.buzzer_pin }),
        Actuator::new("Relay", LoggedPin { gpio: board.relay_pin }),
    ];
    let timing = PulseTiming::from(&board);
    let Ok(()) = embassy_futures::block_on(pulse_sequence(&mut actuators, &mut SleepDelay, timing));

    // --- Storage self-test -------------------------------------------------
    let dir = state_dir();
    let mut medium = load_medium(dir.as_deref(), config.store_capacity);
    let mut volume = load_volume(dir.as_deref());

    let report = SelfTestHarness::new(&config).run(&mut medium, &mut volume, &uptime_ms);
    if !report.all_passed() {
        warn!("Self-test finished with {} failure(s)", report.failed());
    }

    if let Some(dir) = dir.as_deref() {
        save_state(dir, &medium, &volume);
    }

    // --- GPS ingest ----------------------------------------------------------
    info!("");
    info!("Waiting for GPS data...");

    let replay = load_nmea();
    let chunk = bytes_per_tick(&board);
    let tick = Duration::from_millis(u64::from(board.ingest_tick_ms));

    let mut ingestor = TelemetryIngestor::new();
    let mut uart: VecDeque<u8> = VecDeque::with_capacity(chunk);
    for bytes in replay.chunks(chunk) {
        uart.extend(bytes);
        let now = uptime_ms();
        if let Some(fix) = ingestor.drain(&mut uart, now) {
            log_fix(&fix, now);
        }
        std::thread::sleep(tick);
    }

    let stats = ingestor.stats();
    info!("");
    info!(
        "Replay finished: {} chars, {} fixes, {} checksums passed, {} failed, {} discarded",
        stats.chars_processed,
        stats.sentences_with_fix,
        stats.passed_checksum,
        stats.failed_checksum,
        stats.discarded
    );
    info!("Simulator exiting");
}
