//! Self-test parameters and board wiring
//!
//! Defaults reproduce the bring-up sequence of the board: a 512-byte settings
//! store, the test record layout inside it, and the files used by the
//! filesystem battery.

extern crate alloc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Address range of one test record in the byte-store
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub addr: usize,
    pub len: usize,
}

impl Region {
    pub const fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    /// One past the last address, `None` if that overflows `usize`
    pub const fn end(&self) -> Option<usize> {
        self.addr.checked_add(self.len)
    }

    /// Regions whose end overflows reach to the top of the address space
    fn overlaps(&self, other: &Region) -> bool {
        let self_end = self.end().unwrap_or(usize::MAX);
        let other_end = other.end().unwrap_or(usize::MAX);
        self.addr < other_end && other.addr < self_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("Region {name} ends at {end}, past capacity {capacity}")]
    OutOfCapacity {
        name: &'static str,
        end: usize,
        capacity: usize,
    },
    #[error("Regions {first} and {second} overlap")]
    Overlap {
        first: &'static str,
        second: &'static str,
    },
    #[error("String of {len} bytes does not fit region of {room} bytes with its sentinel")]
    StringTooLong { len: usize, room: usize },
    #[error("Region {name} holds {len} bytes, its record needs {needed}")]
    RegionTooShort {
        name: &'static str,
        len: usize,
        needed: usize,
    },
}

/// Where each byte-store check keeps its record
///
/// The store itself does not know about records; this layout is the only
/// thing keeping them apart, so it is validated before the battery runs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteStoreLayout {
    pub byte: Region,
    pub integer: Region,
    pub float: Region,
    /// String bytes plus the terminating sentinel
    pub string: Region,
    pub array: Region,
    pub clear: Region,
}

impl Default for ByteStoreLayout {
    fn default() -> Self {
        Self {
            byte: Region::new(0, 1),
            integer: Region::new(10, 4),
            float: Region::new(20, 4),
            string: Region::new(30, DEFAULT_STRING_CAP + 1),
            array: Region::new(100, 5),
            clear: Region::new(200, 10),
        }
    }
}

impl ByteStoreLayout {
    fn named(&self) -> [(&'static str, Region); 6] {
        [
            ("byte", self.byte),
            ("integer", self.integer),
            ("float", self.float),
            ("string", self.string),
            ("array", self.array),
            ("clear", self.clear),
        ]
    }

    /// Check every region fits in `capacity` and no two regions overlap
    pub fn validate(&self, capacity: usize) -> Result<(), LayoutError> {
        let regions = self.named();
        for (i, (name, region)) in regions.iter().enumerate() {
            match region.end() {
                Some(end) if end <= capacity => {}
                end => {
                    return Err(LayoutError::OutOfCapacity {
                        name: *name,
                        end: end.unwrap_or(usize::MAX),
                        capacity,
                    });
                }
            }
            for (other_name, other) in &regions[i + 1..] {
                if region.overlaps(other) {
                    return Err(LayoutError::Overlap {
                        first: *name,
                        second: *other_name,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Longest string the string check reads back before giving up on the sentinel
pub const DEFAULT_STRING_CAP: usize = 50;

/// Parameters of the self-test batteries
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Byte-store capacity in bytes
    pub store_capacity: usize,
    pub layout: ByteStoreLayout,
    pub test_byte: u8,
    pub test_integer: i32,
    pub test_float: f32,
    /// Largest accepted `|written - read|` for the float check
    pub float_tolerance: f32,
    pub test_string: String,
    /// Read cap for the string check
    pub string_cap: usize,
    pub test_array: [u8; 5],
    pub clear_value: u8,

    /// Format the volume once if the first mount fails
    pub format_on_failure: bool,
    pub text_path: String,
    pub binary_path: String,
    pub renamed_path: String,
    /// Path that must not exist during the existence check
    pub absent_path: String,
    /// Literal lines at the top of the text file
    pub header_lines: Vec<String>,
    pub appended_lines: Vec<String>,
    pub binary_payload: Vec<u8>,
}

impl Default for HarnessConfig {
    #[allow(
        clippy::approx_constant,
        reason = "the float check writes a literal, not pi"
    )]
    fn default() -> Self {
        Self {
            store_capacity: 512,
            layout: ByteStoreLayout::default(),
            test_byte: 42,
            test_integer: 12345,
            test_float: 3.14159,
            float_tolerance: 1e-4,
            test_string: "ESP32-S3".into(),
            string_cap: DEFAULT_STRING_CAP,
            test_array: [10, 20, 30, 40, 50],
            clear_value: 0xFF,

            format_on_failure: true,
            text_path: "/test.txt".into(),
            binary_path: "/data.bin".into(),
            renamed_path: "/renamed.bin".into(),
            absent_path: "/nonexistent.txt".into(),
            header_lines: vec![
                "ESP32-S3 Flash Filesystem Test File".into(),
                "===================================".into(),
                "Line 1: Hello from ESP32-S3!".into(),
                "Line 2: Filesystem is working!".into(),
            ],
            appended_lines: vec!["Appended line 1".into(), "Appended line 2".into()],
            binary_payload: (0..10).collect(),
        }
    }
}

impl HarnessConfig {
    /// Check the byte-store records fit a store of `capacity` bytes
    ///
    /// Besides the layout itself, every region must hold the record its check
    /// writes, and the test string plus its sentinel must fit both its region
    /// and the read cap.
    pub fn validate(&self, capacity: usize) -> Result<(), LayoutError> {
        self.layout.validate(capacity)?;

        let layout = &self.layout;
        let records = [
            ("byte", layout.byte, core::mem::size_of::<u8>()),
            ("integer", layout.integer, core::mem::size_of::<i32>()),
            ("float", layout.float, core::mem::size_of::<f32>()),
            ("array", layout.array, self.test_array.len()),
        ];
        for (name, region, needed) in records {
            if region.len < needed {
                return Err(LayoutError::RegionTooShort {
                    name,
                    len: region.len,
                    needed,
                });
            }
        }

        let len = self.test_string.len();
        let room = self.layout.string.len.min(self.string_cap + 1);
        if len + 1 > room {
            return Err(LayoutError::StringTooLong { len, room });
        }
        Ok(())
    }
}

/// GPIO and UART wiring of the board
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    pub buzzer_pin: u8,
    pub relay_pin: u8,
    /// UART pin wired to the GPS module's TX
    pub gps_rx_pin: u8,
    /// UART pin wired to the GPS module's RX
    pub gps_tx_pin: u8,
    pub gps_baud: u32,
    /// How long each actuator is held high at start-up
    pub pulse_ms: u32,
    /// Gap after each pulse
    pub pulse_gap_ms: u32,
    /// Period of the GPS ingest tick
    pub ingest_tick_ms: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            buzzer_pin: 11,
            relay_pin: 12,
            gps_rx_pin: 18,
            gps_tx_pin: 17,
            gps_baud: 9600,
            pulse_ms: 1000,
            pulse_gap_ms: 1000,
            ingest_tick_ms: 10,
        }
    }
}
