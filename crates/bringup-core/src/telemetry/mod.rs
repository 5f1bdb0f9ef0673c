//! GPS telemetry
//!
//! Raw receiver bytes go into a [`TelemetryIngestor`], one call to
//! [`TelemetryIngestor::drain`] per ingest tick. Completed [`FixRecord`]s come
//! out, each reported fresh exactly once.

mod fix;
mod ingest;
pub mod nmea;

pub use fix::{Date, FixRecord, KMPH_PER_KNOT, UtcTime, log_fix};
pub use ingest::{ByteSource, IngestStats, TelemetryIngestor};
