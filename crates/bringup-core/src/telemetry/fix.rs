//! Positional fix record assembled from GGA and RMC sentences

use log::info;

/// Calendar date reported by RMC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

/// UTC time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub centisecond: u8,
}

/// Kilometres per hour in one knot
pub const KMPH_PER_KNOT: f32 = 1.852;

/// One completed position fix
///
/// Latitude and longitude are always present; everything else is whatever the
/// receiver reported most recently and may still be missing right after
/// start-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixRecord {
    /// Decimal degrees, negative south of the equator
    pub latitude: f64,
    /// Decimal degrees, negative west of Greenwich
    pub longitude: f64,
    /// Height above mean sea level
    pub altitude_m: Option<f32>,
    pub speed_kmph: Option<f32>,
    /// Course over ground, degrees from true north
    pub course_deg: Option<f32>,
    pub date: Option<Date>,
    pub time: Option<UtcTime>,
    pub satellites: Option<u8>,
    /// Horizontal dilution of precision
    pub hdop: Option<f32>,
    /// Ingest clock when the record was completed
    pub fixed_at_ms: u64,
}

impl FixRecord {
    /// Milliseconds since the record was completed
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.fixed_at_ms)
    }
}

/// Log every field of `fix` once
pub fn log_fix(fix: &FixRecord, now_ms: u64) {
    info!("========= GPS DATA =========");
    info!("Latitude: {:.6}", fix.latitude);
    info!("Longitude: {:.6}", fix.longitude);
    info!("Location Age (ms): {}", fix.age_ms(now_ms));

    match fix.altitude_m {
        Some(alt) => info!("Altitude: {:.2} m", alt),
        None => info!("Altitude: n/a"),
    }
    match fix.speed_kmph {
        Some(speed) => info!("Speed: {:.2} km/h", speed),
        None => info!("Speed: n/a"),
    }
    match fix.course_deg {
        Some(course) => info!("Course: {:.2} degrees", course),
        None => info!("Course: n/a"),
    }
    match fix.date {
        Some(d) => info!("Date: {}/{}/{}", d.day, d.month, d.year),
        None => info!("Date: n/a"),
    }
    match fix.time {
        Some(t) => info!("Time (UTC): {:02}:{:02}:{:02}", t.hour, t.minute, t.second),
        None => info!("Time (UTC): n/a"),
    }
    match fix.satellites {
        Some(n) => info!("Satellites: {}", n),
        None => info!("Satellites: n/a"),
    }
    match fix.hdop {
        Some(hdop) => info!("HDOP (accuracy): {:.2}", hdop),
        None => info!("HDOP (accuracy): n/a"),
    }
    info!("-----------------------------");
}
