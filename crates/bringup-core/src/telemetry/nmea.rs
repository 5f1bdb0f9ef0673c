//! NMEA 0183 sentence decoding
//!
//! Only the two sentences that carry a position fix are decoded: `GGA` (fix
//! quality, satellites, HDOP, altitude) and `RMC` (validity, speed, course,
//! date). Any talker prefix is accepted. Every other sentence type decodes to
//! [`Sentence::Other`] once its checksum has been verified.

extern crate alloc;
use alloc::vec::Vec;
use core::str::FromStr;

use thiserror_no_std::Error;

use super::fix::{Date, UtcTime};

// =============================================================================
// Framing
// =============================================================================

/// Longest sentence on the wire, `$` and `\r\n` included
pub const MAX_SENTENCE_LEN: usize = 82;

/// Longest sentence body between `$` and the line terminator
pub const MAX_BODY_LEN: usize = MAX_SENTENCE_LEN - 3;

/// Sentence start marker
pub const START: u8 = b'$';

/// Separator between the sentence data and its checksum
pub const CHECKSUM_DELIM: u8 = b'*';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NmeaError {
    /// No `*HH` suffix, or the suffix is not two hex digits
    #[error("Missing checksum")]
    MissingChecksum,

    #[error("Checksum mismatch (sentence {expected:#04x}, computed {computed:#04x})")]
    Checksum { expected: u8, computed: u8 },

    /// Checksum passed but a field could not be decoded
    #[error("Malformed sentence")]
    Malformed,
}

/// XOR of every byte, the NMEA checksum
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

// =============================================================================
// Sentences
// =============================================================================

/// Latitude and longitude in signed decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Global positioning system fix data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gga {
    pub time: Option<UtcTime>,
    pub position: Option<Position>,
    /// 0 = no fix, 1 = GPS, 2 = DGPS, ...
    pub quality: u8,
    pub satellites: Option<u8>,
    pub hdop: Option<f32>,
    pub altitude_m: Option<f32>,
}

impl Gga {
    pub fn has_fix(&self) -> bool {
        self.quality > 0 && self.position.is_some()
    }
}

/// Recommended minimum navigation data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rmc {
    pub time: Option<UtcTime>,
    /// Status `A`; `V` means the receiver flags the data as void
    pub active: bool,
    pub position: Option<Position>,
    pub speed_knots: Option<f32>,
    pub course_deg: Option<f32>,
    pub date: Option<Date>,
}

impl Rmc {
    pub fn has_fix(&self) -> bool {
        self.active && self.position.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sentence {
    Gga(Gga),
    Rmc(Rmc),
    /// Valid sentence of a type that carries no fix data
    Other,
}

/// Decode one sentence body, the bytes between `$` and the line terminator
pub fn parse(body: &[u8]) -> Result<Sentence, NmeaError> {
    let star = body
        .iter()
        .rposition(|&b| b == CHECKSUM_DELIM)
        .ok_or(NmeaError::MissingChecksum)?;
    let (data, suffix) = (&body[..star], &body[star + 1..]);

    let expected = match suffix {
        [hi, lo] => match (hex_digit(*hi), hex_digit(*lo)) {
            (Some(hi), Some(lo)) => (hi << 4) | lo,
            _ => return Err(NmeaError::MissingChecksum),
        },
        _ => return Err(NmeaError::MissingChecksum),
    };
    let computed = checksum(data);
    if expected != computed {
        return Err(NmeaError::Checksum { expected, computed });
    }

    let text = core::str::from_utf8(data).map_err(|_| NmeaError::Malformed)?;
    let fields = Fields(text.split(',').collect());

    let address = fields.get(0);
    if address.len() < 5 || !address.is_ascii() {
        return Err(NmeaError::Malformed);
    }
    match &address[address.len() - 3..] {
        "GGA" => parse_gga(&fields).map(Sentence::Gga),
        "RMC" => parse_rmc(&fields).map(Sentence::Rmc),
        _ => Ok(Sentence::Other),
    }
}

/// Comma-separated fields; index 0 is the address
struct Fields<'a>(Vec<&'a str>);

impl<'a> Fields<'a> {
    /// Field `i`, empty when the sentence is shorter
    fn get(&self, i: usize) -> &'a str {
        self.0.get(i).copied().unwrap_or("")
    }
}

fn parse_gga(f: &Fields<'_>) -> Result<Gga, NmeaError> {
    Ok(Gga {
        time: parse_time(f.get(1))?,
        position: parse_position(f, 2)?,
        quality: optional(f.get(6))?.unwrap_or(0),
        satellites: optional(f.get(7))?,
        hdop: optional_float(f.get(8))?,
        altitude_m: optional_float(f.get(9))?,
    })
}

fn parse_rmc(f: &Fields<'_>) -> Result<Rmc, NmeaError> {
    let active = match f.get(2) {
        "A" => true,
        "V" | "" => false,
        _ => return Err(NmeaError::Malformed),
    };
    Ok(Rmc {
        time: parse_time(f.get(1))?,
        active,
        position: parse_position(f, 3)?,
        speed_knots: optional_float(f.get(7))?,
        course_deg: optional_float(f.get(8))?,
        date: parse_date(f.get(9))?,
    })
}

// =============================================================================
// Fields
// =============================================================================

/// Empty field is `None`, anything unparsable is an error
fn optional<T: FromStr>(field: &str) -> Result<Option<T>, NmeaError> {
    if field.is_empty() {
        return Ok(None);
    }
    field.parse().map(Some).map_err(|_| NmeaError::Malformed)
}

/// As [`optional`], but `NaN` and infinities are malformed
fn optional_float(field: &str) -> Result<Option<f32>, NmeaError> {
    match optional::<f32>(field)? {
        Some(value) if !value.is_finite() => Err(NmeaError::Malformed),
        value => Ok(value),
    }
}

/// Exactly two ASCII digits
fn two_digits(s: &str) -> Result<u8, NmeaError> {
    match s.as_bytes() {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => Ok((a - b'0') * 10 + (b - b'0')),
        _ => Err(NmeaError::Malformed),
    }
}

/// `hhmmss` with optional fractional seconds
fn parse_time(field: &str) -> Result<Option<UtcTime>, NmeaError> {
    if field.is_empty() {
        return Ok(None);
    }
    if field.len() < 6 || !field.is_ascii() {
        return Err(NmeaError::Malformed);
    }

    let hour = two_digits(&field[0..2])?;
    let minute = two_digits(&field[2..4])?;
    let second = two_digits(&field[4..6])?;
    if hour > 23 || minute > 59 || second > 60 {
        return Err(NmeaError::Malformed);
    }

    let centisecond = match &field[6..] {
        "" => 0,
        frac => {
            let digits = frac.strip_prefix('.').ok_or(NmeaError::Malformed)?;
            let mut cs = 0u8;
            for (i, scale) in [10u8, 1].into_iter().enumerate() {
                match digits.as_bytes().get(i) {
                    Some(d) if d.is_ascii_digit() => cs += (d - b'0') * scale,
                    Some(_) => return Err(NmeaError::Malformed),
                    None => break,
                }
            }
            cs
        }
    };

    Ok(Some(UtcTime {
        hour,
        minute,
        second,
        centisecond,
    }))
}

/// `ddmmyy`, years taken as 20yy
fn parse_date(field: &str) -> Result<Option<Date>, NmeaError> {
    if field.is_empty() {
        return Ok(None);
    }
    if field.len() != 6 || !field.is_ascii() {
        return Err(NmeaError::Malformed);
    }

    let day = two_digits(&field[0..2])?;
    let month = two_digits(&field[2..4])?;
    let year = 2000 + u16::from(two_digits(&field[4..6])?);
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return Err(NmeaError::Malformed);
    }
    Ok(Some(Date { day, month, year }))
}

/// `[d]ddmm.mmmm` plus hemisphere to signed decimal degrees
fn parse_coordinate(
    value: &str,
    hemisphere: &str,
    positive: &str,
    negative: &str,
    max_degrees: f64,
) -> Result<Option<f64>, NmeaError> {
    if value.is_empty() || hemisphere.is_empty() {
        return Ok(None);
    }

    let raw: f64 = value.parse().map_err(|_| NmeaError::Malformed)?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(NmeaError::Malformed);
    }
    let whole_degrees = (raw / 100.0) as u32 as f64;
    let minutes = raw - whole_degrees * 100.0;
    if minutes >= 60.0 {
        return Err(NmeaError::Malformed);
    }
    let degrees = whole_degrees + minutes / 60.0;
    if degrees > max_degrees {
        return Err(NmeaError::Malformed);
    }

    if hemisphere == positive {
        Ok(Some(degrees))
    } else if hemisphere == negative {
        Ok(Some(-degrees))
    } else {
        Err(NmeaError::Malformed)
    }
}

/// Latitude / hemisphere / longitude / hemisphere starting at field `first`
fn parse_position(f: &Fields<'_>, first: usize) -> Result<Option<Position>, NmeaError> {
    let latitude = parse_coordinate(f.get(first), f.get(first + 1), "N", "S", 90.0)?;
    let longitude = parse_coordinate(f.get(first + 2), f.get(first + 3), "E", "W", 180.0)?;
    Ok(match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Position {
            latitude,
            longitude,
        }),
        _ => None,
    })
}
