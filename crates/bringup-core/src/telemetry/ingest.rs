//! Byte-stream ingestor that turns NMEA traffic into [`FixRecord`]s

extern crate alloc;
use alloc::collections::VecDeque;

use heapless::Vec;
use log::debug;

use super::fix::{Date, FixRecord, KMPH_PER_KNOT, UtcTime};
use super::nmea::{self, MAX_BODY_LEN, NmeaError, Position, START, Sentence};

/// Non-blocking source of received bytes, such as a UART receive buffer
pub trait ByteSource {
    /// Next buffered byte, or `None` when nothing is waiting
    fn read_byte(&mut self) -> Option<u8>;
}

impl ByteSource for VecDeque<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

impl ByteSource for &[u8] {
    fn read_byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.split_first()?;
        *self = rest;
        Some(first)
    }
}

/// Running counters of the ingestor
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub chars_processed: u32,
    /// Sentences that completed a fix record
    pub sentences_with_fix: u32,
    pub passed_checksum: u32,
    pub failed_checksum: u32,
    /// Overlong sentences and sentences with undecodable fields
    pub discarded: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Waiting for `$`
    Idle,
    Collecting,
    /// Sentence outgrew the buffer; dropped at the terminator
    Overflowed,
}

/// Latest value of every field, whichever sentence reported it
#[derive(Debug, Default, Clone, Copy)]
struct Latest {
    altitude_m: Option<f32>,
    speed_kmph: Option<f32>,
    course_deg: Option<f32>,
    date: Option<Date>,
    time: Option<UtcTime>,
    satellites: Option<u8>,
    hdop: Option<f32>,
}

/// Reassembles NMEA sentences byte by byte and merges GGA and RMC data
/// into fix records
///
/// A record is completed by every checksum-valid GGA with a non-zero fix
/// quality and every RMC with status `A`; each completion raises the fresh
/// flag, which [`take_fix`](Self::take_fix) clears.
pub struct TelemetryIngestor {
    sentence: Vec<u8, MAX_BODY_LEN>,
    framing: Framing,
    latest: Latest,
    last_fix: Option<FixRecord>,
    fresh: bool,
    clock_ms: u64,
    stats: IngestStats,
}

impl Default for TelemetryIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryIngestor {
    pub const fn new() -> Self {
        Self {
            sentence: Vec::new(),
            framing: Framing::Idle,
            latest: Latest {
                altitude_m: None,
                speed_kmph: None,
                course_deg: None,
                date: None,
                time: None,
                satellites: None,
                hdop: None,
            },
            last_fix: None,
            fresh: false,
            clock_ms: 0,
            stats: IngestStats {
                chars_processed: 0,
                sentences_with_fix: 0,
                passed_checksum: 0,
                failed_checksum: 0,
                discarded: 0,
            },
        }
    }

    /// Set the clock used to stamp records completed by [`feed`](Self::feed)
    pub fn set_clock(&mut self, now_ms: u64) {
        self.clock_ms = now_ms;
    }

    /// Consume one byte; returns true if it completed a fix record
    pub fn feed(&mut self, byte: u8) -> bool {
        self.stats.chars_processed = self.stats.chars_processed.wrapping_add(1);

        match byte {
            START => {
                self.sentence.clear();
                self.framing = Framing::Collecting;
                false
            }
            b'\r' | b'\n' => {
                let framing = core::mem::replace(&mut self.framing, Framing::Idle);
                match framing {
                    Framing::Collecting => self.finish_sentence(),
                    Framing::Overflowed => {
                        debug!("Dropped overlong NMEA sentence");
                        self.stats.discarded += 1;
                        false
                    }
                    Framing::Idle => false,
                }
            }
            _ => {
                if self.framing == Framing::Collecting && self.sentence.push(byte).is_err() {
                    self.framing = Framing::Overflowed;
                }
                false
            }
        }
    }

    pub fn has_fresh_fix(&self) -> bool {
        self.fresh
    }

    /// The latest record if it has not been taken yet
    pub fn take_fix(&mut self) -> Option<FixRecord> {
        if !self.fresh {
            return None;
        }
        self.fresh = false;
        self.last_fix
    }

    /// The latest record, fresh or not
    pub fn last_fix(&self) -> Option<&FixRecord> {
        self.last_fix.as_ref()
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// One ingest tick: feed every byte `source` has buffered, then take the
    /// fresh record if one was completed
    pub fn drain<S: ByteSource + ?Sized>(&mut self, source: &mut S, now_ms: u64) -> Option<FixRecord> {
        self.set_clock(now_ms);
        while let Some(byte) = source.read_byte() {
            self.feed(byte);
        }
        self.take_fix()
    }

    fn finish_sentence(&mut self) -> bool {
        match nmea::parse(&self.sentence) {
            Ok(sentence) => {
                self.stats.passed_checksum += 1;
                self.apply(sentence)
            }
            Err(e @ (NmeaError::MissingChecksum | NmeaError::Checksum { .. })) => {
                debug!("Rejected NMEA sentence: {}", e);
                self.stats.failed_checksum += 1;
                false
            }
            Err(e @ NmeaError::Malformed) => {
                debug!("Rejected NMEA sentence: {}", e);
                self.stats.passed_checksum += 1;
                self.stats.discarded += 1;
                false
            }
        }
    }

    fn apply(&mut self, sentence: Sentence) -> bool {
        match sentence {
            Sentence::Gga(gga) => {
                self.latest.time = gga.time.or(self.latest.time);
                self.latest.satellites = gga.satellites.or(self.latest.satellites);
                self.latest.hdop = gga.hdop.or(self.latest.hdop);
                self.latest.altitude_m = gga.altitude_m.or(self.latest.altitude_m);
                match gga.position {
                    Some(position) if gga.has_fix() => self.complete(position),
                    _ => false,
                }
            }
            Sentence::Rmc(rmc) => {
                self.latest.time = rmc.time.or(self.latest.time);
                self.latest.date = rmc.date.or(self.latest.date);
                if !rmc.active {
                    return false;
                }
                self.latest.speed_kmph = rmc
                    .speed_knots
                    .map(|knots| knots * KMPH_PER_KNOT)
                    .or(self.latest.speed_kmph);
                self.latest.course_deg = rmc.course_deg.or(self.latest.course_deg);
                match rmc.position {
                    Some(position) => self.complete(position),
                    None => false,
                }
            }
            Sentence::Other => false,
        }
    }

    fn complete(&mut self, position: Position) -> bool {
        let latest = self.latest;
        self.last_fix = Some(FixRecord {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude_m: latest.altitude_m,
            speed_kmph: latest.speed_kmph,
            course_deg: latest.course_deg,
            date: latest.date,
            time: latest.time,
            satellites: latest.satellites,
            hdop: latest.hdop,
            fixed_at_ms: self.clock_ms,
        });
        self.fresh = true;
        self.stats.sentences_with_fix += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &[u8] = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
    const RMC: &[u8] = b"$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";
    const GSV: &[u8] = b"$GPGSV,1,1,01,05,40,083,46*40\r\n";
    const VOID_GGA: &[u8] = b"$GPGGA,081531.00,,,,,0,00,99.9,,M,,M,,*51\r\n";

    fn feed_all(ingestor: &mut TelemetryIngestor, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&b| ingestor.feed(b)).count()
    }

    #[test]
    fn test_fresh_flag_is_true_exactly_once() {
        let mut ingestor = TelemetryIngestor::new();
        assert!(!ingestor.has_fresh_fix());

        assert_eq!(feed_all(&mut ingestor, GGA), 1);
        assert!(ingestor.has_fresh_fix());
        assert!(ingestor.take_fix().is_some());
        assert!(!ingestor.has_fresh_fix());
        assert_eq!(ingestor.take_fix(), None);

        // The record itself stays available
        assert!(ingestor.last_fix().is_some());
    }

    #[test]
    fn test_gga_and_rmc_are_merged() {
        let mut ingestor = TelemetryIngestor::new();
        feed_all(&mut ingestor, GGA);
        feed_all(&mut ingestor, RMC);

        let fix = ingestor.take_fix().unwrap();
        assert_eq!(fix.altitude_m, Some(545.4));
        assert_eq!(fix.satellites, Some(8));
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(fix.course_deg, Some(84.4));
        assert_eq!(fix.date.map(|d| d.month), Some(3));

        let speed = fix.speed_kmph.unwrap() - 22.4 * 1.852;
        assert!(speed > -1e-3 && speed < 1e-3);
        assert_eq!(ingestor.stats().sentences_with_fix, 2);
    }

    #[test]
    fn test_bad_checksum_is_counted_and_ignored() {
        let mut ingestor = TelemetryIngestor::new();
        let mut corrupted = GGA.to_vec();
        corrupted[20] = b'9';

        assert_eq!(feed_all(&mut ingestor, &corrupted), 0);
        assert!(!ingestor.has_fresh_fix());
        assert_eq!(ingestor.stats().failed_checksum, 1);
        assert_eq!(ingestor.stats().passed_checksum, 0);
        assert_eq!(ingestor.stats().chars_processed, GGA.len() as u32);
    }

    #[test]
    fn test_void_and_other_sentences_complete_nothing() {
        let mut ingestor = TelemetryIngestor::new();
        assert_eq!(feed_all(&mut ingestor, VOID_GGA), 0);
        assert_eq!(feed_all(&mut ingestor, GSV), 0);
        assert_eq!(ingestor.stats().passed_checksum, 2);
        assert_eq!(ingestor.last_fix(), None);
    }

    #[test]
    fn test_garbage_between_sentences_is_skipped() {
        let mut ingestor = TelemetryIngestor::new();
        let mut stream = b"\x00\xFFnoise\r\n".to_vec();
        stream.extend_from_slice(b"$GPGGA,12"); // cut off by the next '$'
        stream.extend_from_slice(GGA);

        assert_eq!(feed_all(&mut ingestor, &stream), 1);
        assert_eq!(ingestor.stats().failed_checksum, 0);
    }

    #[test]
    fn test_overlong_sentence_is_discarded() {
        let mut ingestor = TelemetryIngestor::new();
        let mut stream = b"$GPTXT,".to_vec();
        stream.extend_from_slice(&[b'A'; 100]);
        stream.extend_from_slice(b"*00\r\n");
        stream.extend_from_slice(GGA);

        assert_eq!(feed_all(&mut ingestor, &stream), 1);
        assert_eq!(ingestor.stats().discarded, 1);
    }

    #[test]
    fn test_drain_empties_source_and_stamps_record() {
        let mut ingestor = TelemetryIngestor::new();
        let mut queue: VecDeque<u8> = GGA.iter().copied().collect();

        let fix = ingestor.drain(&mut queue, 5_000).unwrap();
        assert!(queue.is_empty());
        assert_eq!(fix.fixed_at_ms, 5_000);
        assert_eq!(fix.age_ms(5_400), 400);

        // Nothing new on the next tick
        assert_eq!(ingestor.drain(&mut queue, 5_010), None);
    }

    #[test]
    fn test_drain_from_slice_split_across_ticks() {
        let mut ingestor = TelemetryIngestor::new();
        let (head, tail) = RMC.split_at(30);

        let mut first = head;
        assert_eq!(ingestor.drain(&mut first, 0), None);
        assert!(first.is_empty());

        let mut second = tail;
        let fix = ingestor.drain(&mut second, 10).unwrap();
        assert_eq!(fix.fixed_at_ms, 10);
        assert!(fix.latitude > 48.0);
    }
}
