//! Binary wire format for the hit stream
//!
//! Each inbound frame is a packed run of 5-byte records:
//!
//! | offset | field    | encoding        |
//! |--------|----------|-----------------|
//! | 0      | category | u8              |
//! | 1..3   | raw-lat  | u16 big-endian  |
//! | 3..5   | raw-long | u16 big-endian  |
//!
//! A trailing partial record is discarded. Decoding is lazy: [`Records`]
//! yields one `Result` per complete record so a single bad record never
//! poisons the rest of the frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Size of one record in bytes
pub const RECORD_LEN: usize = 5;

/// Fixed-point scale of the raw coordinates (12 bits)
pub const COORD_SCALE: f32 = 4096.0;

/// Largest in-range raw coordinate
pub const COORD_MAX: u16 = 4095;

/// Index into the category registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u8);

impl CategoryId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One decoded hit. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub category: CategoryId,
    /// Normalized horizontal position, nominally [0, 1]
    pub x: f32,
    /// Normalized vertical position, nominally [0, 1]
    pub y: f32,
    /// When the event entered the display (app-relative seconds)
    pub arrival: f64,
}

impl Event {
    /// Age of the event at `now`, in seconds
    #[inline]
    pub fn age(&self, now: f64) -> f64 {
        now - self.arrival
    }

    /// Same event, admitted `delay` seconds later
    pub(crate) fn delayed(self, delay: f64) -> Self {
        Self {
            arrival: self.arrival + delay,
            ..self
        }
    }
}

/// What to do with raw coordinates outside [0, 4095]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatePolicy {
    /// Keep the value; the marker lands off the surface
    #[default]
    PassThrough,
    /// Pin to the nearest in-range value
    Clamp,
    /// Fail the record with [`DecodeError::CoordinateOutOfRange`]
    Reject,
}

/// Per-record decode failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record {record}: category {id} is not in the registry")]
    UnknownCategory { id: u8, record: usize },

    #[error("record {record}: coordinates out of range (lat {raw_lat}, long {raw_long})")]
    CoordinateOutOfRange {
        raw_lat: u16,
        raw_long: u16,
        record: usize,
    },
}

/// Stateless decoder for inbound frames
#[derive(Debug, Clone, Copy)]
pub struct WireDecoder {
    /// Number of categories in the registry; ids at or above are rejected
    categories: usize,
    coordinates: CoordinatePolicy,
}

impl WireDecoder {
    pub fn new(categories: usize, coordinates: CoordinatePolicy) -> Self {
        Self {
            categories,
            coordinates,
        }
    }

    /// Decode a frame. Every event shares `now` as its arrival time.
    pub fn decode<'a>(&self, frame: &'a [u8], now: f64) -> Records<'a> {
        Records {
            chunks: frame.chunks_exact(RECORD_LEN),
            decoder: *self,
            now,
            record: 0,
        }
    }

    fn decode_record(&self, bytes: &[u8], now: f64, record: usize) -> Result<Event, DecodeError> {
        let id = bytes[0];
        if id as usize >= self.categories {
            return Err(DecodeError::UnknownCategory { id, record });
        }

        let mut raw_lat = u16::from_be_bytes([bytes[1], bytes[2]]);
        let mut raw_long = u16::from_be_bytes([bytes[3], bytes[4]]);

        if raw_lat > COORD_MAX || raw_long > COORD_MAX {
            match self.coordinates {
                CoordinatePolicy::PassThrough => {}
                CoordinatePolicy::Clamp => {
                    raw_lat = raw_lat.min(COORD_MAX);
                    raw_long = raw_long.min(COORD_MAX);
                }
                CoordinatePolicy::Reject => {
                    return Err(DecodeError::CoordinateOutOfRange {
                        raw_lat,
                        raw_long,
                        record,
                    });
                }
            }
        }

        let event = Event {
            category: CategoryId(id),
            x: raw_long as f32 / COORD_SCALE,
            y: (COORD_SCALE - raw_lat as f32) / COORD_SCALE,
            arrival: now,
        };
        trace!(category = id, raw_lat, raw_long, "Record decoded");
        Ok(event)
    }
}

/// Lazy iterator over the records of one frame
pub struct Records<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
    decoder: WireDecoder,
    now: f64,
    record: usize,
}

impl Records<'_> {
    /// Number of bytes past the last complete record (discarded)
    pub fn trailing_bytes(&self) -> usize {
        self.chunks.remainder().len()
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Event, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.chunks.next()?;
        let record = self.record;
        self.record += 1;
        Some(self.decoder.decode_record(bytes, self.now, record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Records<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> WireDecoder {
        WireDecoder::new(45, CoordinatePolicy::PassThrough)
    }

    #[test]
    fn test_decode_single_record() {
        let frame = [7, 0x08, 0x00, 0x04, 0x00];
        let events: Vec<_> = decoder().decode(&frame, 1.5).collect();

        assert_eq!(events.len(), 1);
        let event = events[0].clone().unwrap();
        assert_eq!(event.category, CategoryId(7));
        assert_eq!(event.x, 0.25);
        assert_eq!(event.y, 0.5);
        assert_eq!(event.arrival, 1.5);
    }

    #[test]
    fn test_partial_tail_discarded() {
        let frame = [7, 0x08, 0x00, 0x04, 0x00, 3, 0x01];
        let records = decoder().decode(&frame, 0.0);
        assert_eq!(records.trailing_bytes(), 2);

        let events: Vec<_> = records.collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, CategoryId(7));
    }

    #[test]
    fn test_short_frame_yields_nothing() {
        let records = decoder().decode(&[1, 2, 3], 0.0);
        assert_eq!(records.len(), 0);
        assert_eq!(records.trailing_bytes(), 3);
        assert_eq!(decoder().decode(&[], 0.0).count(), 0);
    }

    #[test]
    fn test_records_share_arrival_and_keep_byte_order() {
        let frame = [
            1, 0x00, 0x00, 0x00, 0x00, //
            2, 0x10, 0x00, 0x08, 0x00, //
            3, 0x0F, 0xFF, 0x0F, 0xFF,
        ];
        let events: Vec<Event> = decoder().decode(&frame, 42.0).map(Result::unwrap).collect();

        let ids: Vec<u8> = events.iter().map(|e| e.category.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(events.iter().all(|e| e.arrival == 42.0));

        // raw-lat 0 maps to the bottom edge, raw-long 0 to the left edge
        assert_eq!((events[0].x, events[0].y), (0.0, 1.0));
        assert_eq!((events[2].x, events[2].y), (4095.0 / 4096.0, 1.0 / 4096.0));
    }

    #[test]
    fn test_unknown_category_fails_only_that_record() {
        let decoder = WireDecoder::new(3, CoordinatePolicy::PassThrough);
        let frame = [
            0, 0, 0, 0, 0, //
            9, 0, 0, 0, 0, //
            2, 0, 0, 0, 0,
        ];
        let results: Vec<_> = decoder.decode(&frame, 0.0).collect();

        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(DecodeError::UnknownCategory { id: 9, record: 1 })
        );
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_out_of_range_pass_through() {
        // raw-long 8192 -> x = 2.0, raw-lat 8192 -> y = -1.0
        let frame = [0, 0x20, 0x00, 0x20, 0x00];
        let event = decoder().decode(&frame, 0.0).next().unwrap().unwrap();
        assert_eq!(event.x, 2.0);
        assert_eq!(event.y, -1.0);
    }

    #[test]
    fn test_out_of_range_clamp() {
        let decoder = WireDecoder::new(1, CoordinatePolicy::Clamp);
        let frame = [0, 0xFF, 0xFF, 0x20, 0x00];
        let event = decoder.decode(&frame, 0.0).next().unwrap().unwrap();
        assert_eq!(event.x, 4095.0 / 4096.0);
        assert_eq!(event.y, 1.0 / 4096.0);
    }

    #[test]
    fn test_out_of_range_reject() {
        let decoder = WireDecoder::new(1, CoordinatePolicy::Reject);
        let frame = [0, 0x10, 0x00, 0x00, 0x01, 0, 0x0F, 0xFF, 0x0F, 0xFF];
        let results: Vec<_> = decoder.decode(&frame, 0.0).collect();

        assert_eq!(
            results[0],
            Err(DecodeError::CoordinateOutOfRange {
                raw_lat: 4096,
                raw_long: 1,
                record: 0,
            })
        );
        // Boundary value 4095 is in range
        assert!(results[1].is_ok());
    }
}
