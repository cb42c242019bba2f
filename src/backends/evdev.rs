//! Linux `struct input_event` stream decoding.
//!
//! A device node yields fixed-size records in native byte order:
//!
//! ```text
//! struct input_event {
//!     long           tv_sec;
//!     long           tv_usec;
//!     unsigned short type;
//!     unsigned short code;
//!     int            value;
//! };
//! ```
//!
//! so a record is 24 bytes on 64-bit hosts and 16 bytes on 32-bit ones.
//! Decoding is a field projection; names come from the code table afterwards.
//! `SYN_REPORT` records are forwarded like any other: consumers use them as
//! frame boundaries.

use super::{Decoder, Normalizer};
use crate::error::{InputError, Result};
use crate::event::{InputEvent, RawEvent, Timeval};
use std::ffi::c_long;
use std::io::{ErrorKind, Read};
use std::mem::size_of;

const LONG: usize = size_of::<c_long>();

/// Size in bytes of one `input_event` record on this host.
pub const RECORD_SIZE: usize = 2 * LONG + 8;

fn read_long(bytes: &[u8]) -> i64 {
    if LONG == 8 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        i64::from_ne_bytes(b)
    } else {
        let mut b = [0u8; 4];
        b.copy_from_slice(&bytes[..4]);
        i64::from(i32::from_ne_bytes(b))
    }
}

/// Project one record. `bytes` must be exactly [`RECORD_SIZE`] long.
pub fn decode_record(bytes: &[u8]) -> Result<RawEvent> {
    if bytes.len() != RECORD_SIZE {
        return Err(InputError::DecodeMalformed(format!(
            "input_event record is {} bytes, expected {RECORD_SIZE}",
            bytes.len()
        )));
    }
    let sec = read_long(&bytes[..LONG]);
    let usec = read_long(&bytes[LONG..2 * LONG]);
    let rest = &bytes[2 * LONG..];
    Ok(RawEvent {
        time: Timeval::new(sec, usec),
        ev_type: u16::from_ne_bytes([rest[0], rest[1]]),
        code: u16::from_ne_bytes([rest[2], rest[3]]),
        value: i32::from_ne_bytes([rest[4], rest[5], rest[6], rest[7]]),
    })
}

/// Inverse of [`decode_record`]. Used by tools that replay or synthesize streams.
pub fn encode_record(raw: &RawEvent) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_SIZE);
    if LONG == 8 {
        out.extend_from_slice(&raw.time.sec.to_ne_bytes());
        out.extend_from_slice(&raw.time.usec.to_ne_bytes());
    } else {
        out.extend_from_slice(&(raw.time.sec as i32).to_ne_bytes());
        out.extend_from_slice(&(raw.time.usec as i32).to_ne_bytes());
    }
    out.extend_from_slice(&raw.ev_type.to_ne_bytes());
    out.extend_from_slice(&raw.code.to_ne_bytes());
    out.extend_from_slice(&raw.value.to_ne_bytes());
    out
}

/// Decoder over any byte stream carrying `input_event` records.
///
/// The reader is expected to wait a bounded time for data: `TimedOut`,
/// `WouldBlock` and `Interrupted` are treated as "nothing yet", `Ok(0)` as end
/// of stream, any other error as the device going away. Partial records are
/// carried over to the next read.
pub struct EvdevDecoder<R> {
    reader: R,
    label: String,
    buf: Vec<u8>,
    filled: usize,
}

impl<R: Read + Send> EvdevDecoder<R> {
    /// `batch` is the number of records requested per read.
    pub fn new(label: impl Into<String>, reader: R, batch: usize) -> Self {
        Self {
            reader,
            label: label.into(),
            buf: vec![0u8; RECORD_SIZE * batch.max(1)],
            filled: 0,
        }
    }
}

impl<R: Read + Send> Decoder for EvdevDecoder<R> {
    fn decode_next(&mut self, normalizer: &mut Normalizer) -> Result<Vec<InputEvent>> {
        let n = match self.reader.read(&mut self.buf[self.filled..]) {
            Ok(0) => {
                return Err(InputError::DeviceGone(format!("{}: end of stream", self.label)));
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(InputError::DeviceGone(format!("{}: {e}", self.label))),
        };
        self.filled += n;

        let whole = self.filled / RECORD_SIZE * RECORD_SIZE;
        let raws = self.buf[..whole]
            .chunks_exact(RECORD_SIZE)
            .filter_map(|chunk| decode_record(chunk).ok())
            .collect::<Vec<_>>();
        self.buf.copy_within(whole..self.filled, 0);
        self.filled -= whole;

        Ok(normalizer.normalize_all(raws))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeTable;
    use crate::device::DeviceId;
    use crate::event::EventType;
    use std::io::Cursor;
    use std::sync::Arc;

    fn normalizer() -> Normalizer {
        Normalizer::new(DeviceId(7), Arc::new(CodeTable::evdev()))
    }

    fn stream(raws: &[RawEvent]) -> Vec<u8> {
        raws.iter().flat_map(encode_record).collect()
    }

    #[test]
    fn record_size_matches_host_long() {
        assert_eq!(RECORD_SIZE, 2 * size_of::<c_long>() + 8);
        assert!(RECORD_SIZE == 16 || RECORD_SIZE == 24);
    }

    #[test]
    fn decodes_field_by_field() {
        let raw = RawEvent {
            time: Timeval::new(1_700_000_000, 123_456),
            ev_type: 0x03,
            code: 0x01,
            value: -32768,
        };
        let bytes = encode_record(&raw);
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(decode_record(&bytes).unwrap(), raw);
        assert!(decode_record(&bytes[1..]).is_err());
    }

    #[test]
    fn decode_then_lookup_matches_table() {
        let codes = CodeTable::evdev();
        for (ty, name) in [
            (EventType::Key, "KEY_SPACE"),
            (EventType::Key, "BTN_SOUTH"),
            (EventType::Relative, "REL_WHEEL"),
            (EventType::Absolute, "ABS_HAT0Y"),
            (EventType::Misc, "MSC_SCAN"),
            (EventType::Switch, "SW_LID"),
        ] {
            let code = codes.reverse_lookup(ty, name).unwrap();
            let bytes = encode_record(&RawEvent::new(Timeval::new(1, 0), ty, code, 1));
            let raw = decode_record(&bytes).unwrap();
            let ev = InputEvent::new(&codes, DeviceId(0), raw).unwrap();
            assert_eq!((ev.ev_type, ev.code), (ty, name));
        }
    }

    #[test]
    fn sync_terminated_run_is_forwarded_in_order() {
        let t = Timeval::new(100, 0);
        let bytes = stream(&[
            RawEvent::new(t, EventType::Absolute, 0x00, 120),
            RawEvent::new(t, EventType::Absolute, 0x01, -40),
            RawEvent::new(t, EventType::Key, 0x130, 1),
            RawEvent::sync(t),
        ]);
        let mut decoder = EvdevDecoder::new("pad", Cursor::new(bytes), 64);
        let mut norm = normalizer();
        let events = decoder.decode_next(&mut norm).unwrap();
        let codes: Vec<_> = events.iter().map(|e| e.code).collect();
        assert_eq!(codes, ["ABS_X", "ABS_Y", "BTN_SOUTH", "SYN_REPORT"]);
        assert!(events.last().unwrap().is_sync());
        assert!(events.iter().all(|e| e.device == DeviceId(7)));

        let err = decoder.decode_next(&mut norm).unwrap_err();
        assert!(err.is_gone());
    }

    /// Hands out its data a few bytes at a time.
    struct Trickle(Cursor<Vec<u8>>, usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.1);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn partial_records_are_carried_over() {
        let t = Timeval::new(3, 0);
        let bytes = stream(&[RawEvent::new(t, EventType::Key, 30, 1), RawEvent::sync(t)]);
        let mut decoder = EvdevDecoder::new("kbd", Trickle(Cursor::new(bytes), 5), 4);
        let mut norm = normalizer();
        let mut events = Vec::new();
        loop {
            match decoder.decode_next(&mut norm) {
                Ok(batch) => events.extend(batch),
                Err(e) => {
                    assert!(e.is_gone());
                    break;
                }
            }
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, "KEY_A");
    }

    #[test]
    fn unknown_codes_are_dropped_and_decoding_continues() {
        let t = Timeval::new(1, 0);
        let bytes = stream(&[
            RawEvent { time: t, ev_type: 0x0a, code: 0, value: 0 },
            RawEvent::new(t, EventType::Relative, 0x00, 3),
            RawEvent::sync(t),
        ]);
        let mut decoder = EvdevDecoder::new("mouse", Cursor::new(bytes), 8);
        let mut norm = normalizer();
        let events = decoder.decode_next(&mut norm).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, "REL_X");
        assert_eq!(norm.skipped(), 1);
    }

    struct Idle;

    impl Read for Idle {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn timeouts_yield_empty_batches() {
        let mut decoder = EvdevDecoder::new("idle", Idle, 1);
        assert!(decoder.decode_next(&mut normalizer()).unwrap().is_empty());
    }
}
