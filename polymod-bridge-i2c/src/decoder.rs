//! Change record decoding.
//!
//! A `GET_CHANGES` read returns a block of variable-length tagged records:
//!
//! ```text
//! tag byte: KK IIIIII    KK = kind, IIIIII = pin/port index
//!
//! 00 analog      tag, value_hi, value_lo
//! 01 digital     tag, level
//! 10 connection  tag, C FFFFFFF (C = connected, F = from module), from_port
//! 11 end of stream
//! ```
//!
//! Records are never split by the firmware; the block ends with `0xFF` or
//! simply runs out.

use std::iter::FusedIterator;

/// End-of-stream tag byte.
pub const END_MARKER: u8 = 0xFF;

/// Length in bytes of the longest record.
pub const MAX_RECORD_LEN: usize = 3;

const TAG_MASK: u8 = 0b1100_0000;
const INDEX_MASK: u8 = 0b0011_1111;
const TAG_ANALOG: u8 = 0b0000_0000;
const TAG_DIGITAL: u8 = 0b0100_0000;
const TAG_CONNECTION: u8 = 0b1000_0000;
const CONNECTED_FLAG: u8 = 0b1000_0000;
const MODULE_MASK: u8 = 0b0111_1111;

/// A state change reported by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeRecord {
    /// New 16-bit sample on an analog pin.
    Analog { module: u8, pin: u8, value: u16 },

    /// New level on a digital pin.
    Digital { module: u8, pin: u8, level: u8 },

    /// A patch cable from `from_module:from_port` into `to_module:to_port`
    /// was plugged in (`connected`) or pulled out.
    Connection {
        to_module: u8,
        to_port: u8,
        from_module: u8,
        from_port: u8,
        connected: bool,
    },
}

impl ChangeRecord {
    /// Record kind.
    pub fn kind(&self) -> RecordKind {
        match self {
            ChangeRecord::Analog { .. } => RecordKind::Analog,
            ChangeRecord::Digital { .. } => RecordKind::Digital,
            ChangeRecord::Connection { .. } => RecordKind::Connection,
        }
    }

    /// Append the wire form of this record to `out`, as module firmware does.
    ///
    /// Indices are masked to 6 bits and `from_module` to 7 bits.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match *self {
            ChangeRecord::Analog { pin, value, .. } => {
                out.push(TAG_ANALOG | (pin & INDEX_MASK));
                out.extend_from_slice(&value.to_be_bytes());
            }
            ChangeRecord::Digital { pin, level, .. } => {
                out.push(TAG_DIGITAL | (pin & INDEX_MASK));
                out.push(level);
            }
            ChangeRecord::Connection {
                to_port,
                from_module,
                from_port,
                connected,
                ..
            } => {
                let flag = if connected { CONNECTED_FLAG } else { 0 };
                out.push(TAG_CONNECTION | (to_port & INDEX_MASK));
                out.push(flag | (from_module & MODULE_MASK));
                out.push(from_port);
            }
        }
    }
}

/// Kind of a change record, from the top two bits of its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Analog,
    Digital,
    Connection,
}

impl RecordKind {
    /// Total record length in bytes, tag included.
    pub fn encoded_len(self) -> usize {
        match self {
            RecordKind::Analog => 3,
            RecordKind::Digital => 2,
            RecordKind::Connection => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Analog => "analog",
            RecordKind::Digital => "digital",
            RecordKind::Connection => "connection",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Malformed record stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error(
        "truncated record stream: {kind} record at offset {offset} needs {needed} bytes, {available} left"
    )]
    TruncatedRecord {
        offset: usize,
        kind: RecordKind,
        needed: usize,
        available: usize,
    },
}

/// Why decoding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// An end-of-stream tag was read.
    Marker,
    /// The buffer ran out on a record boundary.
    Exhausted,
    /// The buffer ran out inside a record.
    Truncated,
}

/// Lazy decoder over one change buffer.
///
/// Yields records in on-wire order. A truncated trailing record yields one
/// `Err` after every complete record before it, then the decoder stops.
#[derive(Debug, Clone)]
pub struct RecordDecoder<'a> {
    module: u8,
    buf: &'a [u8],
    offset: usize,
    end: Option<StreamEnd>,
}

impl<'a> RecordDecoder<'a> {
    /// Decode `buf`, as read from `module`.
    pub fn new(module: u8, buf: &'a [u8]) -> Self {
        Self {
            module,
            buf,
            offset: 0,
            end: None,
        }
    }

    /// Bytes consumed so far, end marker included.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// How the stream ended, once it has.
    pub fn end(&self) -> Option<StreamEnd> {
        self.end
    }

    fn decode_body(&self, kind: RecordKind, index: u8, body: &[u8]) -> ChangeRecord {
        match kind {
            RecordKind::Analog => ChangeRecord::Analog {
                module: self.module,
                pin: index,
                value: u16::from_be_bytes([body[0], body[1]]),
            },
            RecordKind::Digital => ChangeRecord::Digital {
                module: self.module,
                pin: index,
                level: body[0],
            },
            RecordKind::Connection => ChangeRecord::Connection {
                to_module: self.module,
                to_port: index,
                from_module: body[0] & MODULE_MASK,
                from_port: body[1],
                connected: body[0] & CONNECTED_FLAG != 0,
            },
        }
    }
}

impl Iterator for RecordDecoder<'_> {
    type Item = Result<ChangeRecord, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }

        let Some(&tag) = self.buf.get(self.offset) else {
            self.end = Some(StreamEnd::Exhausted);
            return None;
        };

        let kind = match tag & TAG_MASK {
            TAG_ANALOG => RecordKind::Analog,
            TAG_DIGITAL => RecordKind::Digital,
            TAG_CONNECTION => RecordKind::Connection,
            // Any 0b11 tag ends the stream, not only 0xFF.
            _ => {
                self.offset += 1;
                self.end = Some(StreamEnd::Marker);
                return None;
            }
        };

        let needed = kind.encoded_len();
        let Some(body) = self.buf.get(self.offset + 1..self.offset + needed) else {
            self.end = Some(StreamEnd::Truncated);
            return Some(Err(ProtocolError::TruncatedRecord {
                offset: self.offset,
                kind,
                needed,
                available: self.buf.len() - self.offset,
            }));
        };

        let record = self.decode_body(kind, tag & INDEX_MASK, body);
        self.offset += needed;
        Some(Ok(record))
    }
}

impl FusedIterator for RecordDecoder<'_> {}

/// Decode a whole buffer, keeping the records read before any error.
pub fn decode_changes(module: u8, buf: &[u8]) -> (Vec<ChangeRecord>, Option<ProtocolError>) {
    let mut records = Vec::new();
    for item in RecordDecoder::new(module, buf) {
        match item {
            Ok(record) => records.push(record),
            Err(e) => return (records, Some(e)),
        }
    }
    (records, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(records: &[ChangeRecord]) -> Vec<u8> {
        let mut buf = Vec::new();
        for record in records {
            record.encode_into(&mut buf);
        }
        buf
    }

    #[test]
    fn test_analog_record() {
        let (records, err) = decode_changes(4, &[0x00, 0x02, 0x00, 0xFF]);
        assert_eq!(err, None);
        assert_eq!(
            records,
            vec![ChangeRecord::Analog {
                module: 4,
                pin: 0,
                value: 512
            }]
        );
    }

    #[test]
    fn test_digital_record() {
        let (records, _) = decode_changes(7, &[0x45, 0x01, 0xFF]);
        assert_eq!(
            records,
            vec![ChangeRecord::Digital {
                module: 7,
                pin: 5,
                level: 1
            }]
        );
    }

    #[test]
    fn test_connection_record_flags() {
        let (records, _) = decode_changes(2, &[0x81, 0x83, 0x00, 0x81, 0x03, 0x00]);
        assert_eq!(
            records,
            vec![
                ChangeRecord::Connection {
                    to_module: 2,
                    to_port: 1,
                    from_module: 3,
                    from_port: 0,
                    connected: true,
                },
                ChangeRecord::Connection {
                    to_module: 2,
                    to_port: 1,
                    from_module: 3,
                    from_port: 0,
                    connected: false,
                },
            ]
        );
    }

    #[test]
    fn test_mixed_records_consume_exact_bytes() {
        let records = vec![
            ChangeRecord::Digital {
                module: 4,
                pin: 63,
                level: 0,
            },
            ChangeRecord::Analog {
                module: 4,
                pin: 2,
                value: 0xBEEF,
            },
            ChangeRecord::Connection {
                to_module: 4,
                to_port: 3,
                from_module: 127,
                from_port: 9,
                connected: true,
            },
        ];
        let mut buf = encode_all(&records);
        buf.push(END_MARKER);
        // Garbage after the marker must not be read.
        buf.extend_from_slice(&[0x00, 0x12]);

        let mut decoder = RecordDecoder::new(4, &buf);
        let decoded: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(decoded, records);
        assert_eq!(decoder.consumed(), 2 + 3 + 3 + 1);
        assert_eq!(decoder.end(), Some(StreamEnd::Marker));
    }

    #[test]
    fn test_empty_buffer() {
        let mut decoder = RecordDecoder::new(4, &[]);
        assert!(decoder.next().is_none());
        assert_eq!(decoder.end(), Some(StreamEnd::Exhausted));
    }

    #[test]
    fn test_immediate_end_marker() {
        let (records, err) = decode_changes(4, &[0xFF; 12]);
        assert!(records.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn test_exhausted_without_marker() {
        let buf = [0x40, 0x01, 0x41, 0x00, 0x42, 0x01];
        let mut decoder = RecordDecoder::new(4, &buf);
        assert_eq!(decoder.by_ref().count(), 3);
        assert_eq!(decoder.end(), Some(StreamEnd::Exhausted));
        assert_eq!(decoder.consumed(), buf.len());
    }

    #[test]
    fn test_truncated_record_keeps_prefix() {
        // Digital record, then an analog record missing its low byte.
        let buf = [0x41, 0x01, 0x03, 0x02];
        let mut decoder = RecordDecoder::new(4, &buf);

        assert_eq!(
            decoder.next(),
            Some(Ok(ChangeRecord::Digital {
                module: 4,
                pin: 1,
                level: 1
            }))
        );
        assert_eq!(
            decoder.next(),
            Some(Err(ProtocolError::TruncatedRecord {
                offset: 2,
                kind: RecordKind::Analog,
                needed: 3,
                available: 2,
            }))
        );
        assert_eq!(decoder.next(), None);
        assert_eq!(decoder.next(), None);
        assert_eq!(decoder.end(), Some(StreamEnd::Truncated));
    }

    #[test]
    fn test_truncated_tag_only() {
        let (records, err) = decode_changes(4, &[0x80]);
        assert!(records.is_empty());
        assert!(matches!(
            err,
            Some(ProtocolError::TruncatedRecord { available: 1, .. })
        ));
    }

    #[test]
    fn test_non_ff_end_tag_stops() {
        let (records, err) = decode_changes(4, &[0x40, 0x01, 0xC3, 0x40, 0x00]);
        assert_eq!(records.len(), 1);
        assert!(err.is_none());
    }

    #[test]
    fn test_encode_masks_indices() {
        let mut buf = Vec::new();
        ChangeRecord::Digital {
            module: 1,
            pin: 0xFF,
            level: 1,
        }
        .encode_into(&mut buf);
        assert_eq!(buf, vec![0x7F, 0x01]);
    }
}
