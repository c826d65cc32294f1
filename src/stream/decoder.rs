//! Line-record decoder

use super::event::{ProtocolEvent, WireRecord};
use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::Decoder;

const RECORD_PREFIX: &str = "data: ";

/// Failure reading the response body. Malformed records are not errors.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits the byte stream into newline-delimited records and parses the
/// significant ones.
///
/// The codec buffer holds the carryover: bytes after the last newline wait
/// for the next chunk. Splitting happens on raw bytes, and `\n` never occurs
/// inside a multi-byte UTF-8 sequence, so a character cut across chunks is
/// whole again before the line is decoded.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    /// Bytes of the buffer already known to contain no newline
    scanned: usize,
}

impl Decoder for RecordDecoder {
    type Item = ProtocolEvent;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ProtocolEvent>, StreamError> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            if let Some(event) = parse_record(&line[..line.len() - 1]) {
                return Ok(Some(event));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ProtocolEvent>, StreamError> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Unterminated final line
        let line = src.split_to(src.len());
        self.scanned = 0;
        Ok(parse_record(&line))
    }
}

/// Interpret one line. Anything without the prefix, or not valid JSON, is skipped.
fn parse_record(line: &[u8]) -> Option<ProtocolEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let payload = text.strip_prefix(RECORD_PREFIX)?;

    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => record.into_event(),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed record");
            None
        }
    }
}

#[cfg(test)]
pub(super) fn decode_chunks(chunks: &[&[u8]]) -> Vec<ProtocolEvent> {
    let mut decoder = RecordDecoder::default();
    let mut buf = BytesMut::new();
    let mut events = Vec::new();

    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(event) = decoder.decode(&mut buf).unwrap() {
            events.push(event);
        }
    }
    while let Some(event) = decoder.decode_eof(&mut buf).unwrap() {
        events.push(event);
    }
    events
}
