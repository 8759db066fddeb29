//! Message codec for NDJSON framing
//!
//! Frames are newline-delimited JSON objects. The decoder buffers partial
//! reads, splits on `\n`, and keeps the trailing incomplete fragment for the
//! next chunk. A line that fails to parse is logged and skipped, never fatal:
//! malformed input is tolerated, not treated as a protocol violation.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::messages::{BridgeMessage, HostMessage};

/// Maximum line length (1 MB). A stream that never sends a newline cannot
/// grow the buffer unboundedly; overlong lines are dropped like malformed ones.
pub const MAX_LINE: usize = 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Codec for BridgeMessage (encoding) and HostMessage (decoding)
/// Used by the bridge side
#[derive(Debug, Default)]
pub struct BridgeCodec {
    discarding: bool,
}

impl BridgeCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BridgeCodec {
    type Item = HostMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_line(src, &mut self.discarding)
    }
}

impl Encoder<BridgeMessage> for BridgeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: BridgeMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&item, dst)
    }
}

/// Codec for HostMessage (encoding) and BridgeMessage (decoding)
/// Used by the host side
#[derive(Debug, Default)]
pub struct HostCodec {
    discarding: bool,
}

impl HostCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for HostCodec {
    type Item = BridgeMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_line(src, &mut self.discarding)
    }
}

impl Encoder<HostMessage> for HostCodec {
    type Error = CodecError;

    fn encode(&mut self, item: HostMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&item, dst)
    }
}

/// Decode the next parseable line, skipping malformed and overlong ones
fn decode_line<T: serde::de::DeserializeOwned>(
    src: &mut BytesMut,
    discarding: &mut bool,
) -> Result<Option<T>, CodecError> {
    loop {
        let newline = src.iter().position(|&b| b == b'\n');

        let Some(pos) = newline else {
            // No complete line yet. Cap the buffer so a missing newline
            // cannot grow it without bound.
            if src.len() > MAX_LINE {
                warn!(size = src.len(), "Dropping overlong unterminated line");
                src.clear();
                *discarding = true;
            }
            return Ok(None);
        };

        let line = src.split_to(pos + 1);

        if *discarding {
            // Tail of a line whose head was already dropped
            *discarding = false;
            continue;
        }

        if pos > MAX_LINE {
            warn!(size = pos, "Dropping overlong line");
            continue;
        }

        let trimmed = trim_line(&line[..pos]);
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_slice(trimmed) {
            Ok(msg) => return Ok(Some(msg)),
            Err(e) => {
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(trimmed),
                    "Dropping malformed protocol line"
                );
                continue;
            }
        }
    }
}

/// Encode one message followed by a newline
fn encode_line<T: serde::Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let data = serde_json::to_vec(item)?;

    if data.len() > MAX_LINE {
        return Err(CodecError::LineTooLong {
            size: data.len(),
            max: MAX_LINE,
        });
    }

    dst.reserve(data.len() + 1);
    dst.put_slice(&data);
    dst.put_u8(b'\n');
    Ok(())
}

/// Strip trailing `\r` (and stray whitespace) from a frame
fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\r' || line[end - 1] == b' ') {
        end -= 1;
    }
    let mut start = 0;
    while start < end && line[start] == b' ' {
        start += 1;
    }
    &line[start..end]
}
