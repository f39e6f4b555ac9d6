//! `Content-Length` framing for LSP messages.
//!
//! Wire format: `Content-Length: <n>\r\n\r\n<json>` where `<n>` is the body
//! length in bytes. Extra header lines (such as `Content-Type`) are tolerated
//! and header names are matched case-insensitively.
//!
//! Decoding is non-destructive: [`Framer::decode`] reports how many bytes a
//! frame occupied and leaves buffer management to the caller (usually a
//! [`FrameBuffer`]). A malformed frame is reported as [`Decoded::Skipped`]
//! together with the number of bytes to discard, so the same bytes are never
//! parsed twice.

use serde_json::Value;
use thiserror::Error;

/// Separator between the header block and the body.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest body accepted by default (64 MiB).
pub const DEFAULT_MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Reasons a frame was skipped.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The header block had no `Content-Length` line.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// `Content-Length` was present but not a non-negative integer.
    #[error("invalid Content-Length header: {0}")]
    InvalidContentLength(String),

    /// The header block was not valid ASCII/UTF-8.
    #[error("frame header is not valid UTF-8")]
    InvalidHeaderEncoding,

    /// The declared body exceeds the configured maximum.
    #[error("frame body of {len} bytes exceeds the {max} byte limit")]
    BodyTooLarge {
        /// Declared length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The body was not valid JSON.
    #[error("frame body is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum Decoded {
    /// Not enough bytes for a complete frame. Nothing was consumed.
    Incomplete,
    /// A complete frame.
    Message {
        /// The parsed body.
        value: Value,
        /// Bytes occupied by header and body.
        consumed: usize,
    },
    /// A malformed frame that the caller should discard.
    Skipped {
        /// Bytes to discard before trying again.
        consumed: usize,
        /// Why the frame was rejected.
        error: FrameError,
    },
}

/// Stateless encoder/decoder for the LSP wire format.
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    max_body_len: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_LEN)
    }
}

impl Framer {
    /// Create a framer that rejects bodies larger than `max_body_len`.
    #[must_use]
    pub const fn new(max_body_len: usize) -> Self {
        Self { max_body_len }
    }

    /// Serialize a message as compact JSON with its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn encode(&self, message: &Value) -> Result<Vec<u8>, serde_json::Error> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        let mut frame = Vec::with_capacity(header.len() + body.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Try to decode one frame from the front of `buf`.
    #[must_use]
    pub fn decode(&self, buf: &[u8]) -> Decoded {
        let Some(header_end) = find_header_end(buf) else {
            return Decoded::Incomplete;
        };
        let body_start = header_end + HEADER_TERMINATOR.len();

        let len = match parse_content_length(&buf[..header_end]) {
            Ok(len) => len,
            Err(error) => {
                return Decoded::Skipped {
                    consumed: body_start,
                    error,
                };
            }
        };
        if len > self.max_body_len {
            return Decoded::Skipped {
                consumed: body_start,
                error: FrameError::BodyTooLarge {
                    len,
                    max: self.max_body_len,
                },
            };
        }

        let body_end = body_start + len;
        if buf.len() < body_end {
            return Decoded::Incomplete;
        }

        match serde_json::from_slice(&buf[body_start..body_end]) {
            Ok(value) => Decoded::Message {
                value,
                consumed: body_end,
            },
            Err(e) => Decoded::Skipped {
                consumed: body_end,
                error: FrameError::MalformedJson(e),
            },
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_content_length(header: &[u8]) -> Result<usize, FrameError> {
    let header = std::str::from_utf8(header).map_err(|_| FrameError::InvalidHeaderEncoding)?;

    for line in header.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            return value
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(value.to_string()));
        }
    }

    Err(FrameError::MissingContentLength)
}

/// Accumulates raw bytes from a stream and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    framer: Framer,
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer that decodes with `framer`.
    #[must_use]
    pub fn new(framer: Framer) -> Self {
        Self {
            framer,
            buf: Vec::new(),
        }
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next frame, or `None` if more bytes are needed.
    ///
    /// Malformed frames are returned as `Some(Err(_))` and already discarded,
    /// so calling again continues with the following frame.
    pub fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        match self.framer.decode(&self.buf) {
            Decoded::Incomplete => None,
            Decoded::Message { value, consumed } => {
                self.buf.drain(..consumed);
                Some(Ok(value))
            }
            Decoded::Skipped { consumed, error } => {
                self.buf.drain(..consumed);
                Some(Err(error))
            }
        }
    }

    /// Number of buffered bytes not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no pending bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    #[test]
    fn encode_writes_header_and_compact_body() {
        let value = json!({"jsonrpc": "2.0", "id": 1});
        let bytes = Framer::default().encode(&value).expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");

        let body = serde_json::to_string(&value).expect("serialize");
        assert!(!body.contains(' '));
        assert_eq!(text, format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let bytes = Framer::default().encode(&json!("héllo")).expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");
        // "héllo" with quotes is 8 bytes: é is two bytes in UTF-8.
        assert!(text.starts_with("Content-Length: 8\r\n"));
    }

    #[test]
    fn decode_without_terminator_is_incomplete() {
        let decoded = Framer::default().decode(b"Content-Length: 10\r\n");
        assert!(matches!(decoded, Decoded::Incomplete));
    }

    #[test]
    fn decode_with_partial_body_is_incomplete() {
        let full = frame(r#"{"a":1}"#);
        let decoded = Framer::default().decode(&full[..full.len() - 2]);
        assert!(matches!(decoded, Decoded::Incomplete));
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut bytes = frame(r#"{"a":1}"#);
        let expected = bytes.len();
        bytes.extend_from_slice(b"Content-Le");

        match Framer::default().decode(&bytes) {
            Decoded::Message { value, consumed } => {
                assert_eq!(value, json!({"a": 1}));
                assert_eq!(consumed, expected);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[rstest]
    #[case::lowercase("content-length: 2\r\n\r\n{}")]
    #[case::extra_header("Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 2\r\n\r\n{}")]
    #[case::padded("Content-Length:    2  \r\n\r\n{}")]
    fn decode_accepts_header_variants(#[case] raw: &str) {
        let decoded = Framer::default().decode(raw.as_bytes());
        assert!(matches!(decoded, Decoded::Message { .. }), "{decoded:?}");
    }

    #[rstest]
    #[case::missing("Content-Type: x\r\n\r\n{}", "missing")]
    #[case::negative("Content-Length: -4\r\n\r\n{}", "invalid")]
    #[case::text("Content-Length: many\r\n\r\n{}", "invalid")]
    fn decode_skips_bad_headers(#[case] raw: &str, #[case] kind: &str) {
        let header_len = raw.find("\r\n\r\n").expect("terminator") + 4;
        match Framer::default().decode(raw.as_bytes()) {
            Decoded::Skipped { consumed, error } => {
                assert_eq!(consumed, header_len);
                let matches_kind = match kind {
                    "missing" => matches!(error, FrameError::MissingContentLength),
                    _ => matches!(error, FrameError::InvalidContentLength(_)),
                };
                assert!(matches_kind, "unexpected error {error:?}");
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn decode_skips_whole_frame_on_malformed_json() {
        let bytes = frame("{oops");
        match Framer::default().decode(&bytes) {
            Decoded::Skipped { consumed, error } => {
                assert_eq!(consumed, bytes.len());
                assert!(matches!(error, FrameError::MalformedJson(_)));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_oversized_body() {
        let framer = Framer::new(4);
        match framer.decode(b"Content-Length: 5\r\n\r\n") {
            Decoded::Skipped { error, .. } => {
                assert!(matches!(error, FrameError::BodyTooLarge { len: 5, max: 4 }));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn buffer_recovers_after_malformed_frame() {
        let mut buffer = FrameBuffer::default();
        buffer.extend(&frame("{oops"));
        buffer.extend(&frame(r#"{"ok":true}"#));

        assert!(matches!(buffer.next_frame(), Some(Err(_))));
        let value = buffer.next_frame().expect("frame").expect("valid");
        assert_eq!(value, json!({"ok": true}));
        assert!(buffer.next_frame().is_none());
        assert!(buffer.is_empty());
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 éü\\-_/]{0,16}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in json_value()) {
            let framer = Framer::default();
            let bytes = framer.encode(&value).expect("encode");
            match framer.decode(&bytes) {
                Decoded::Message { value: decoded, consumed } => {
                    prop_assert_eq!(decoded, value);
                    prop_assert_eq!(consumed, bytes.len());
                }
                other => prop_assert!(false, "expected message, got {:?}", other),
            }
        }

        #[test]
        fn chunk_boundaries_do_not_change_output(
            values in prop::collection::vec(json_value(), 1..5),
            cuts in prop::collection::vec(1usize..64, 0..16),
        ) {
            let framer = Framer::default();
            let mut stream = Vec::new();
            for value in &values {
                stream.extend(framer.encode(value).expect("encode"));
            }

            let mut buffer = FrameBuffer::new(framer);
            let mut decoded = Vec::new();
            let mut rest = stream.as_slice();
            for cut in cuts {
                let (chunk, tail) = rest.split_at(cut.min(rest.len()));
                buffer.extend(chunk);
                rest = tail;
                while let Some(frame) = buffer.next_frame() {
                    decoded.push(frame.expect("valid frame"));
                }
            }
            buffer.extend(rest);
            while let Some(frame) = buffer.next_frame() {
                decoded.push(frame.expect("valid frame"));
            }

            prop_assert_eq!(decoded, values);
            prop_assert!(buffer.is_empty());
        }
    }
}
