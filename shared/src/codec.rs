//! Line-oriented codec for the controller serial links
//!
//! Engine to controller, one command per line:
//! ```text
//! {"token":"HELLO","type":"DYNAMIC","duration":1.2,"keyframes":[...]}\n
//! ```
//! Controller to engine, one status line at a time. A line reading exactly `ACK`
//! completes the most recent command; everything else is diagnostic output.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::MotionScript;

/// Maximum encoded command size (64 KB)
pub const MAX_COMMAND_SIZE: usize = 64 * 1024;

/// Longest controller line kept before the buffer is discarded
pub const MAX_LINE_LEN: usize = 4096;

/// Completion token sent by the firmware
pub const ACK_LINE: &str = "ACK";

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Command too large: {0} bytes (max: {MAX_COMMAND_SIZE})")]
    CommandTooLarge(usize),

    #[error("Line too long: {0} bytes without terminator (max: {MAX_LINE_LEN})")]
    LineTooLong(usize),

    #[error("JSON encode error: {0}")]
    EncodeError(#[from] serde_json::Error),
}

/// Encode a script as a newline-terminated JSON command
pub fn encode(script: &MotionScript) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(script, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a script directly into a provided buffer
pub fn encode_into(script: &MotionScript, buf: &mut BytesMut) -> Result<(), CodecError> {
    let json = serde_json::to_vec(script)?;

    if json.len() + 1 > MAX_COMMAND_SIZE {
        return Err(CodecError::CommandTooLarge(json.len() + 1));
    }

    buf.reserve(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');

    Ok(())
}

/// A complete line received from a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerLine {
    /// The controller finished its most recent command
    Ack,
    /// Anything else the firmware prints
    Diagnostic(String),
}

impl ControllerLine {
    /// Classify a line with its terminator already removed
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == ACK_LINE {
            ControllerLine::Ack
        } else {
            ControllerLine::Diagnostic(line.to_string())
        }
    }
}

/// Splits a controller byte stream into lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Partial line data being accumulated
    buffer: BytesMut,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next non-blank line from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete lines.
    /// An overlong partial line is dropped and reported once.
    pub fn decode_next(&mut self) -> Result<Option<ControllerLine>, CodecError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    let len = self.buffer.len();
                    self.buffer.clear();
                    return Err(CodecError::LineTooLong(len));
                }
                return Ok(None);
            };

            let line = self.buffer.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line[..pos]);
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(ControllerLine::parse(&text)));
        }
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Keyframe, MotionType};

    fn create_test_script() -> MotionScript {
        MotionScript {
            token: "HELLO".into(),
            motion_type: MotionType::Dynamic,
            duration: 1.0,
            keyframes: vec![
                Keyframe::new(0.0).with_group("L", vec![90, 90, 90, 90, 90]),
                Keyframe::new(0.5).with_group("LW", vec![0, 180]),
            ],
        }
    }

    #[test]
    fn test_encode_is_single_json_line() {
        let encoded = encode(&create_test_script()).expect("encode failed");

        assert_eq!(encoded.last(), Some(&b'\n'));
        assert_eq!(encoded.iter().filter(|b| **b == b'\n').count(), 1);

        let value: serde_json::Value =
            serde_json::from_slice(&encoded[..encoded.len() - 1]).expect("not json");
        assert_eq!(value["token"], "HELLO");
        assert_eq!(value["type"], "DYNAMIC");
        assert_eq!(value["keyframes"][1]["LW"], serde_json::json!([0, 180]));
    }

    #[test]
    fn test_command_too_large() {
        let mut script = create_test_script();
        script.keyframes = (0..4000)
            .map(|i| Keyframe::new(i as f64 * 0.001).with_group("L", vec![90; 5]))
            .collect();

        assert!(matches!(encode(&script), Err(CodecError::CommandTooLarge(_))));
    }

    #[test]
    fn test_ack_and_diagnostics() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"[LEFT_ARM] Command queued\r\nACK\r\n\nACKNOWLEDGED\n");

        assert_eq!(
            decoder.decode_next().unwrap(),
            Some(ControllerLine::Diagnostic("[LEFT_ARM] Command queued".into()))
        );
        assert_eq!(decoder.decode_next().unwrap(), Some(ControllerLine::Ack));
        assert_eq!(
            decoder.decode_next().unwrap(),
            Some(ControllerLine::Diagnostic("ACKNOWLEDGED".into()))
        );
        assert_eq!(decoder.decode_next().unwrap(), None);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_partial_line() {
        let mut decoder = LineDecoder::new();

        decoder.extend(b"AC");
        assert!(decoder.decode_next().expect("decode error").is_none());
        assert_eq!(decoder.buffer_len(), 2);

        decoder.extend(b"K\n");
        assert_eq!(decoder.decode_next().unwrap(), Some(ControllerLine::Ack));
    }

    #[test]
    fn test_line_too_long() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&vec![b'x'; MAX_LINE_LEN + 1]);

        assert!(matches!(decoder.decode_next(), Err(CodecError::LineTooLong(_))));
        assert_eq!(decoder.buffer_len(), 0);

        decoder.extend(b"ACK\n");
        assert_eq!(decoder.decode_next().unwrap(), Some(ControllerLine::Ack));
    }
}
