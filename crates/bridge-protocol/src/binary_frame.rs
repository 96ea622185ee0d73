//! Envelope for binary websocket frames.
//!
//! Layout: `[u32 LE code][text][NUL][u32 LE length][payload]`. The text runs
//! to the first NUL or to the end of the frame. The length and payload are
//! optional, but when present the length must match the payload exactly.
//! Fewer than four bytes after the NUL cannot hold a length and are ignored.

use std::fmt;

use crate::wire_types::CommandCode;

/// Smallest frame accepted: the code plus one byte of text or terminator.
pub const MIN_FRAME_LEN: usize = 5;

const CODE_LEN: usize = 4;
const LENGTH_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub code: u32,
    pub text: &'a str,
    pub payload: Option<&'a [u8]>,
}

impl<'a> BinaryFrame<'a> {
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::from_u32(self.code)
    }

    pub fn is_directive(&self) -> bool {
        self.command() == Some(CommandCode::Directive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Truncated { len: usize },
    LengthMismatch { declared: u32, actual: usize },
    InvalidText,
    PayloadTooLarge { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Truncated { .. } => {
                write!(f, "binary mode message improperly formatted.")
            }
            FrameError::LengthMismatch { .. } => write!(
                f,
                "binary mode message improperly formatted (byte length does not match binary buffer size)."
            ),
            FrameError::InvalidText => {
                write!(f, "binary mode message improperly formatted (text is not UTF-8).")
            }
            FrameError::PayloadTooLarge { len } => {
                write!(f, "binary payload of {len} bytes does not fit the length field")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Decode a binary frame without copying.
pub fn decode_frame(buf: &[u8]) -> Result<BinaryFrame<'_>, FrameError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(FrameError::Truncated { len: buf.len() });
    }

    let (code_bytes, body) = buf.split_at(CODE_LEN);
    let code = u32::from_le_bytes([code_bytes[0], code_bytes[1], code_bytes[2], code_bytes[3]]);

    let text_end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let text = std::str::from_utf8(&body[..text_end]).map_err(|_| FrameError::InvalidText)?;

    let after_nul = body.get(text_end + 1..).unwrap_or(&[]);

    let payload = match after_nul.len() {
        n if n < LENGTH_LEN => None,
        _ => {
            let (len_bytes, payload) = after_nul.split_at(LENGTH_LEN);
            let declared =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
            if usize::try_from(declared).ok() != Some(payload.len()) {
                return Err(FrameError::LengthMismatch {
                    declared,
                    actual: payload.len(),
                });
            }
            Some(payload)
        }
    };

    Ok(BinaryFrame {
        code,
        text,
        payload,
    })
}

/// Encode a frame. The text must not contain NUL; it is cut at the first one.
pub fn encode_frame(code: u32, text: &str, payload: Option<&[u8]>) -> Result<Vec<u8>, FrameError> {
    let text = text.split('\0').next().unwrap_or_default();
    let payload_len = payload.map_or(0, <[u8]>::len);

    let mut out = Vec::with_capacity(CODE_LEN + text.len() + 1 + LENGTH_LEN + payload_len);
    out.extend_from_slice(&code.to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.push(0);

    if let Some(payload) = payload {
        let declared = u32::try_from(payload.len())
            .map_err(|_| FrameError::PayloadTooLarge { len: payload.len() })?;
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(payload);
    }

    Ok(out)
}
