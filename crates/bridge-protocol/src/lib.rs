//! bridge-protocol
//!
//! Byte-level protocol pieces shared by every engine transport and by the
//! websocket side of the gateway.
//!
//! - [`text_codec`]   : legacy 8-bit encoding ⇄ UTF-8, whitespace normalization
//! - [`chunker`]      : splitting outgoing scripts on command terminators
//! - [`directive`]    : `ws://host:port[protocol]:message` lines from engine scripts
//! - [`binary_frame`] : local command envelope carried in websocket binary frames

pub mod wire_types;
pub mod text_codec;
pub mod chunker;
pub mod directive;
pub mod binary_frame;

pub use binary_frame::{decode_frame, encode_frame, BinaryFrame, FrameError};
pub use chunker::{chunk_message, chunk_ranges};
pub use directive::{parse_directive, Directive};
pub use wire_types::CommandCode;
