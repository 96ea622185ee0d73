//! Low-level wire constants.
//!
//! This module defines:
//! - The command terminator and flush marker of the engine text protocol.
//! - Buffer sizes used by the socket transport.
//! - FourCC command codes carried in websocket binary frames.

/// Every command unit of an engine script ends with this marker.
pub const COMMAND_TERMINATOR: &[u8; 4] = b"endm";

/// Appended to each unit sent over the scripting socket; tells the engine to
/// run what it has received and reply.
pub const FLUSH_MARKER: &[u8; 6] = b"\nrscr\n";

/// Receive buffer of the socket transport. A read shorter than this ends a reply.
pub const SOCKET_RECEIVE_BUFFER: usize = 4096;

/// Largest unit the scripting socket accepts in one send.
pub const SOCKET_UNIT_LIMIT: usize = 64_000 - 10;

/// Prefix of a shared-memory request that should be executed immediately.
pub const EXECUTE_PREFIX: &[u8; 8] = b"execute\n";

/// Shared-memory requests starting with this install a script instead.
pub const SCRIPT_INSTALL_PREFIX: &[u8; 4] = b"scrp";

/// Little-endian FourCC, first character in the lowest byte.
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

const SAVE: u32 = fourcc(b"SAVE");
const LOAD: u32 = fourcc(b"LOAD");
const DLTE: u32 = fourcc(b"DLTE");
const MOVE: u32 = fourcc(b"MOVE");
const QRCD: u32 = fourcc(b"QRCD");
const LOG: u32 = fourcc(b"LOG\0");
const DBG: u32 = fourcc(b"DBG\0");
const OOPE: u32 = fourcc(b"OOPE");
const PATH: u32 = fourcc(b"PATH");

/// Commands carried in the 4-byte code of a binary frame.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Write the payload to a file.
    Save = SAVE,

    /// Read a file back as a binary reply.
    Load = LOAD,

    /// Delete a file.
    Delete = DLTE,

    /// Move / copy a file.
    Move = MOVE,

    /// Render a QR code bitmap.
    QrCode = QRCD,

    /// Write the text to the gateway log.
    Log = LOG,

    /// Write the text to the engine output log.
    Debug = DBG,

    /// Treat the text as a relay directive.
    Directive = OOPE,

    /// Resolve a game path.
    Path = PATH,
}

impl CommandCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            SAVE => Some(CommandCode::Save),
            LOAD => Some(CommandCode::Load),
            DLTE => Some(CommandCode::Delete),
            MOVE => Some(CommandCode::Move),
            QRCD => Some(CommandCode::QrCode),
            LOG => Some(CommandCode::Log),
            DBG => Some(CommandCode::Debug),
            OOPE => Some(CommandCode::Directive),
            PATH => Some(CommandCode::Path),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}
