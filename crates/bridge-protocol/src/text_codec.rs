//! Legacy 8-bit text codec.
//!
//! The engines speak Windows-1252. Everything coming from websocket peers is
//! UTF-8, so text is converted at the session boundary in both directions.
//! Carriage returns are dropped in both directions.
//!
//! Bytes 0x81, 0x8D, 0x8F, 0x90 and 0x9D have no mapping and decode to `?`;
//! code points outside the code page (and malformed UTF-8) encode to `?`.

/// Code points for 0x80..=0x9F. `0` marks an unmapped byte.
const HIGH_TABLE: [u16; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, // 0x80
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, // 0x88
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, // 0x90
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178, // 0x98
];

const REPLACEMENT: u8 = b'?';

/// True iff every byte is below 0x80 and none is a carriage return, in which
/// case the bytes are already valid UTF-8 and need no conversion.
pub fn is_ascii(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b < 0x80 && b != b'\r')
}

/// Map one legacy byte to its Unicode scalar.
pub fn decode_byte(b: u8) -> Option<char> {
    match b {
        0x00..=0x7F | 0xA0..=0xFF => Some(char::from(b)),
        _ => match HIGH_TABLE[usize::from(b - 0x80)] {
            0 => None,
            cp => char::from_u32(u32::from(cp)),
        },
    }
}

/// Map one Unicode scalar back to its legacy byte.
pub fn encode_char(c: char) -> Option<u8> {
    let cp = u32::from(c);
    match cp {
        0x00..=0x7F | 0xA0..=0xFF => u8::try_from(cp).ok(),
        _ => HIGH_TABLE
            .iter()
            .position(|&mapped| mapped != 0 && u32::from(mapped) == cp)
            .and_then(|idx| u8::try_from(0x80 + idx).ok()),
    }
}

/// Legacy bytes → UTF-8 string.
pub fn to_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);

    for &b in bytes {
        if b == b'\r' {
            continue;
        }
        out.push(decode_byte(b).unwrap_or(char::from(REPLACEMENT)));
    }

    out
}

/// UTF-8 bytes → legacy bytes.
///
/// Each malformed UTF-8 sequence becomes a single `?`.
pub fn from_utf8(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());

    for chunk in input.utf8_chunks() {
        for c in chunk.valid().chars() {
            if c == '\r' {
                continue;
            }
            out.push(encode_char(c).unwrap_or(REPLACEMENT));
        }

        if !chunk.invalid().is_empty() {
            out.push(REPLACEMENT);
        }
    }

    out
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0B | 0x0C)
}

/// Normalize whitespace of a legacy-encoded script.
///
/// CRLF becomes LF and stray carriage returns are dropped outside strings.
///
/// With `legacy_strings` set, strings are `[...]` with no escapes (a `]`
/// always closes), and every whitespace run outside a string collapses to its
/// first byte, so `a \n b` becomes `a b`. The first-generation engine crashes
/// on consecutive whitespace.
///
/// Without it, strings are `"..."` with backslash escapes and whitespace is
/// kept verbatim.
///
/// A string left open at the end of input is closed.
pub fn normalize_whitespace(input: &[u8], legacy_strings: bool) -> Vec<u8> {
    let (open, close) = if legacy_strings { (b'[', b']') } else { (b'"', b'"') };

    let mut out = Vec::with_capacity(input.len() + 1);
    let mut in_string = false;
    let mut escaped = false;
    let mut pending: Option<u8> = None;

    let mut i = 0;
    while i < input.len() {
        let mut c = input[i];
        i += 1;

        if c == b'\r' {
            if input.get(i) == Some(&b'\n') {
                c = b'\n';
                i += 1;
            } else if !in_string {
                continue;
            }
        }

        if in_string {
            out.push(c);
            if legacy_strings {
                in_string = c != close;
            } else if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else {
                in_string = c != close;
            }
            continue;
        }

        if legacy_strings && is_space(c) {
            pending = pending.or(Some(c));
            continue;
        }

        if let Some(ws) = pending.take() {
            out.push(ws);
        }

        if c == open {
            in_string = true;
        }
        out.push(c);
    }

    if let Some(ws) = pending {
        out.push(ws);
    }

    if in_string {
        out.push(close);
    }

    out
}
