//! Splits oversized outgoing commands into units the engine will accept.

use std::ops::Range;

use crate::wire_types::COMMAND_TERMINATOR;

/// Split `message` into byte ranges of at most `limit` bytes where possible.
///
/// The message is first cut after every `endm` terminator. A trailing piece
/// without a terminator is kept as its own piece when it is long enough to
/// hold one, otherwise it is folded into the piece before it. Adjacent pieces
/// are then merged greedily while the merged span stays under `limit`.
///
/// The returned ranges are contiguous and cover the whole message, so their
/// concatenation is the original message. A single command unit longer than
/// `limit` is returned as-is; rejecting it is the caller's decision.
pub fn chunk_ranges(message: &[u8], limit: usize) -> Vec<Range<usize>> {
    let mut pieces = split_units(message);

    if limit == 0 || pieces.len() < 2 {
        return pieces;
    }

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(pieces.len());
    for piece in pieces.drain(..) {
        match merged.last_mut() {
            Some(last) if piece.end - last.start < limit => last.end = piece.end,
            _ => merged.push(piece),
        }
    }

    merged
}

/// Same as [`chunk_ranges`] but yields the byte slices themselves.
pub fn chunk_message(message: &[u8], limit: usize) -> Vec<&[u8]> {
    chunk_ranges(message, limit)
        .into_iter()
        .map(|range| &message[range])
        .collect()
}

fn split_units(message: &[u8]) -> Vec<Range<usize>> {
    let term = COMMAND_TERMINATOR;
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + term.len() <= message.len() {
        if &message[i..i + term.len()] == term {
            i += term.len();
            pieces.push(start..i);
            start = i;
        } else {
            i += 1;
        }
    }

    if start < message.len() {
        let tail = start..message.len();
        match pieces.last_mut() {
            Some(last) if tail.len() <= term.len() => last.end = tail.end,
            _ => pieces.push(tail),
        }
    }

    pieces
}
