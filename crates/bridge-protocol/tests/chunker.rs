// crates/bridge-protocol/tests/chunker.rs
use bridge_protocol::{chunk_message, chunk_ranges};

fn script(units: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..units {
        out.extend_from_slice(format!("outv {i} endm").as_bytes());
    }
    out
}

#[test]
fn small_message_is_a_single_chunk() {
    let msg = b"outs \"hi\" endm";
    assert_eq!(chunk_ranges(msg, 1024), vec![0..msg.len()]);
}

#[test]
fn empty_message_has_no_chunks() {
    assert!(chunk_ranges(b"", 64).is_empty());
}

#[test]
fn chunks_reconstruct_the_message_and_respect_the_limit() {
    let msg = script(40);
    for limit in [12usize, 20, 33, 64, 100, 1000] {
        let chunks = chunk_message(&msg, limit);
        assert_eq!(chunks.concat(), msg, "limit {limit}");
        for chunk in &chunks {
            let units = chunk.windows(4).filter(|w| *w == b"endm").count();
            assert!(chunk.len() < limit || units == 1, "limit {limit}");
            assert!(chunk.ends_with(b"endm"));
        }
    }
}

#[test]
fn boundaries_never_split_a_terminator() {
    let msg = script(25);
    for range in chunk_ranges(&msg, 30) {
        assert_eq!(&msg[range.end - 4..range.end], b"endm");
    }
}

#[test]
fn oversized_unit_is_kept_whole() {
    let mut msg = b"outs \"".to_vec();
    msg.extend(std::iter::repeat(b'x').take(200));
    msg.extend_from_slice(b"\" endm outv 1 endm");

    let chunks = chunk_message(&msg, 64);
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].len() > 64);
    assert_eq!(chunks[1], b" outv 1 endm");
}

#[test]
fn trailing_text_without_terminator_is_kept() {
    let msg = b"outv 1 endmouts \"tail\"";
    let chunks = chunk_message(msg, 12);
    assert_eq!(chunks, vec![&b"outv 1 endm"[..], &b"outs \"tail\""[..]]);
}

#[test]
fn short_trailing_remainder_joins_the_previous_chunk() {
    let msg = b"outv 1 endm\n";
    assert_eq!(chunk_ranges(msg, 4), vec![0..msg.len()]);
}

#[test]
fn rechunking_is_idempotent() {
    let msg = script(30);
    let first = chunk_message(&msg, 50);
    let joined = first.concat();
    let second = chunk_ranges(&joined, 50);
    assert_eq!(chunk_ranges(&msg, 50), second);
}
