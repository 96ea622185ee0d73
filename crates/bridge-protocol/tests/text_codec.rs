// crates/bridge-protocol/tests/text_codec.rs
use bridge_protocol::text_codec::{decode_byte, from_utf8, is_ascii, normalize_whitespace, to_utf8};

#[test]
fn every_mapped_byte_survives_a_round_trip() {
    for b in 0u8..=255 {
        if b == b'\r' || decode_byte(b).is_none() {
            continue;
        }
        let utf8 = to_utf8(&[b]);
        assert_eq!(from_utf8(utf8.as_bytes()), vec![b], "byte {b:#04x}");
    }
}

#[test]
fn unmapped_bytes_decode_to_question_mark() {
    for b in [0x81u8, 0x8D, 0x8F, 0x90, 0x9D] {
        assert_eq!(to_utf8(&[b]), "?");
    }
}

#[test]
fn code_page_specials_map_both_ways() {
    assert_eq!(to_utf8(&[0x80]), "€");
    assert_eq!(to_utf8(&[0x93, b'x', 0x94]), "\u{201C}x\u{201D}");
    assert_eq!(from_utf8("€".as_bytes()), vec![0x80]);
    assert_eq!(from_utf8("é".as_bytes()), vec![0xE9]);
    assert_eq!(from_utf8("ÿ".as_bytes()), vec![0xFF]);
}

#[test]
fn unrepresentable_and_malformed_input_become_question_marks() {
    assert_eq!(from_utf8("日本".as_bytes()), b"??".to_vec());
    assert_eq!(from_utf8(&[b'a', 0xFF, b'b']), b"a?b".to_vec());
}

#[test]
fn carriage_returns_are_dropped() {
    assert_eq!(to_utf8(b"a\r\nb"), "a\nb");
    assert_eq!(from_utf8(b"a\r\nb"), b"a\nb".to_vec());
}

#[test]
fn ascii_detection_excludes_high_bytes_and_cr() {
    assert!(is_ascii(b"outs \"hi\"\n"));
    assert!(!is_ascii(&[b'a', 0xE9]));
    assert!(!is_ascii(b"a\r\n"));
    assert!(is_ascii(b""));
}

#[test]
fn crlf_becomes_lf_in_standard_mode() {
    assert_eq!(normalize_whitespace(b"a\r\nb", false), b"a\nb".to_vec());
}

#[test]
fn standard_mode_keeps_spacing_and_escaped_quotes() {
    let input = b"outs  \"a \\\" [b]  c\"  endm";
    assert_eq!(normalize_whitespace(input, false), input.to_vec());
}

#[test]
fn legacy_mode_keeps_bracket_interiors() {
    assert_eq!(normalize_whitespace(b"[a  b]", true), b"[a  b]".to_vec());
}

#[test]
fn legacy_mode_collapses_whitespace_outside_brackets() {
    assert_eq!(
        normalize_whitespace(b"outs [a  b]  endm", true),
        b"outs [a  b] endm".to_vec()
    );
    assert_eq!(
        normalize_whitespace(b"outs 1 \t\r\n  endm", true),
        b"outs 1 endm".to_vec()
    );
}

#[test]
fn legacy_mode_keeps_the_first_byte_of_each_run() {
    assert_eq!(normalize_whitespace(b"a \n b", true), b"a b".to_vec());
    assert_eq!(normalize_whitespace(b"a\n  b", true), b"a\nb".to_vec());
    assert_eq!(normalize_whitespace(b"a\r\n\tb", true), b"a\nb".to_vec());
    assert_eq!(normalize_whitespace(b"a\t \tb", true), b"a\tb".to_vec());
}

#[test]
fn unterminated_strings_are_closed() {
    assert_eq!(normalize_whitespace(b"outs [abc", true), b"outs [abc]".to_vec());
    assert_eq!(normalize_whitespace(b"outs \"abc", false), b"outs \"abc\"".to_vec());
}
