// crates/bridge-protocol/tests/binary_frame.rs
use bridge_protocol::wire_types::fourcc;
use bridge_protocol::{decode_frame, encode_frame, CommandCode, FrameError};

#[test]
fn decodes_text_only_frame() {
    let buf = encode_frame(fourcc(b"OOPE"), "ws[chat]:hi", None).unwrap();
    let frame = decode_frame(&buf).unwrap();
    assert!(frame.is_directive());
    assert_eq!(frame.text, "ws[chat]:hi");
    assert_eq!(frame.payload, None);
}

#[test]
fn text_without_nul_runs_to_end_of_frame() {
    let mut buf = fourcc(b"LOG\0").to_le_bytes().to_vec();
    buf.extend_from_slice(b"hello");
    let frame = decode_frame(&buf).unwrap();
    assert_eq!(frame.command(), Some(CommandCode::Log));
    assert_eq!(frame.text, "hello");
}

#[test]
fn decodes_payload_with_matching_length() {
    let buf = encode_frame(CommandCode::Save.as_u32(), "world.sav", Some(&[1, 2, 3])).unwrap();
    let frame = decode_frame(&buf).unwrap();
    assert_eq!(frame.command(), Some(CommandCode::Save));
    assert_eq!(frame.text, "world.sav");
    assert_eq!(frame.payload, Some(&[1u8, 2, 3][..]));
}

#[test]
fn mismatched_length_is_rejected() {
    let mut buf = fourcc(b"SAVE").to_le_bytes().to_vec();
    buf.extend_from_slice(b"f\0");
    buf.extend_from_slice(&10u32.to_le_bytes());
    buf.extend_from_slice(&[0xAA; 3]);

    let err = decode_frame(&buf).unwrap_err();
    assert_eq!(err, FrameError::LengthMismatch { declared: 10, actual: 3 });
    assert_eq!(
        err.to_string(),
        "binary mode message improperly formatted (byte length does not match binary buffer size)."
    );
}

#[test]
fn short_frames_are_truncated() {
    assert!(matches!(decode_frame(&[1, 2, 3, 4]), Err(FrameError::Truncated { .. })));
    assert!(matches!(decode_frame(&[]), Err(FrameError::Truncated { .. })));
}

#[test]
fn trailer_too_short_for_a_length_is_ignored() {
    let mut buf = fourcc(b"LOG\0").to_le_bytes().to_vec();
    buf.extend_from_slice(b"hi\0\x01\x02");
    let frame = decode_frame(&buf).unwrap();
    assert_eq!(frame.command(), Some(CommandCode::Log));
    assert_eq!(frame.text, "hi");
    assert_eq!(frame.payload, None);

    let mut buf = fourcc(b"SAVE").to_le_bytes().to_vec();
    buf.extend_from_slice(b"f\0\x01\x02\x03");
    assert_eq!(decode_frame(&buf).unwrap().payload, None);
}

#[test]
fn unknown_codes_decode_but_have_no_command() {
    let buf = encode_frame(0xDEAD_BEEF, "x", None).unwrap();
    let frame = decode_frame(&buf).unwrap();
    assert_eq!(frame.code, 0xDEAD_BEEF);
    assert_eq!(frame.command(), None);
}
