//! Frame validator edge cases through the public API.

use mbus_decode::{check_mbus_frame, check_wmbus_frame, FrameStatus};

fn hex(s: &str) -> Vec<u8> {
    mbus_decode::util::hex::decode_telegram_hex(s).unwrap()
}

#[test]
fn test_wmbus_full_and_partial() {
    let frame = hex("2A442D2C998734761B168D2091D37CAC21576C78_02FF207100041308190000441308190000615B7F616713");
    match check_wmbus_frame(&frame) {
        FrameStatus::Full(slice) => assert_eq!(slice.frame_length, 43),
        other => panic!("expected full, got {other:?}"),
    }
    assert_eq!(check_wmbus_frame(&frame[..20]), FrameStatus::Partial);
    assert_eq!(check_wmbus_frame(&[0x00]), FrameStatus::Error);
}

#[test]
fn test_mbus_envelope() {
    let frame = hex(
        "6874746808007257575757496A000712000000_0C7857575757046D2414DE280413000000000C943C000000004413FFFFFFFF426CFFFF840113FFFFFFFF82016CFFFFC40113FFFFFFFFC2016CFFFF840213FFFFFFFF82026CFFFF043B000000000422E62F000004260000000034220000000002FD1700001F5716",
    );
    match check_mbus_frame(&frame) {
        FrameStatus::Full(slice) => {
            assert_eq!(slice.frame_length, frame.len());
            // Checksum and stop byte are excluded from the content slice.
            assert_eq!(slice.payload_len, frame.len() - 2);
            assert_eq!(slice.payload_offset, 4);
        }
        other => panic!("expected full, got {other:?}"),
    }

    // Flip one payload byte: the checksum must catch it.
    let mut bad = frame.clone();
    bad[20] ^= 0x01;
    assert_eq!(check_mbus_frame(&bad), FrameStatus::Error);

    // Mismatched length fields.
    let mut bad = frame.clone();
    bad[1] ^= 0x01;
    assert_eq!(check_mbus_frame(&bad), FrameStatus::Error);

    // Missing stop byte.
    let mut bad = frame;
    let last = bad.len() - 1;
    bad[last] = 0x00;
    assert_eq!(check_mbus_frame(&bad), FrameStatus::Error);
}

#[test]
fn test_mbus_partial() {
    let frame = hex("68747468080072575757");
    assert_eq!(check_mbus_frame(&frame), FrameStatus::Partial);
}

#[test]
fn test_checkers_do_not_mutate() {
    let frame = hex("19440186313737370408A0A1000059001C270100322DE413B415");
    let copy = frame.clone();
    let _ = check_wmbus_frame(&frame);
    let _ = check_mbus_frame(&frame);
    assert_eq!(frame, copy);
}
