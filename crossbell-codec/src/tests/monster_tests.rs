use super::*;

/// Two slots (16 and 8 bytes) after a 6-byte stats block, then a trailer.
fn make_monster(name: &str, note: &str) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&6u16.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    // header 4 + table 8 + stats 6 = 18
    data.extend_from_slice(&18u16.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(&34u16.to_le_bytes());
    data.extend_from_slice(&8u16.to_le_bytes());
    data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
    let mut slot = |s: &str, width: usize| {
        let mut field = s.as_bytes().to_vec();
        field.resize(width, 0);
        data.extend_from_slice(&field);
    };
    slot(name, 16);
    slot(note, 8);
    data.extend_from_slice(b"TRAILER");
    data
}

fn parse(bytes: Vec<u8>) -> MonsterFile {
    MonsterFile::parse(&mut ByteCursor::new(bytes, TextEncoding::Utf8)).unwrap()
}

#[test]
fn test_parse_slots() {
    let monster = parse(make_monster("Slime", "Weak"));
    assert_eq!(monster.strings(), &["Slime".to_string(), "Weak".to_string()]);
    assert_eq!(monster.slots()[1], Slot { offset: 34, width: 8 });
}

#[test]
fn test_fitting_strings_keep_length() {
    let monster_bytes = make_monster("Slime", "Weak");
    let mut monster = parse(monster_bytes.clone());
    monster.set_strings(&["Jelly", "Soft"]).unwrap();
    let out = monster.write().unwrap();

    assert_eq!(out.len(), monster_bytes.len());
    assert_eq!(out, make_monster("Jelly", "Soft"));
}

#[test]
fn test_shorter_string_clears_old_tail() {
    let mut monster = parse(make_monster("Slime King", "Weak"));
    monster.set_strings(&["Ooze", "Weak"]).unwrap();
    assert_eq!(monster.write().unwrap(), make_monster("Ooze", "Weak"));
}

#[test]
fn test_unchanged_write_is_identity() {
    let bytes = make_monster("Slime", "Weak");
    assert_eq!(parse(bytes.clone()).write().unwrap(), bytes);
}

#[test]
fn test_oversized_string_rebuilds_slots() {
    let mut monster = parse(make_monster("Slime", "Weak"));
    let note = "Weak to fire and ice";
    monster.set_strings(&["Slime", note]).unwrap();
    let out = monster.write().unwrap();

    let reparsed = parse(out.clone());
    assert_eq!(reparsed.strings()[1], note);
    assert_eq!(reparsed.slots()[0], Slot { offset: 18, width: 16 });
    assert_eq!(reparsed.slots()[1], Slot { offset: 34, width: note.len() as u16 + 1 });
    // Stats and trailer survive
    assert_eq!(&out[12..18], &[1, 2, 3, 4, 5, 6]);
    assert!(out.ends_with(b"TRAILER"));
    assert_eq!(out.len(), 34 + note.len() + 1 + b"TRAILER".len());
}

#[test]
fn test_growth_of_first_slot_shifts_later_slots() {
    let mut monster = parse(make_monster("Slime", "Weak"));
    let name = "Gigantic Slime Emperor";
    monster.set_strings(&[name, "Weak"]).unwrap();
    let reparsed = parse(monster.write().unwrap());
    assert_eq!(reparsed.strings(), &[name.to_string(), "Weak".to_string()]);
    assert_eq!(reparsed.slots()[1].offset as usize, 18 + name.len() + 1);
    assert_eq!(reparsed.slots()[1].width, 8);
}

#[test]
fn test_string_count_mismatch() {
    let mut monster = parse(make_monster("Slime", "Weak"));
    let err = monster.set_strings(&["Only one"]).unwrap_err();
    assert!(matches!(err, RepackError::Format(_)));
}

#[test]
fn test_overlapping_slots_are_rejected() {
    let mut bytes = make_monster("Slime", "Weak");
    // Second slot starts inside the first
    bytes[8..10].copy_from_slice(&20u16.to_le_bytes());
    assert!(MonsterFile::parse(&mut ByteCursor::new(bytes, TextEncoding::Utf8)).is_err());
}

#[test]
fn test_slot_past_end_is_rejected() {
    let mut bytes = make_monster("Slime", "Weak");
    bytes[10..12].copy_from_slice(&400u16.to_le_bytes());
    assert!(MonsterFile::parse(&mut ByteCursor::new(bytes, TextEncoding::Utf8)).is_err());
}

#[test]
fn test_rebuild_keeps_bytes_between_slots() {
    // Slots at 12 (4 wide) and 18 (4 wide), with AB CD between them
    let mut data = Vec::new();
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(&18u16.to_le_bytes());
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(b"Abc\0");
    data.extend_from_slice(&[0xAB, 0xCD]);
    data.extend_from_slice(b"Def\0");
    data.extend_from_slice(b"TR");

    let mut monster = parse(data);
    monster.set_strings(&["LongerName", "Def"]).unwrap();
    let out = monster.write().unwrap();

    // First slot grows to 11 bytes: 12..23, gap 23..25, second slot 25..29
    assert_eq!(&out[4..12], &[12, 0, 11, 0, 25, 0, 4, 0]);
    assert_eq!(&out[12..23], b"LongerName\0");
    assert_eq!(&out[23..25], &[0xAB, 0xCD]);
    assert_eq!(&out[25..29], b"Def\0");
    assert_eq!(&out[29..], b"TR");

    let reparsed = parse(out);
    assert_eq!(reparsed.strings(), &["LongerName".to_string(), "Def".to_string()]);
}
