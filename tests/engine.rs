//! End-to-end tests against the public `Engine` API, covering the seed
//! scenarios and round-trip laws the storage engine is designed around.

mod common;

use common::device_for;
use kvat::{Engine, KvatError};

fn open(page_size: u32, page_count: u8) -> Engine<common::RamDevice> {
    Engine::open(device_for(page_size, page_count), page_size, page_count).unwrap()
}

#[test]
fn single_page_round_trip() {
    let mut engine = open(12, 128);
    engine.save_str("n", "ok").unwrap();
    assert_eq!(engine.retrieve_string_alloc("n").unwrap(), "ok");
}

#[test]
fn multi_page_round_trip_with_embedded_newline() {
    let mut engine = open(12, 128);
    let value = "First string saved. \nMake sure it's on multiple pages.";
    engine.save_str("singKey", value).unwrap();
    assert_eq!(engine.retrieve_string_alloc("singKey").unwrap(), value);
}

#[test]
fn keys_sharing_a_path_prefix_do_not_collide() {
    let mut engine = open(12, 128);
    engine
        .save_str("second/key/this.h", "Contents of a header file")
        .unwrap();
    assert_eq!(
        engine.retrieve_string_alloc("second/key/this.c"),
        Err(KvatError::NotFound)
    );
    assert_eq!(
        engine.retrieve_string_alloc("second/key/this.h").unwrap(),
        "Contents of a header file"
    );
}

#[test]
fn overwriting_with_a_longer_value_keeps_the_key_chain_start_page() {
    let mut engine = open(12, 128);
    engine.save_str("k", "First.").unwrap();
    engine
        .save_str("k", "First. This part is new. This is newer.")
        .unwrap();
    assert_eq!(
        engine.retrieve_string_alloc("k").unwrap(),
        "First. This part is new. This is newer."
    );
}

#[test]
fn delete_then_retrieve_reports_not_found() {
    let mut engine = open(12, 128);
    engine.save_str("x", "v").unwrap();
    engine.delete("x").unwrap();
    assert_eq!(engine.retrieve_string_alloc("x"), Err(KvatError::NotFound));
}

#[test]
fn rename_moves_the_binding_to_the_new_key() {
    let mut engine = open(12, 128);
    engine.save_str("a", "1").unwrap();
    engine.rename("a", "b").unwrap();
    assert_eq!(engine.retrieve_string_alloc("b").unwrap(), "1");
    assert_eq!(engine.retrieve_string_alloc("a"), Err(KvatError::NotFound));
}

/// L2: delete, then save again under the same key, must behave as a
/// fresh save.
#[test]
fn save_delete_save_round_trips_cleanly() {
    let mut engine = open(12, 64);
    engine.save("k", b"first value").unwrap();
    engine.delete("k").unwrap();
    engine.save("k", b"second value").unwrap();
    assert_eq!(engine.retrieve_alloc("k").unwrap(), b"second value");
}

/// L3: rename preserves the value and frees the old binding.
#[test]
fn rename_preserves_the_value() {
    let mut engine = open(12, 64);
    engine.save("k", b"payload bytes").unwrap();
    engine.rename("k", "k2").unwrap();
    assert_eq!(engine.retrieve_alloc("k2").unwrap(), b"payload bytes");
    assert_eq!(engine.retrieve_alloc("k"), Err(KvatError::NotFound));
}

/// P6: overwriting one entry must never disturb another active entry's
/// pages.
#[test]
fn overwrite_of_one_entry_never_frees_another_entrys_pages() {
    let mut engine = open(12, 64);
    engine
        .save_str("a", "First string saved. \nMake sure it's on multiple pages.")
        .unwrap();
    engine.save_str("b", "a second, unrelated value").unwrap();
    let b_before = engine.retrieve_string_alloc("b").unwrap();

    engine.save_str("a", "a totally different, shorter value").unwrap();

    assert_eq!(engine.retrieve_string_alloc("b").unwrap(), b_before);
}

/// P8: prefix search visits every match exactly once, then reports
/// NotFound.
#[test]
fn prefix_search_visits_each_match_once() {
    let mut engine = open(12, 64);
    engine.save_str("user.name", "alice").unwrap();
    engine.save_str("user.age", "30").unwrap();
    engine.save_str("device.id", "abc").unwrap();

    let mut seen = std::vec::Vec::new();
    let mut state = kvat::SEARCH_INITIAL;
    loop {
        match engine.search_alloc("user.", state) {
            Ok((next, key)) => {
                seen.push(key);
                state = next;
            }
            Err(KvatError::NotFound) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    seen.sort();
    assert_eq!(seen, std::vec!["user.age", "user.name"]);
}

/// Retrieving into a too-small buffer truncates but still reports the
/// true length, so callers can detect truncation explicitly.
#[test]
fn retrieve_into_undersized_buffer_reports_truncation() {
    let mut engine = open(12, 128);
    let value = "First string saved. \nMake sure it's on multiple pages.";
    engine.save_str("singKey", value).unwrap();

    let mut small = [0u8; 4];
    let result = engine.retrieve("singKey", &mut small).unwrap();
    assert!(result.truncated);
    assert_eq!(result.len, value.len() + 1);
    assert_eq!(&small, &value.as_bytes()[..4]);
}

/// Several entries of mixed single/multi-page size coexist without
/// corrupting one another.
#[test]
fn many_entries_of_mixed_size_coexist() {
    let mut engine = open(12, 64);
    engine.save_str("a", "1").unwrap();
    engine
        .save_str("b", "a value long enough to span more than one page")
        .unwrap();
    engine.save_str("c", "3").unwrap();

    assert_eq!(engine.retrieve_string_alloc("a").unwrap(), "1");
    assert_eq!(
        engine.retrieve_string_alloc("b").unwrap(),
        "a value long enough to span more than one page"
    );
    assert_eq!(engine.retrieve_string_alloc("c").unwrap(), "3");
}

#[test]
fn renaming_to_an_existing_key_is_rejected() {
    let mut engine = open(12, 64);
    engine.save_str("a", "1").unwrap();
    engine.save_str("b", "2").unwrap();
    assert_eq!(engine.rename("a", "b"), Err(KvatError::KeyDuplicate));
}

#[test]
fn saving_past_the_device_capacity_reports_insufficient_space() {
    // 7 usable pages; each single-page entry costs one key page plus
    // one value page, so the 4th entry cannot fit.
    let mut engine = open(12, 8);
    engine.save("a", b"1").unwrap();
    engine.save("b", b"2").unwrap();
    engine.save("c", b"3").unwrap();
    assert_eq!(engine.save("d", b"4"), Err(KvatError::InsufficientSpace));
}
