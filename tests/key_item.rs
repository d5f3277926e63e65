//! Integration tests for key item hydration against synthetic hives.

mod common;

use common::*;
use reg_reader::{AsciiCodepage, Hive, ItemHealth, RegistryError, ValueData};
use std::sync::Arc;

fn hive_from(builder: &HiveBuilder, root_offset: u32) -> Hive {
    Hive::from_vec(builder.build(root_offset)).expect("synthetic hive should parse")
}

#[test]
fn test_empty_root_key_with_security_descriptor() {
    let mut builder = HiveBuilder::new();
    let sk_offset = builder.add_cell(&sk_cell(&[0x01, 0x00, 0x04, 0x80]));
    let nk_offset = builder.add_cell(&NkCell::new("Root").security(sk_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();

    assert_eq!(item.number_of_values(), 0);
    assert!(item.class_name().is_none());
    assert_eq!(item.security_descriptor(), Some(&[0x01, 0x00, 0x04, 0x80][..]));
    assert_eq!(item.health(), ItemHealth::Intact);
}

#[test]
fn test_corrupt_value_list_skips_dangling_entries() {
    let mut builder = HiveBuilder::new();
    // 0xAA and 0xBB fall inside the hive bin; 0xCCCCCCCC does not
    let list_offset = builder.add_cell(&value_list_cell(&[0xAA, 0xBB, 0xCCCCCCCC]));
    let nk_offset = builder.add_cell(&NkCell::new("Damaged").values(3, list_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();

    assert_eq!(item.number_of_values(), 2);
    assert!(item.is_corrupted());
    assert_eq!(
        item.value_list().iter().collect::<Vec<_>>(),
        vec![0xAA, 0xBB]
    );
    // The named key still declares three values
    assert_eq!(item.named_key().number_of_values, 3);
}

#[test]
fn test_name_hash_fast_path() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Foo").bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();
    let cp = AsciiCodepage::default();

    let hash = item.named_key().name_hash();
    assert_eq!(hash, reg_reader::name_hash(b"Foo", true));

    assert!(!item
        .compare_name_with_utf8(hash.wrapping_add(1), "Foo", cp)
        .unwrap());
    assert!(item.compare_name_with_utf8(hash, "Foo", cp).unwrap());
    assert!(item.compare_name_with_utf8(0, "fOO", cp).unwrap());
}

#[test]
fn test_class_name_exact_fit() {
    let mut builder = HiveBuilder::new();
    let class_data = utf16le("Class");
    let class_offset = builder.add_cell(&class_data);
    let nk_offset = builder.add_cell(
        &NkCell::new("Key")
            .class_name(class_offset, class_data.len() as u16)
            .bytes(),
    );

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();

    assert_eq!(item.class_name().map(|c| c.len()), Some(10));
    assert_eq!(item.utf8_class_name().unwrap().as_deref(), Some("Class"));
    assert_eq!(item.health(), ItemHealth::Intact);
}

#[test]
fn test_class_name_legacy_zero_sentinel() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Key").class_name(0, 0).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();

    assert!(item.class_name().is_none());
    assert_eq!(item.health(), ItemHealth::Intact);
}

#[test]
fn test_class_name_size_past_cell_is_fatal() {
    let mut builder = HiveBuilder::new();
    let class_offset = builder.add_cell(&utf16le("Class"));
    // Cell holds 12 bytes (10 + padding); claim 64
    let nk_offset = builder.add_cell(&NkCell::new("Key").class_name(class_offset, 64).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let result = root.hydrate(hive.cell_source());

    assert!(matches!(result, Err(RegistryError::TruncatedData { .. })));
}

#[test]
fn test_values_sentinel_offset_with_count_is_fatal() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Key").values(3, 0xFFFFFFFF).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();

    assert!(root.hydrate(hive.cell_source()).is_err());
}

#[test]
fn test_values_list_cell_too_small_is_fatal() {
    let mut builder = HiveBuilder::new();
    // Cell holds two offsets (12 bytes with padding); claim four values
    let list_offset = builder.add_cell(&value_list_cell(&[0xAA, 0xBB]));
    let nk_offset = builder.add_cell(&NkCell::new("Key").values(4, list_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();

    assert!(matches!(
        root.hydrate(hive.cell_source()),
        Err(RegistryError::TruncatedData { .. })
    ));
}

#[test]
fn test_values_list_outside_bins_is_advisory() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Key").values(2, 0x00800000).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();

    assert!(item.is_corrupted());
    assert_eq!(item.number_of_values(), 0);
}

#[test]
fn test_bad_security_key_is_fatal() {
    let mut builder = HiveBuilder::new();
    let bogus_offset = builder.add_cell(b"XXXXXXXXXXXXXXXXXXXXXXXX");
    let nk_offset = builder.add_cell(&NkCell::new("Key").security(bogus_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();

    assert!(root.hydrate(hive.cell_source()).is_err());
}

#[test]
fn test_value_records_hydrate_through_cache() {
    let mut builder = HiveBuilder::new();
    let alpha_offset = builder.add_cell(&vk_inline_dword("Alpha", 42));
    let beta_offset = builder.add_cell(&vk_inline_dword("Beta", 7));
    let list_offset = builder.add_cell(&value_list_cell(&[alpha_offset, beta_offset]));
    let nk_offset = builder.add_cell(&NkCell::new("Key").values(2, list_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let source = hive.cell_source();
    let mut root = hive.root_node();
    let item = root.hydrate(source).unwrap();

    assert_eq!(item.number_of_values(), 2);

    let alpha = item.value(source, 0).unwrap();
    assert_eq!(alpha.name, "Alpha");
    assert!(matches!(alpha.data(source).unwrap(), ValueData::Dword(42)));

    // Second lookup comes from the cache
    let again = item.value(source, 0).unwrap();
    assert!(Arc::ptr_eq(&alpha, &again));

    // Name lookup is case-insensitive
    let beta = item.value_by_name(source, "beta").unwrap();
    assert_eq!(beta.name, "Beta");

    assert!(matches!(
        item.value(source, 5),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        item.value_by_name(source, "Gamma"),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn test_string_value_data_from_cell() {
    let mut builder = HiveBuilder::new();
    let data = utf16le("hello\0");
    let data_offset = builder.add_cell(&data);
    let vk_offset = builder.add_cell(&vk_with_data("Greeting", 1, data_offset, data.len() as u32));
    let list_offset = builder.add_cell(&value_list_cell(&[vk_offset]));
    let nk_offset = builder.add_cell(&NkCell::new("Key").values(1, list_offset).bytes());

    let hive = hive_from(&builder, nk_offset);
    let source = hive.cell_source();
    let mut root = hive.root_node();
    let item = root.hydrate(source).unwrap();

    let value = item.value(source, 0).unwrap();
    match value.data(source).unwrap() {
        ValueData::String(s) => assert_eq!(s, "hello"),
        other => panic!("expected string value, got {:?}", other),
    }
}

#[test]
fn test_utf16_key_name_round_trip() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Caf\u{e9}").utf16_name().bytes());

    let hive = hive_from(&builder, nk_offset);
    let mut root = hive.root_node();
    let item = root.hydrate(hive.cell_source()).unwrap();
    let cp = AsciiCodepage::default();

    // UTF-16LE name: two bytes per character
    assert_eq!(item.name_size(), 8);

    let name = item.utf8_name(cp).unwrap();
    assert_eq!(name, "Caf\u{e9}");
    assert!(item.compare_name_with_utf8(0, &name, cp).unwrap());

    let units = item.utf16_name(cp).unwrap();
    assert!(item.compare_name_with_utf16(0, &units, cp).unwrap());
}

#[test]
fn test_rehydration_is_idempotent() {
    let mut builder = HiveBuilder::new();
    let value_offset = builder.add_cell(&vk_inline_dword("Count", 3));
    let list_offset = builder.add_cell(&value_list_cell(&[value_offset]));
    let nk_offset = builder.add_cell(
        &NkCell::new("Stable")
            .values(1, list_offset)
            .timestamp(0x01D9_8765_4321_0000)
            .bytes(),
    );

    let hive = hive_from(&builder, nk_offset);
    let source = hive.cell_source();

    let mut first = hive.root_node();
    let mut second = hive.root_node();
    let a = first.hydrate(source).unwrap();
    let b = second.hydrate(source).unwrap();

    assert_eq!(a.name(), b.name());
    assert_eq!(a.named_key().name_hash(), b.named_key().name_hash());
    assert_eq!(a.number_of_values(), b.number_of_values());
    assert_eq!(a.last_written_time(), b.last_written_time());
    assert_eq!(a.health(), b.health());
}

#[test]
fn test_eviction_allows_rehydration() {
    let mut builder = HiveBuilder::new();
    let nk_offset = builder.add_cell(&NkCell::new("Key").bytes());

    let hive = hive_from(&builder, nk_offset);
    let source = hive.cell_source();
    let mut root = hive.root_node();

    root.hydrate(source).unwrap();
    assert!(root.item().is_some());

    root.evict();
    assert!(root.item().is_none());

    let item = root.hydrate(source).unwrap();
    assert_eq!(item.utf8_name(AsciiCodepage::default()).unwrap(), "Key");
}
