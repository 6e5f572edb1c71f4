//! End-to-end table scenarios on real files.

use xbase_core::{
    Config, ErrorCode, FieldType, IndexKind, IndexMode, KeyValue, LockOption, Lookup, Nav, Scope,
    Table, TableVersion, TagDef,
};
use xbase_testkit::prelude::*;

#[test]
fn amount_tag_orders_and_finds_keys() {
    let mut t = scenarios::amount_table(&[20.0, 10.0, 30.0]);
    let tag = t
        .create_tag(IndexKind::Mdx, &TagDef::new("AMOUNT", "AMOUNT"), false)
        .unwrap();
    t.set_current_tag(tag).unwrap();

    assert_eq!(t.get_first_key().unwrap(), Nav::Record(2));
    assert_eq!(t.get_double("AMOUNT").unwrap(), 10.0);
    assert_eq!(t.get_last_key().unwrap(), Nav::Record(3));
    assert_eq!(t.get_double("AMOUNT").unwrap(), 30.0);
    assert_eq!(t.find_key(&KeyValue::Numeric(25.0)).unwrap(), Lookup::NotFound);
    assert_eq!(t.find_key(&KeyValue::Numeric(20.0)).unwrap(), Lookup::Found(1));
    assert_eq!(t.get_char("NAME").unwrap(), "P1");
}

#[test]
fn create_then_open_keeps_descriptors() {
    for version in [TableVersion::V3, TableVersion::V4] {
        let mut t = scenarios::contacts_table(3, version);
        let fields = t.fields().to_vec();
        let record_len = t.record_len();
        t.reopen(single_user());
        assert_eq!(t.fields(), fields.as_slice());
        assert_eq!(t.record_len(), record_len);
        assert_eq!(t.version(), version);
        assert_eq!(t.fields()[4].field_type, FieldType::Memo);
    }
}

#[test]
fn committed_buffer_is_what_get_record_returns() {
    let mut t = scenarios::contacts_table(4, TableVersion::V4);
    t.get_record(3).unwrap();
    t.put_char("FIRST", "RENAMED").unwrap();
    t.put_logical("ACTIVE", true).unwrap();
    t.put_memo("NOTES", "rewritten").unwrap();
    t.commit().unwrap();
    let committed = t.record_buf().to_vec();

    t.reopen(single_user());
    t.get_record(3).unwrap();
    assert_eq!(t.record_buf(), committed.as_slice());
    assert_eq!(t.get_char("FIRST").unwrap(), "RENAMED");
    assert_eq!(t.get_memo("NOTES").unwrap(), "rewritten");
}

#[test]
fn halt_mode_leaves_duplicate_out_of_table() {
    let config = single_user().index_mode(IndexMode::HaltOnDupKey);
    let mut t = scenarios::amount_table_with(&[10.0], config);
    let tag = t
        .create_tag(IndexKind::Ndx, &TagDef::new("NAMES", "NAME").unique(true), false)
        .unwrap();

    t.blank_record().unwrap();
    t.put_char("NAME", "P1").unwrap();
    let err = t.append_record().unwrap_err();
    assert_eq!(err.code(), ErrorCode::KeyNotUnique);
    t.abort().unwrap();

    assert_eq!(t.record_count(), 1);
    assert_eq!(t.key_count(tag).unwrap(), 1);
    assert_eq!(t.get_last_record(Scope::All).unwrap(), Nav::Record(1));
}

#[test]
fn emulate_mode_finds_only_the_first_record() {
    let mut t = scenarios::amount_table(&[10.0]);
    t.create_tag(IndexKind::Mdx, &TagDef::new("NAMES", "NAME").unique(true), false)
        .unwrap();

    t.blank_record().unwrap();
    t.put_char("NAME", "P1").unwrap();
    t.put_double("AMOUNT", 99.0).unwrap();
    assert_eq!(t.append_record().unwrap(), 2);

    assert_eq!(t.find_key_str("P1").unwrap(), Lookup::Found(1));
    assert_eq!(t.get_double("AMOUNT").unwrap(), 10.0);
    assert_eq!(t.get_next_key().unwrap(), Nav::Eof);
}

#[test]
fn second_handle_cannot_lock_a_locked_table() {
    let mut a = scenarios::amount_table_with(&[10.0, 20.0], Config::default());
    let mut b: Table = a.second_handle(Config::default());

    a.lock_table(LockOption::Lock).unwrap();
    let err = b.lock_table(LockOption::Lock).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockFailed);

    a.lock_table(LockOption::Unlock).unwrap();
    b.lock_table(LockOption::Lock).unwrap();
    b.lock_table(LockOption::Unlock).unwrap();
}

#[test]
fn appends_through_one_handle_are_seen_by_another() {
    let mut a = scenarios::amount_table_with(&[10.0], Config::default());
    let tag = a
        .create_tag(IndexKind::Mdx, &TagDef::new("AMOUNT", "AMOUNT"), false)
        .unwrap();
    let mut b = a.second_handle(Config::default());

    b.blank_record().unwrap();
    b.put_char("NAME", "B").unwrap();
    b.put_double("AMOUNT", 5.0).unwrap();
    assert_eq!(b.append_record().unwrap(), 2);

    assert_eq!(a.get_first_key().unwrap(), Nav::Record(2));
    assert_eq!(a.key_count(tag).unwrap(), 2);
    assert_eq!(a.record_count(), 2);
}

#[test]
fn pack_then_reopen() {
    let mut t = scenarios::contacts_table(10, TableVersion::V4);
    t.create_tag(IndexKind::Mdx, &TagDef::new("LAST", "LAST"), false)
        .unwrap();
    for recno in [2, 3, 7] {
        t.get_record(recno).unwrap();
        t.delete_record().unwrap();
        t.commit().unwrap();
    }
    assert_eq!(t.pack().unwrap(), 3);
    t.reopen(single_user());
    assert_eq!(t.record_count(), 7);
    let tag = t.tag_by_name("LAST").unwrap();
    assert_eq!(t.key_count(tag).unwrap(), 7);
    t.get_record(1).unwrap();
    assert_eq!(t.get_char("FIRST").unwrap(), "F1");
    t.get_record(3).unwrap();
    assert_eq!(t.get_char("FIRST").unwrap(), "F5");
}

#[test]
fn many_ndx_changes_through_one_handle_are_seen_by_another() {
    let mut a = scenarios::amount_table_with(&[], Config::default());
    a.create_tag(IndexKind::Ndx, &TagDef::new("NAMES", "NAME"), false)
        .unwrap();
    for i in 1..=20 {
        a.blank_record().unwrap();
        a.put_char("NAME", &format!("A{i:04}")).unwrap();
        a.append_record().unwrap();
    }

    let mut b = a.second_handle(Config::default());
    let tag = b.tag_by_name("NAMES").unwrap();
    b.set_current_tag(tag).unwrap();
    assert_eq!(b.key_count(tag).unwrap(), 20);
    assert_eq!(b.find_key_str("A0020").unwrap(), Lookup::Found(20));

    // More changes than the one-byte change counter in the NDX header can tell apart.
    for i in 1..=130 {
        a.blank_record().unwrap();
        a.put_char("NAME", &format!("B{i:04}")).unwrap();
        a.append_record().unwrap();
    }

    assert_eq!(b.key_count(tag).unwrap(), 150);
    assert_eq!(b.find_key_str("B0065").unwrap(), Lookup::Found(85));
    assert_eq!(b.get_last_key().unwrap(), Nav::Record(150));
    assert_eq!(b.get_char("NAME").unwrap(), "B0130");
}

#[test]
fn emulate_mode_put_onto_an_existing_key_keeps_the_first_record() {
    let mut t = scenarios::amount_table(&[10.0, 20.0]);
    let tag = t
        .create_tag(IndexKind::Mdx, &TagDef::new("NAMES", "NAME").unique(true), false)
        .unwrap();
    t.set_current_tag(tag).unwrap();

    t.get_record(2).unwrap();
    t.put_char("NAME", "P1").unwrap();
    t.put_record(None).unwrap();

    assert_eq!(t.key_count(tag).unwrap(), 1);
    assert_eq!(t.find_key_str("P2").unwrap(), Lookup::NotFound);
    assert_eq!(t.find_key_str("P1").unwrap(), Lookup::Found(1));
    assert_eq!(t.get_double("AMOUNT").unwrap(), 10.0);
    t.get_record(2).unwrap();
    assert_eq!(t.get_char("NAME").unwrap(), "P1");
    assert!(t
        .check_tag_integrity(tag, xbase_core::IntegrityOutput::Silent)
        .unwrap()
        .is_ok());
}

#[test]
fn mdx_amount_tag_orders_signed_values() {
    let mut t = scenarios::amount_table(&[5.0, -12.5, 0.0, 0.25, -0.5, 100.0]);
    let tag = t
        .create_tag(IndexKind::Mdx, &TagDef::new("AMOUNT", "AMOUNT"), false)
        .unwrap();
    assert_eq!(t.tag(tag).unwrap().key_len(), 12);
    t.set_current_tag(tag).unwrap();

    let mut order = Vec::new();
    let mut nav = t.get_first_key().unwrap();
    while let Nav::Record(recno) = nav {
        order.push(recno);
        nav = t.get_next_key().unwrap();
    }
    assert_eq!(order, vec![2, 5, 3, 4, 1, 6]);

    t.reopen(single_user());
    let tag = t.tag_by_name("AMOUNT").unwrap();
    t.set_current_tag(tag).unwrap();
    assert_eq!(t.find_key(&KeyValue::Numeric(-0.5)).unwrap(), Lookup::Found(5));
    assert_eq!(t.find_key(&KeyValue::Numeric(0.25)).unwrap(), Lookup::Found(4));
}
