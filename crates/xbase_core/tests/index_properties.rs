//! Index consistency across formats, reindex determinism and random
//! workloads.

use proptest::prelude::*;
use xbase_core::{
    IndexKind, IntegrityOutput, Nav, ReindexScope, Table, TableVersion, TagDef, TagHandle,
};
use xbase_testkit::prelude::*;

fn codes_table() -> TestTable {
    TestTable::create(
        "CODES",
        &[
            xbase_core::FieldSpec::char("CODE", 6),
            xbase_core::FieldSpec::numeric("AMOUNT", 9, 2),
        ],
        TableVersion::V4,
        single_user(),
    )
}

fn key_order(t: &mut Table, tag: TagHandle) -> Vec<String> {
    t.set_current_tag(tag).unwrap();
    let mut codes = Vec::new();
    let mut nav = t.get_first_key().unwrap();
    while let Nav::Record(_) = nav {
        codes.push(t.get_char("CODE").unwrap());
        nav = t.get_next_key().unwrap();
    }
    codes
}

#[test]
fn every_format_is_consistent_after_reindex() {
    let mut t = scenarios::contacts_table(300, TableVersion::V4);
    let tags = [
        t.create_tag(IndexKind::Ndx, &TagDef::new("LASTN", "LAST"), false).unwrap(),
        t.create_tag(IndexKind::Mdx, &TagDef::new("BORN", "BORN").descending(true), false)
            .unwrap(),
        t.create_tag(IndexKind::Tdx, &TagDef::new("ACT", "LAST+FIRST").filter("ACTIVE"), false)
            .unwrap(),
    ];
    t.reindex(ReindexScope::All).unwrap();
    for tag in tags {
        let report = t.check_tag_integrity(tag, IntegrityOutput::Summary).unwrap();
        assert!(report.is_ok(), "{}: {:?}", report.tag, report.problems);
        assert!(report.keys > 0);
    }
}

#[test]
fn repeated_reindex_is_byte_identical() {
    let mut t = scenarios::contacts_table(120, TableVersion::V4);
    t.create_tag(IndexKind::Ndx, &TagDef::new("LASTN", "LAST"), false).unwrap();
    t.create_tag(IndexKind::Mdx, &TagDef::new("LAST", "LAST"), false).unwrap();
    t.create_tag(IndexKind::Mdx, &TagDef::new("BORN", "BORN"), false).unwrap();
    for recno in (1..=120).step_by(5) {
        t.get_record(recno).unwrap();
        t.put_char("LAST", "CHANGED").unwrap();
        t.commit().unwrap();
    }

    t.reindex(ReindexScope::All).unwrap();
    let first = FileSnapshot::take(t.dir()).unwrap();
    t.reindex(ReindexScope::All).unwrap();
    let second = FileSnapshot::take(t.dir()).unwrap();
    assert!(first.changed(&second).is_empty(), "{}", second.to_json());
    assert!(first.get("LASTN.NDX").is_some());
    assert!(first.get("CONTACTS.MDX").is_some());
}

#[test]
fn single_tag_reindex_leaves_other_files_alone() {
    let mut t = scenarios::contacts_table(50, TableVersion::V3);
    let ndx = t.create_tag(IndexKind::Ndx, &TagDef::new("LASTN", "LAST"), false).unwrap();
    t.create_tag(IndexKind::Mdx, &TagDef::new("LAST", "LAST"), false).unwrap();
    let before = FileSnapshot::take(t.dir()).unwrap();
    t.reindex(ReindexScope::Tag(ndx)).unwrap();
    let after = FileSnapshot::take(t.dir()).unwrap();
    assert!(!after.changed(&before).contains(&"CONTACTS.MDX".to_string()));
}

proptest! {
    #![proptest_config(file_proptest_config())]

    #[test]
    fn tags_follow_random_workloads(ops in table_ops_strategy(6, 60)) {
        let mut t = codes_table();
        let mdx = t.create_tag(IndexKind::Mdx, &TagDef::new("CODE", "CODE"), false).unwrap();
        let desc = t
            .create_tag(IndexKind::Mdx, &TagDef::new("CODED", "CODE").descending(true), false)
            .unwrap();
        let ndx = t.create_tag(IndexKind::Ndx, &TagDef::new("CODEN", "CODE"), false).unwrap();
        let mut model: Vec<String> = Vec::new();

        for op in ops {
            match op {
                TableOp::Append { code, amount } => {
                    t.blank_record().unwrap();
                    t.put_char("CODE", &code).unwrap();
                    t.put_double("AMOUNT", amount).unwrap();
                    t.append_record().unwrap();
                    model.push(code);
                }
                TableOp::Rekey { slot, code } if !model.is_empty() => {
                    let i = slot % model.len();
                    t.get_record(i as u32 + 1).unwrap();
                    t.put_char("CODE", &code).unwrap();
                    t.put_record(None).unwrap();
                    model[i] = code;
                }
                TableOp::ToggleDelete { slot } if !model.is_empty() => {
                    let recno = (slot % model.len()) as u32 + 1;
                    t.get_record(recno).unwrap();
                    if t.is_deleted() {
                        t.undelete_record().unwrap();
                    } else {
                        t.delete_record().unwrap();
                    }
                    t.commit().unwrap();
                }
                _ => {}
            }
        }

        let mut expected = model.clone();
        expected.sort();
        prop_assert_eq!(key_order(&mut t, mdx), expected.clone());
        prop_assert_eq!(key_order(&mut t, ndx), expected.clone());
        expected.reverse();
        prop_assert_eq!(key_order(&mut t, desc), expected);
        for tag in [mdx, desc, ndx] {
            let report = t.check_tag_integrity(tag, IntegrityOutput::Silent).unwrap();
            prop_assert!(report.is_ok(), "{:?}", report.problems);
        }
    }
}
