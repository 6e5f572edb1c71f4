//! Table fixtures and common scenarios.
//!
//! Every fixture lives in its own temporary directory, removed when the
//! fixture is dropped.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xbase_core::{Config, FieldSpec, Table, TableVersion};

/// A table in a temporary directory.
pub struct TestTable {
    /// The open table.
    pub table: Table,
    // Declared after `table` so the table closes before the directory goes.
    dir: TempDir,
}

impl TestTable {
    /// Creates `<NAME>.DBF` with `specs` in a fresh temporary directory.
    pub fn create(name: &str, specs: &[FieldSpec], version: TableVersion, config: Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(format!("{}.DBF", name.to_ascii_uppercase()));
        let table = Table::create(&path, specs, version, false, config).expect("Failed to create table");
        Self { table, dir }
    }

    /// The temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file next to the table.
    pub fn sibling(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    /// Closes the table and opens it again with `config`.
    pub fn reopen(&mut self, config: Config) {
        let path = self.table.path().to_path_buf();
        self.table.close().expect("Failed to close table");
        self.table = Table::open(&path, config).expect("Failed to reopen table");
    }

    /// Opens a second handle on the same table.
    pub fn second_handle(&self, config: Config) -> Table {
        Table::open(self.table.path(), config).expect("Failed to open second handle")
    }
}

impl std::ops::Deref for TestTable {
    type Target = Table;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl std::ops::DerefMut for TestTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.table
    }
}

/// Configuration for tests that never share a table.
pub fn single_user() -> Config {
    Config::default().single_user(true)
}

/// Runs a test against a fresh single-user table.
pub fn with_temp_table<F, R>(specs: &[FieldSpec], f: F) -> R
where
    F: FnOnce(&mut Table) -> R,
{
    let mut fixture = TestTable::create("TEST", specs, TableVersion::V4, single_user());
    f(&mut fixture.table)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Fields of the payments table: `NAME` C(5), `AMOUNT` N(9,2).
    pub fn payment_fields() -> Vec<FieldSpec> {
        vec![FieldSpec::char("NAME", 5), FieldSpec::numeric("AMOUNT", 9, 2)]
    }

    /// A payments table holding one record per amount, named `P1`, `P2`...
    pub fn amount_table_with(amounts: &[f64], config: Config) -> TestTable {
        let mut fixture = TestTable::create("PAYMENTS", &payment_fields(), TableVersion::V4, config);
        for (i, amount) in amounts.iter().enumerate() {
            fixture.blank_record().expect("blank");
            fixture.put_char("NAME", &format!("P{}", i + 1)).expect("name");
            fixture.put_double("AMOUNT", *amount).expect("amount");
            fixture.append_record().expect("append");
        }
        fixture
    }

    /// [`amount_table_with`] in single-user mode.
    pub fn amount_table(amounts: &[f64]) -> TestTable {
        amount_table_with(amounts, single_user())
    }

    /// A contacts table with a memo field and `count` records.
    pub fn contacts_table(count: u32, version: TableVersion) -> TestTable {
        let specs = [
            FieldSpec::char("LAST", 12),
            FieldSpec::char("FIRST", 10),
            FieldSpec::date("BORN"),
            FieldSpec::logical("ACTIVE"),
            FieldSpec::memo("NOTES"),
        ];
        let mut fixture = TestTable::create("CONTACTS", &specs, version, single_user());
        for i in 1..=count {
            fixture.blank_record().expect("blank");
            fixture.put_char("LAST", &format!("LAST{:04}", (i * 7919) % 1000)).expect("last");
            fixture.put_char("FIRST", &format!("F{i}")).expect("first");
            fixture
                .put_date_str("BORN", &format!("19{:02}0{}1{}", 50 + i % 40, 1 + i % 9, i % 10))
                .expect("born");
            fixture.put_logical("ACTIVE", i % 3 != 0).expect("active");
            if i % 2 == 0 {
                fixture.put_memo("NOTES", &format!("notes for contact {i}")).expect("notes");
            }
            fixture.append_record().expect("append");
        }
        fixture
    }
}
