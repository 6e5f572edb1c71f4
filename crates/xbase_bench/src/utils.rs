//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use xbase_core::{Config, FieldSpec, Table, TableVersion};

/// Width of the `CODE` field.
pub const CODE_LEN: usize = 8;

/// Fields of the benchmark table: `CODE` C(8), `AMOUNT` N(12,2).
pub fn bench_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::char("CODE", CODE_LEN),
        FieldSpec::numeric("AMOUNT", 12, 2),
    ]
}

/// Configuration used by every benchmark: one user, no lock files.
pub fn bench_config() -> Config {
    Config::default().single_user(true)
}

/// Generate a random upper-case key.
pub fn random_code(rng: &mut impl Rng) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// Generate `count` random keys.
pub fn generate_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| random_code(&mut rng)).collect()
}

/// Create `BENCH.DBF` in `dir`.
pub fn create_table(dir: &Path) -> Table {
    Table::create(
        &dir.join("BENCH.DBF"),
        &bench_fields(),
        TableVersion::V4,
        false,
        bench_config(),
    )
    .expect("create bench table")
}

/// Append one record per code.
pub fn fill(table: &mut Table, codes: &[String]) {
    for (i, code) in codes.iter().enumerate() {
        table.blank_record().expect("blank");
        table.put_char("CODE", code).expect("code");
        table.put_double("AMOUNT", i as f64).expect("amount");
        table.append_record().expect("append");
    }
}
