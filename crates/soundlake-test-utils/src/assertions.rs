//! Read-back helpers and assertions over written tables.

use std::collections::BTreeMap;

use arrow::array::Array;
use arrow::util::display::array_value_to_string;
use soundlake_core::RootedStorage;
use soundlake_etl::inspect::read_table;
use soundlake_etl::writer::SUCCESS_MARKER;
use soundlake_etl::Table;

/// One row read back from a table, keyed by column name.
///
/// Partition columns are merged in from the directory names. Values are
/// rendered with Arrow's display formatting; nulls are `None`.
pub type Row = BTreeMap<String, Option<String>>;

/// Reads every row of `table`, partition values included.
pub async fn read_rows(storage: &RootedStorage, table: Table) -> Vec<Row> {
    let files = read_table(storage, table).await.expect("read table");
    let mut rows = Vec::new();
    for file in &files {
        for batch in &file.batches {
            let schema = batch.schema();
            for row in 0..batch.num_rows() {
                let mut values: Row = file
                    .partition
                    .iter()
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                for (field, column) in schema.fields().iter().zip(batch.columns()) {
                    let value = if column.is_null(row) {
                        None
                    } else {
                        Some(array_value_to_string(column.as_ref(), row).expect("display value"))
                    };
                    values.insert(field.name().clone(), value);
                }
                rows.push(values);
            }
        }
    }
    rows
}

/// Returns the values of `column` across `rows`, in order.
pub fn column<'a>(rows: &'a [Row], column: &str) -> Vec<Option<&'a str>> {
    rows.iter()
        .map(|r| r.get(column).and_then(|v| v.as_deref()))
        .collect()
}

/// Asserts that `table` has a `_SUCCESS` marker.
pub async fn assert_table_complete(storage: &RootedStorage, table: Table) {
    let marker = format!("{}/{SUCCESS_MARKER}", table.directory());
    assert!(
        storage.head(&marker).await.expect("head").is_some(),
        "expected {marker} to exist"
    );
}

/// Asserts that nothing was written for `table`.
pub async fn assert_table_absent(storage: &RootedStorage, table: Table) {
    let keys = storage
        .list(&format!("{}/", table.directory()))
        .await
        .expect("list");
    assert!(keys.is_empty(), "expected no objects for {table}, found {keys:?}");
}
