//! Distinct-value side index: one deduplicated table of observed values per
//! (hypertable, replica endpoint), fed from the staged batch just before
//! each fan-out move.

use duckdb::Connection;

use crate::errors::InsertError;
use crate::staging::{self, StagingTable};

/// Insert-if-absent upsert of the distinct values a staged subset holds for
/// one flagged column. Conflicts with already-indexed values are expected
/// and absorbed. Values go in sorted so index growth stays deterministic
/// and scan-friendly; ordering affects layout only, never correctness.
pub fn upsert_batch_values(
    conn: &Connection,
    schema_name: &str,
    hypertable_name: &str,
    column: &str,
    staging: &StagingTable,
    ids: &[i64],
) -> Result<(), InsertError> {
    if ids.is_empty() {
        return Ok(());
    }
    let list = staging::id_list(ids);
    conn.execute(
        &format!(
            r#"
            INSERT INTO "{schema}"."{ht}_distinct" (column_name, value)
            SELECT DISTINCT '{col}', CAST(s."{col}" AS VARCHAR)
              FROM "{staging}" s
             WHERE s.staged_id IN ({list})
               AND s."{col}" IS NOT NULL
               AND NOT EXISTS (
                   SELECT 1 FROM "{schema}"."{ht}_distinct" d
                    WHERE d.column_name = '{col}'
                      AND d.value = CAST(s."{col}" AS VARCHAR)
               )
             ORDER BY 2
            "#,
            schema = schema_name,
            ht = hypertable_name,
            col = column,
            staging = staging.table,
            list = list
        ),
        [],
    )?;
    Ok(())
}

/// Indexed values of one column on one replica endpoint, ascending.
pub fn distinct_values(
    conn: &Connection,
    schema_name: &str,
    hypertable_name: &str,
    column: &str,
) -> Result<Vec<String>, InsertError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT value FROM \"{schema}\".\"{ht}_distinct\"
          WHERE column_name = '{col}' ORDER BY value",
        schema = schema_name,
        ht = hypertable_name,
        col = column
    ))?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
