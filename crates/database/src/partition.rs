//! Keyspace arithmetic: named partitioning functions and the pure lookup
//! from a row's key value to the partition covering its reduced image.

use std::str::FromStr;

use duckdb::{params, Connection, OptionalExt};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tc_types::value::Value;
use tracing::error;

use crate::errors::InsertError;
use crate::models::{Partition, PartitionEpoch};

/// Named partitioning functions. The name is stored in the catalog and is
/// part of the storage contract; changing a function's behavior would strand
/// every partition range computed with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PartitionFunction {
    #[strum(serialize = "crc32")]
    #[serde(rename = "crc32")]
    Crc32,
}

impl FromStr for PartitionFunction {
    type Err = InsertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crc32" => Ok(PartitionFunction::Crc32),
            other => Err(InsertError::UnknownPartitionFunction(other.to_string())),
        }
    }
}

impl PartitionFunction {
    /// Reduce a key value into the epoch's keyspace [0, modulus). NULL keys
    /// hash the empty string so they route deterministically.
    pub fn reduce(&self, key: &Value, modulus: i64) -> i64 {
        match self {
            PartitionFunction::Crc32 => {
                let text = key.canonical_text();
                (crc32fast::hash(text.as_bytes()) as i64).rem_euclid(modulus)
            }
        }
    }
}

/// Pure lookup: the partition of `epoch` whose inclusive keyspace range
/// contains the reduced key. No partition covering the value means the
/// epoch's ranges no longer tile the key domain, which is catalog corruption
/// and fatal to the unit of work.
pub fn partition_for_key(
    conn: &Connection,
    epoch: &PartitionEpoch,
    key: &Value,
) -> Result<Partition, InsertError> {
    let keyspace_value = epoch
        .partitioning_func
        .reduce(key, epoch.partitioning_mod);
    let mut stmt = conn.prepare(
        r#"
        SELECT partition_id, epoch_id, keyspace_start, keyspace_end
          FROM "partition"
         WHERE epoch_id = ? AND keyspace_start <= ? AND ? <= keyspace_end
        "#,
    )?;
    let row = stmt
        .query_row(params![epoch.epoch_id, keyspace_value, keyspace_value], |r| {
            Ok(Partition {
                partition_id: r.get(0)?,
                epoch_id: r.get(1)?,
                keyspace_start: r.get(2)?,
                keyspace_end: r.get(3)?,
            })
        })
        .optional()?;
    match row {
        Some(p) => Ok(p),
        None => {
            error!(
                epoch_id = epoch.epoch_id,
                keyspace_value, "no partition covers keyspace value"
            );
            Err(InsertError::PartitionNotFound {
                epoch_id: epoch.epoch_id,
                keyspace_value,
            })
        }
    }
}

/// Tile [0, modulus) into `n` contiguous inclusive ranges, widest-first when
/// the modulus does not divide evenly. Used by the repartitioning helper.
pub fn split_keyspace(modulus: i64, n: usize) -> Vec<(i64, i64)> {
    let n = n.max(1) as i64;
    let base = modulus / n;
    let remainder = modulus % n;
    let mut ranges = Vec::with_capacity(n as usize);
    let mut start = 0;
    for i in 0..n {
        let width = base + if i < remainder { 1 } else { 0 };
        ranges.push((start, start + width - 1));
        start += width;
    }
    ranges
}
