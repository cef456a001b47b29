//! timechunk database crate
//!
//! The write path for hypertables: rows staged for a logical time/key
//! partitioned table are routed to the correct time-bounded chunk and
//! keyspace partition, chunks are materialized lazily with one physical
//! table per replica endpoint, and each row is fanned out to every replica
//! of its chunk — all inside the caller's transaction.
//!
//! Key modules:
//! - `init`: Catalog DDL and connection helpers (file, memory, or `TC_DB`).
//! - `catalog`: Hypertable registration, replica endpoints, typed lookups.
//! - `epoch`: Epoch point lookup by time and the repartitioning helper.
//! - `partition`: Partitioning-function registry and keyspace resolution.
//! - `chunk`: Lazy chunk creation under keyed locks; close-and-roll policy.
//! - `staging`: The staged-row buffer the router drains.
//! - `distinct`: Per-replica distinct-value side indexes.
//! - `router`: The `insert` entry point, reentrancy guard, and fan-out.
//!
//! To get started, open a catalog via `init::open_catalog`, register a
//! hypertable with `catalog::ensure_hypertable`, attach replica endpoints,
//! install an epoch with `epoch::create_epoch`, stage rows, and call
//! `router::insert`.

pub mod catalog;
pub mod chunk;
pub mod distinct;
pub mod epoch;
pub mod errors;
pub mod init;
pub mod models;
pub mod partition;
pub mod router;
pub mod staging;

pub use errors::InsertError;
