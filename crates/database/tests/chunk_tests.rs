use tc_database::catalog::{
    attach_replica_schema, chunk_by_id, ensure_hypertable, replica_nodes_for,
};
use tc_database::chunk::{close_if_needed, get_or_create, ChunkLocks};
use tc_database::epoch::{create_epoch, EpochSpec};
use tc_database::init::create_catalog_schema;
use tc_database::partition::{split_keyspace, PartitionFunction};
use tc_types::schema::{ColumnDef, ColumnType, TableSchema};

const S: i64 = 1_000_000_000;
const HOUR_NS: i64 = 3_600 * S;

fn metrics_schema() -> TableSchema {
    TableSchema::new(
        "metrics",
        "time",
        vec![
            ColumnDef::new("time", ColumnType::Timestamp),
            ColumnDef::new("device", ColumnType::Text).distinct(),
            ColumnDef::new("reading", ColumnType::Double),
        ],
    )
}

/// Catalog with one hypertable, one single-partition epoch, and two replica
/// endpoints. Returns the partition id chunks are created under.
fn setup() -> (duckdb::Connection, i64) {
    let conn = duckdb::Connection::open_in_memory().expect("duckdb mem");
    create_catalog_schema(&conn).expect("init catalog schema");

    let schema = metrics_schema();
    let ht = ensure_hypertable(&conn, &schema, HOUR_NS).unwrap();
    attach_replica_schema(&conn, "metrics", "node0").unwrap();
    attach_replica_schema(&conn, "metrics", "node1").unwrap();
    create_epoch(
        &conn,
        ht,
        &EpochSpec {
            partitioning_func: PartitionFunction::Crc32,
            partitioning_column: "device".to_string(),
            partitioning_mod: 1000,
            start_time: None,
            end_time: None,
        },
        &split_keyspace(1000, 1),
        &[(0, "node0"), (1, "node1")],
    )
    .unwrap();

    let partition_id: i64 = conn
        .query_row("SELECT partition_id FROM \"partition\"", [], |r| r.get(0))
        .unwrap();
    (conn, partition_id)
}

#[test]
fn test_get_or_create_is_lazy_and_stable() {
    let (conn, partition_id) = setup();
    let locks = ChunkLocks::new();

    let first = get_or_create(&conn, &locks, partition_id, 90 * 60 * S, false).unwrap();
    assert_eq!(first.start_time, HOUR_NS);
    assert!(first.is_open());
    assert!(!first.closed);

    let again = get_or_create(&conn, &locks, partition_id, 90 * 60 * S, true).unwrap();
    assert_eq!(again.chunk_id, first.chunk_id);

    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM chunk", [], |r| r.get(0))
        .unwrap();
    assert_eq!(total, 1);
}

#[test]
fn test_replica_nodes_created_with_the_chunk() {
    let (conn, partition_id) = setup();
    let locks = ChunkLocks::new();

    let chunk = get_or_create(&conn, &locks, partition_id, 0, true).unwrap();
    let nodes = replica_nodes_for(&conn, chunk.chunk_id).unwrap();
    assert_eq!(nodes.len(), 2);

    for node in &nodes {
        assert_eq!(node.table_name, format!("metrics_{}", chunk.chunk_id));
        // The physical target is real and hypertable-shaped.
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM \"{}\".\"{}\"",
                    node.schema_name, node.table_name
                ),
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }
    let schemas: Vec<&str> = nodes.iter().map(|n| n.schema_name.as_str()).collect();
    assert!(schemas.contains(&"node0"));
    assert!(schemas.contains(&"node1"));
}

#[test]
fn test_chunk_boundary_closes_and_opens_successor() {
    let (conn, partition_id) = setup();
    let locks = ChunkLocks::new();

    let chunk = get_or_create(&conn, &locks, partition_id, 0, true).unwrap();
    assert_eq!(chunk.start_time, 0);

    // 3599s is still inside the configured hour.
    let same = get_or_create(&conn, &locks, partition_id, 3_599 * S, false).unwrap();
    assert_eq!(same.chunk_id, chunk.chunk_id);
    let unchanged = close_if_needed(&conn, &locks, &chunk, 3_599 * S).unwrap();
    assert_eq!(unchanged.chunk_id, chunk.chunk_id);
    assert!(chunk_by_id(&conn, chunk.chunk_id).unwrap().is_open());

    // 3600s exhausts the span: close, then a fresh chunk starts at 3600s.
    let successor = close_if_needed(&conn, &locks, &chunk, 3_600 * S).unwrap();
    assert_ne!(successor.chunk_id, chunk.chunk_id);
    assert_eq!(successor.start_time, 3_600 * S);
    assert!(successor.is_open());

    let closed = chunk_by_id(&conn, chunk.chunk_id).unwrap();
    assert!(closed.closed);
    assert_eq!(closed.end_time, Some(3_600 * S));
    // The closed range is immutable but still covers its own rows.
    assert!(closed.covers(3_599 * S));
    assert!(!closed.covers(3_600 * S));
}

#[test]
fn test_close_is_idempotent() {
    let (conn, partition_id) = setup();
    let locks = ChunkLocks::new();

    let chunk = get_or_create(&conn, &locks, partition_id, 0, true).unwrap();
    let s1 = close_if_needed(&conn, &locks, &chunk, 3_600 * S).unwrap();
    // Redundant close with the stale open handle settles on the same state.
    let s2 = close_if_needed(&conn, &locks, &chunk, 3_600 * S).unwrap();
    assert_eq!(s1.chunk_id, s2.chunk_id);

    let closed = chunk_by_id(&conn, chunk.chunk_id).unwrap();
    assert!(closed.closed);
    assert_eq!(closed.end_time, Some(3_600 * S));
}

#[test]
fn test_backfilled_chunk_is_bounded_at_birth() {
    let (conn, partition_id) = setup();
    let locks = ChunkLocks::new();

    let first = get_or_create(&conn, &locks, partition_id, 0, true).unwrap();
    // A far-future row retires the first chunk and opens one at 7200s.
    let ahead = close_if_needed(&conn, &locks, &first, 9_000 * S).unwrap();
    assert_eq!(ahead.start_time, 7_200 * S);
    assert!(ahead.is_open());

    // A late row in the gap gets a chunk bounded by its neighbors.
    let gap = get_or_create(&conn, &locks, partition_id, 5_000 * S, true).unwrap();
    assert_eq!(gap.start_time, 3_600 * S);
    assert_eq!(gap.end_time, Some(7_200 * S));

    let again = get_or_create(&conn, &locks, partition_id, 5_000 * S, true).unwrap();
    assert_eq!(again.chunk_id, gap.chunk_id);
}
