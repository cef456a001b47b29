use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Storage type of one hypertable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ColumnType {
    Bigint,
    Double,
    Text,
    /// UTC nanoseconds since the Unix epoch; stored as BIGINT.
    Timestamp,
    Boolean,
}

impl ColumnType {
    /// SQL type used in physical DDL for staging, main, and chunk tables.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Bigint | ColumnType::Timestamp => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
        }
    }

    /// Inverse of the `Display` rendering stored in the catalog.
    pub fn from_catalog(s: &str) -> Option<ColumnType> {
        match s {
            "Bigint" => Some(ColumnType::Bigint),
            "Double" => Some(ColumnType::Double),
            "Text" => Some(ColumnType::Text),
            "Timestamp" => Some(ColumnType::Timestamp),
            "Boolean" => Some(ColumnType::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    /// Whether observed values of this column feed the per-replica
    /// distinct-value side index.
    pub distinct: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            distinct: false,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// Runtime schema descriptor for one hypertable: the ordered column list plus
/// the identity of the time column. The partitioning key column is *not* part
/// of this descriptor; it belongs to the epoch, because repartitioning can
/// change it without touching the table shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub time_column: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        time_column: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        Self {
            name: name.into(),
            time_column: time_column.into(),
            columns,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type_of(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    pub fn time_type(&self) -> Option<ColumnType> {
        self.column_type_of(&self.time_column)
    }

    pub fn distinct_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.distinct)
    }

    /// Quoted, comma-joined column list for INSERT ... SELECT statements.
    pub fn column_list_sql(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column definitions for CREATE TABLE bodies.
    pub fn ddl_body(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.column_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> TableSchema {
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

    #[test]
    fn catalog_roundtrip_of_column_types() {
        for ty in [
            ColumnType::Bigint,
            ColumnType::Double,
            ColumnType::Text,
            ColumnType::Timestamp,
            ColumnType::Boolean,
        ] {
            assert_eq!(ColumnType::from_catalog(&ty.to_string()), Some(ty));
        }
        assert_eq!(ColumnType::from_catalog("Interval"), None);
    }

    #[test]
    fn accessors_resolve_runtime_identity() {
        let s = metrics();
        assert_eq!(s.column_index(&s.time_column), Some(0));
        assert_eq!(s.column_type_of("device"), Some(ColumnType::Text));
        assert_eq!(s.time_type(), Some(ColumnType::Timestamp));
        let distinct: Vec<_> = s.distinct_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(distinct, vec!["device"]);
    }

    #[test]
    fn sql_fragments_quote_identifiers() {
        let s = metrics();
        assert_eq!(s.column_list_sql(), "\"time\", \"device\", \"reading\"");
        assert_eq!(
            s.ddl_body(),
            "\"time\" BIGINT, \"device\" VARCHAR, \"reading\" DOUBLE"
        );
    }
}
