//! Live catalog introspection
//!
//! The column layout used to build a merge is always read from the
//! database's own catalog, never from the caller's declaration. A missing
//! table is a distinct error, not an empty list.

use crate::connection::Connector;
use crate::error::{DbError, Result};
use crate::executor::Executor;
use crate::sql::quote_literal;
use sqlx::Row as _;

/// A column as reported by the live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Declared scalar type, e.g. "integer" or "text".
    pub data_type: String,
}

/// Reads table layouts from `information_schema`.
pub struct SchemaInspector<'a> {
    connector: &'a Connector,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self { connector }
    }

    /// The ordered column list of `table`, with declared types. Fails with
    /// [`DbError::UndefinedTable`] if the table is absent from the current
    /// schema.
    pub async fn columns_of(&self, table: &str) -> Result<Vec<TableColumn>> {
        let sql = format!(
            "SELECT column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND LOWER(table_name) = LOWER({table}) \
             ORDER BY ordinal_position",
            table = quote_literal(table)
        );

        let rows = Executor::new(self.connector).query(sql).await?;
        if rows.is_empty() {
            return Err(DbError::UndefinedTable(table.to_string()));
        }

        rows.iter()
            .map(|row| {
                Ok(TableColumn {
                    name: row.try_get("column_name").map_err(DbError::Decode)?,
                    data_type: row.try_get("data_type").map_err(DbError::Decode)?,
                })
            })
            .collect()
    }
}
