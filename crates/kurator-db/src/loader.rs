//! CSV-to-table merge engine
//!
//! Takes a locally staged, header-bearing CSV extract and merges it into a
//! live table: the header line is discarded, the live column layout is
//! resolved from the catalog, rows are staged into a transaction-scoped
//! temporary table, and an upsert keyed on the declared primary key applies
//! them: colliding keys get every non-key column overwritten with the
//! incoming value, new keys insert, and rows absent from the batch stay
//! untouched. The staging copy and the merge run as one atomic batch.
//!
//! Schema management is deliberately out of reach: [`TableLoader::create_table`]
//! and [`TableLoader::alter_table`] always fail, and a missing target table
//! fails the load before anything is written. Per-run schema creation drifts
//! silently across environments; migrations are an operator concern.

use crate::connection::Connector;
use crate::dataset::Dataset;
use crate::error::{DbError, Result};
use crate::executor::{BatchStatement, Executor};
use crate::schema::{SchemaInspector, TableColumn};
use crate::sql::{literal_or_null, quote_ident};
use std::io::Read;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Rows per staging INSERT statement.
const INSERT_CHUNK_SIZE: usize = 500;

/// Outcome of one load invocation.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: String,
    /// Data rows staged and merged (header excluded).
    pub rows: usize,
}

/// Merges CSV extracts into one target table.
#[derive(Debug)]
pub struct TableLoader<'a> {
    connector: &'a Connector,
    table: String,
    primary_key: Vec<String>,
    columns: OnceCell<Vec<TableColumn>>,
}

impl<'a> TableLoader<'a> {
    /// Loader for an explicitly named table and key.
    pub fn new(
        connector: &'a Connector,
        table: impl Into<String>,
        primary_key: &[&str],
    ) -> Result<Self> {
        let table = table.into();
        if primary_key.is_empty() {
            return Err(DbError::EmptyPrimaryKey(table));
        }
        Ok(Self {
            connector,
            table,
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            columns: OnceCell::new(),
        })
    }

    /// Loader for a declared dataset destination.
    pub fn for_dataset(connector: &'a Connector, dataset: &dyn Dataset) -> Result<Self> {
        Self::new(connector, dataset.table_name(), dataset.primary_key())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Live column layout of the target, read from the catalog on first use
    /// and memoized for this loader instance only. Schema is assumed stable
    /// within one invocation; a new loader re-reads the catalog.
    pub async fn columns(&self) -> Result<&[TableColumn]> {
        let columns = self
            .columns
            .get_or_try_init(|| async {
                let inspector = SchemaInspector::new(self.connector);
                inspector.columns_of(&self.table).await
            })
            .await?;
        Ok(columns.as_slice())
    }

    /// Merge a header-bearing CSV extract into the target table.
    pub async fn load<R: Read>(&self, input: R) -> Result<LoadReport> {
        // Column resolution comes first, so a missing table surfaces as
        // UndefinedTable with the database untouched.
        let columns = self.columns().await?;
        let rows = read_rows(input, columns.len())?;

        if rows.is_empty() {
            info!(table = %self.table, "extract contains no data rows, nothing to load");
            return Ok(LoadReport {
                table: self.table.clone(),
                rows: 0,
            });
        }

        let batch = build_batch(&self.table, columns, &self.primary_key, &rows);
        debug!(table = %self.table, statements = batch.len(), "executing load batch");

        Executor::new(self.connector)
            .execute_atomic(batch)
            .await
            .map_err(reclassify_data_errors)?;

        info!(table = %self.table, rows = rows.len(), "load committed");
        Ok(LoadReport {
            table: self.table.clone(),
            rows: rows.len(),
        })
    }

    // ========================================================================
    // Schema mutation guard
    // ========================================================================

    /// Always fails with [`DbError::SchemaMutationForbidden`]. Tables come
    /// into being through the migration tooling, never through a load.
    pub fn create_table(&self) -> Result<()> {
        Err(DbError::SchemaMutationForbidden {
            action: "create",
            table: self.table.clone(),
        })
    }

    /// Always fails with [`DbError::SchemaMutationForbidden`]. Column
    /// changes go through the migration tooling, never through a load.
    pub fn alter_table(&self) -> Result<()> {
        Err(DbError::SchemaMutationForbidden {
            action: "alter",
            table: self.table.clone(),
        })
    }
}

/// Parse the extract. The first line is a header and is discarded without
/// being checked against the live columns; every data row must match the
/// live column count exactly.
fn read_rows<R: Read>(input: R, expected_fields: usize) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != expected_fields {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(DbError::MalformedRow(format!(
                "line {}: expected {} fields, found {}",
                line,
                expected_fields,
                record.len()
            )));
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn staging_table(table: &str) -> String {
    format!("{table}_incoming")
}

fn column_list(columns: &[TableColumn]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The full statement batch for one load: staging table, chunked staging
/// inserts, merge. Runs as one atomic unit.
fn build_batch(
    table: &str,
    columns: &[TableColumn],
    primary_key: &[String],
    rows: &[Vec<String>],
) -> Vec<BatchStatement> {
    let stage = staging_table(table);
    let mut batch = Vec::with_capacity(rows.len() / INSERT_CHUNK_SIZE + 2);

    // Staging lives only inside the load transaction.
    batch.push(BatchStatement::execute(format!(
        "CREATE TEMPORARY TABLE {stage} (LIKE {target}) ON COMMIT DROP",
        stage = quote_ident(&stage),
        target = quote_ident(table),
    )));

    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        let values = chunk
            .iter()
            .map(|row| {
                format!(
                    "({})",
                    row.iter()
                        .map(|field| literal_or_null(field))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        batch.push(BatchStatement::execute(format!(
            "INSERT INTO {stage} ({columns}) VALUES {values}",
            stage = quote_ident(&stage),
            columns = column_list(columns),
        )));
    }

    batch.push(BatchStatement::execute(merge_statement(
        table,
        columns,
        primary_key,
    )));
    batch
}

/// Upsert from staging into the target. Key collisions overwrite every
/// non-key column with the incoming value (a full overwrite, never a
/// partial merge). A table whose columns are all key columns carries
/// nothing to update and degrades to DO NOTHING.
fn merge_statement(table: &str, columns: &[TableColumn], primary_key: &[String]) -> String {
    let is_key =
        |name: &str| primary_key.iter().any(|key| key.eq_ignore_ascii_case(name));

    // Render the conflict target with the catalog's spelling of each key
    // column; the declaration may differ in case.
    let conflict_target = primary_key
        .iter()
        .map(|key| {
            let name = columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(key))
                .map(|c| c.name.as_str())
                .unwrap_or(key.as_str());
            quote_ident(name)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let updates = columns
        .iter()
        .filter(|c| !is_key(&c.name))
        .map(|c| format!("{col} = EXCLUDED.{col}", col = quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {updates}")
    };

    format!(
        "INSERT INTO {target} ({columns}) SELECT {columns} FROM {stage} \
         ON CONFLICT ({conflict_target}) {conflict_action}",
        target = quote_ident(table),
        stage = quote_ident(&staging_table(table)),
        columns = column_list(columns),
    )
}

/// A statement that failed because a value does not fit its column
/// (SQLSTATE class 22, data exception) is the batch's fault, not the
/// transaction machinery's.
fn reclassify_data_errors(err: DbError) -> DbError {
    if let DbError::Transaction { ref source, .. } = err {
        if let Some(db) = source.as_database_error() {
            if db.code().is_some_and(|code| code.starts_with("22")) {
                return DbError::MalformedRow(db.message().to_string());
            }
        }
    }
    err
}
