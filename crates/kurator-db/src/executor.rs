//! Atomic statement execution
//!
//! Everything the load layer says to the warehouse goes through
//! [`Executor::execute_atomic`]: one short-lived connection, one
//! transaction, statements strictly in order, one interpreted result per
//! statement. The commit happens only after every statement has run and
//! every result has been pulled out of the driver; any failure drops the
//! transaction, which rolls the whole batch back. How much of the returned
//! results a caller later inspects has no bearing on finalization.

use crate::connection::Connector;
use crate::error::{DbError, Result};
use crate::sql::quote_literal;
use sqlx::postgres::PgRow;
use sqlx::{Column as _, Connection as _, Executor as _, Postgres, Row as _, Statement as _};
use tracing::debug;

/// How the outcome of one statement is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Run for effect, discard any rows.
    None,
    /// Keep the first row, if any.
    First,
    /// Keep all rows.
    All,
    /// Keep all rows plus the result's column names.
    WithColumns,
}

/// One statement of an atomic batch, paired with its result interpretation.
#[derive(Debug, Clone)]
pub struct BatchStatement {
    pub sql: String,
    pub fetch: Fetch,
}

impl BatchStatement {
    /// Statement run for effect only.
    pub fn execute(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            fetch: Fetch::None,
        }
    }

    /// Statement whose first result row is kept.
    pub fn fetch_first(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            fetch: Fetch::First,
        }
    }

    /// Statement whose full result set is kept.
    pub fn fetch_all(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            fetch: Fetch::All,
        }
    }

    /// Statement whose full result set and column names are kept.
    pub fn fetch_with_columns(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            fetch: Fetch::WithColumns,
        }
    }
}

/// Interpreted outcome of one statement.
#[derive(Debug)]
pub enum RowSet {
    None,
    First(Option<PgRow>),
    All(Vec<PgRow>),
    WithColumns { rows: Vec<PgRow>, columns: Vec<String> },
}

impl RowSet {
    /// All rows carried by this result, however it was fetched.
    pub fn into_rows(self) -> Vec<PgRow> {
        match self {
            RowSet::None => Vec::new(),
            RowSet::First(row) => row.into_iter().collect(),
            RowSet::All(rows) => rows,
            RowSet::WithColumns { rows, .. } => rows,
        }
    }

    /// The first row carried by this result, if any.
    pub fn into_first(self) -> Option<PgRow> {
        match self {
            RowSet::None => None,
            RowSet::First(row) => row,
            RowSet::All(rows) => rows.into_iter().next(),
            RowSet::WithColumns { rows, .. } => rows.into_iter().next(),
        }
    }
}

/// Runs statement batches as single atomic units.
pub struct Executor<'a> {
    connector: &'a Connector,
}

impl<'a> Executor<'a> {
    pub fn new(connector: &'a Connector) -> Self {
        Self { connector }
    }

    /// Execute `batch` as one atomic unit and return the interpreted results
    /// in statement order. If any statement fails, every effect of the batch
    /// is rolled back and the error names the failing statement.
    pub async fn execute_atomic(&self, batch: Vec<BatchStatement>) -> Result<Vec<RowSet>> {
        self.connector
            .with_connection(move |conn| {
                Box::pin(async move {
                    let mut tx = conn.begin().await.map_err(|e| DbError::transaction(0, e))?;

                    let mut results = Vec::with_capacity(batch.len());
                    for (index, statement) in batch.iter().enumerate() {
                        debug!(index, sql = %statement.sql, "executing statement");
                        let result = run_statement(&mut tx, statement)
                            .await
                            .map_err(|e| DbError::transaction(index, e))?;
                        results.push(result);
                    }

                    // Every result is materialized by now. The commit is tied
                    // to reaching this point, not to what the caller later
                    // does with the returned rows; any earlier error dropped
                    // `tx`, which rolls everything back.
                    tx.commit()
                        .await
                        .map_err(|e| DbError::transaction(batch.len(), e))?;

                    Ok(results)
                })
            })
            .await
    }

    /// Execute exactly one statement atomically and return its single
    /// result. Producing anything other than one result means the
    /// statement/interpreter pairing is wrong in the caller, and fails
    /// loudly instead of being tolerated.
    pub async fn execute_one(&self, statement: BatchStatement) -> Result<RowSet> {
        let mut results = self.execute_atomic(vec![statement]).await?;
        let first = results.pop().ok_or(DbError::ResultContract { count: 0 })?;
        if !results.is_empty() {
            return Err(DbError::ResultContract {
                count: results.len() + 1,
            });
        }
        Ok(first)
    }

    /// Run a statement for effect only.
    pub async fn execute(&self, sql: impl Into<String>) -> Result<()> {
        self.execute_one(BatchStatement::execute(sql)).await?;
        Ok(())
    }

    /// Fetch every row of a query.
    pub async fn query(&self, sql: impl Into<String>) -> Result<Vec<PgRow>> {
        Ok(self
            .execute_one(BatchStatement::fetch_all(sql))
            .await?
            .into_rows())
    }

    /// Fetch the first row of a query, if any.
    pub async fn query_first(&self, sql: impl Into<String>) -> Result<Option<PgRow>> {
        Ok(self
            .execute_one(BatchStatement::fetch_first(sql))
            .await?
            .into_first())
    }

    /// Fetch every row of a query together with the result's column names.
    pub async fn query_with_columns(
        &self,
        sql: impl Into<String>,
    ) -> Result<(Vec<PgRow>, Vec<String>)> {
        match self
            .execute_one(BatchStatement::fetch_with_columns(sql))
            .await?
        {
            RowSet::WithColumns { rows, columns } => Ok((rows, columns)),
            other => Ok((other.into_rows(), Vec::new())),
        }
    }

    /// True if the given query returns any rows. `sql` must not end in a
    /// semicolon.
    pub async fn exists(&self, sql: &str) -> Result<bool> {
        let row = self
            .query_first(format!("SELECT EXISTS({sql})"))
            .await?
            .ok_or(DbError::ResultContract { count: 0 })?;
        row.try_get::<bool, _>(0).map_err(DbError::Decode)
    }

    /// True if `table` is present in the current schema.
    pub async fn exists_table(&self, table: &str) -> Result<bool> {
        self.exists(&format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND LOWER(table_name) = LOWER({})",
            quote_literal(table)
        ))
        .await
    }
}

async fn run_statement(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    statement: &BatchStatement,
) -> std::result::Result<RowSet, sqlx::Error> {
    match statement.fetch {
        Fetch::None => {
            sqlx::query(&statement.sql).execute(&mut **tx).await?;
            Ok(RowSet::None)
        },
        Fetch::First => Ok(RowSet::First(
            sqlx::query(&statement.sql).fetch_optional(&mut **tx).await?,
        )),
        Fetch::All => Ok(RowSet::All(
            sqlx::query(&statement.sql).fetch_all(&mut **tx).await?,
        )),
        Fetch::WithColumns => {
            // Column names come from preparing the statement, so an empty
            // result set still reports its layout.
            let prepared = (&mut **tx).prepare(&statement.sql).await?;
            let columns = prepared
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let rows = sqlx::query(&statement.sql).fetch_all(&mut **tx).await?;
            Ok(RowSet::WithColumns { rows, columns })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_constructors() {
        assert_eq!(BatchStatement::execute("SELECT 1").fetch, Fetch::None);
        assert_eq!(BatchStatement::fetch_first("SELECT 1").fetch, Fetch::First);
        assert_eq!(BatchStatement::fetch_all("SELECT 1").fetch, Fetch::All);
        assert_eq!(
            BatchStatement::fetch_with_columns("SELECT 1").fetch,
            Fetch::WithColumns
        );
    }

    #[test]
    fn test_empty_rowset_accessors() {
        assert!(RowSet::None.into_rows().is_empty());
        assert!(RowSet::First(None).into_first().is_none());
        assert!(RowSet::All(Vec::new()).into_first().is_none());
    }
}
