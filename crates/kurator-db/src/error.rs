//! Error types for the load layer
//!
//! Every failure is local to one operation and nothing here retries;
//! recovery (re-running an extraction, fixing schema via migration) is an
//! operator action.

use thiserror::Error;

/// Result type alias for load-layer operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Load-layer error kinds
#[derive(Error, Debug)]
pub enum DbError {
    /// The warehouse could not be reached or refused the session.
    #[error("could not connect to {host}:{port}/{database}: {source}")]
    Connection {
        host: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// The target table is absent from the catalog.
    #[error("table '{0}' does not exist; apply the pending migrations before loading into it")]
    UndefinedTable(String),

    /// A row does not fit the live column layout. The whole batch was
    /// rejected; nothing was written.
    #[error("malformed row, batch rejected: {0}")]
    MalformedRow(String),

    /// Schema creation or alteration was requested through the load path.
    #[error(
        "refusing to {action} table '{table}': the load layer never changes schemas, \
         run an explicit migration instead"
    )]
    SchemaMutationForbidden { action: &'static str, table: String },

    /// A statement of an atomic batch failed; the whole batch was rolled back.
    #[error("atomic batch rolled back, statement {index} failed: {source}")]
    Transaction {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    /// A single-statement call produced something other than one result,
    /// which means the statement/interpreter pairing is wrong in the caller.
    #[error("single-statement execution produced {count} results; the result interpreter is mis-specified")]
    ResultContract { count: usize },

    /// A destination was declared without any key columns.
    #[error("primary key for table '{0}' must name at least one column")]
    EmptyPrimaryKey(String),

    /// A result column could not be read as the requested Rust type.
    #[error("could not decode query result: {0}")]
    Decode(#[source] sqlx::Error),

    /// The CSV input could not be read.
    #[error("unreadable extract: {0}")]
    Csv(#[from] csv::Error),
}

impl DbError {
    pub(crate) fn transaction(index: usize, source: sqlx::Error) -> Self {
        Self::Transaction { index, source }
    }
}
