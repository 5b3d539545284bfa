//! Kurator DB: the transactional load layer
//!
//! Extraction jobs stage header-bearing CSV extracts locally; this crate
//! merges them into the Postgres warehouse under strict consistency rules:
//!
//! - one short-lived connection per logical operation ([`Connector`])
//! - multi-statement batches that commit or roll back as a unit ([`Executor`])
//! - live catalog introspection instead of hard-coded column lists
//!   ([`SchemaInspector`])
//! - upsert-based merging keyed on the declared primary key ([`TableLoader`])
//! - a hard refusal to create or alter schemas from the load path
//!
//! Schema management is an operator-run migration concern. If a target table
//! is missing, a load fails with [`DbError::UndefinedTable`] rather than
//! creating it.
//!
//! # Example
//!
//! ```no_run
//! use kurator_db::{Connector, DbSettings, TableLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = DbSettings::from_env();
//!     let connector = Connector::new(&settings);
//!     let loader = TableLoader::new(&connector, "appstore_review", &["id"])?;
//!     let report = loader.load(std::fs::File::open("reviews.csv")?).await?;
//!     println!("loaded {} rows into {}", report.rows, report.table);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod loader;
pub mod schema;
mod sql;

pub use config::DbSettings;
pub use connection::Connector;
pub use dataset::Dataset;
pub use error::{DbError, Result};
pub use executor::{BatchStatement, Executor, Fetch, RowSet};
pub use loader::{LoadReport, TableLoader};
pub use schema::{SchemaInspector, TableColumn};
