//! Short-lived warehouse connections
//!
//! One connection per logical operation: opened, used, closed. Nothing at
//! this layer pools, retries, shares sessions between loads, or applies
//! timeouts; a caller that needs a deadline wraps the operation itself.

use crate::config::DbSettings;
use crate::error::{DbError, Result};
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions as _, Connection as _};
use tracing::{debug, warn};

/// Opens one connection per operation and guarantees it is released.
#[derive(Debug)]
pub struct Connector {
    options: PgConnectOptions,
    host: String,
    port: u16,
    database: String,
}

impl Connector {
    pub fn new(settings: &DbSettings) -> Self {
        Self {
            options: settings.connect_options(),
            host: settings.host.clone(),
            port: settings.port,
            database: settings.database.clone(),
        }
    }

    /// Build a connector from prepared driver options, e.g. for an ephemeral
    /// test database.
    pub fn from_options(options: PgConnectOptions) -> Self {
        let host = options.get_host().to_string();
        let port = options.get_port();
        let database = options.get_database().unwrap_or_default().to_string();
        Self {
            options,
            host,
            port,
            database,
        }
    }

    /// Open one connection, hand it to `work`, and close it again on every
    /// exit path, including when `work` fails. Each call pays the full
    /// connection setup cost; that is the price of holding no state between
    /// operations.
    pub async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.open().await?;
        let result = work(&mut conn).await;
        if let Err(error) = conn.close().await {
            warn!(%error, "warehouse connection did not close cleanly");
        }
        result
    }

    async fn open(&self) -> Result<PgConnection> {
        debug!(host = %self.host, database = %self.database, "opening warehouse connection");
        self.options
            .connect()
            .await
            .map_err(|source| DbError::Connection {
                host: self.host.clone(),
                port: self.port,
                database: self.database.clone(),
                source,
            })
    }
}
