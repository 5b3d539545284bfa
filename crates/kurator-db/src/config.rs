//! Warehouse connection settings
//!
//! Read from the environment exactly once at process start and passed by
//! reference into everything that talks to the database. There is no global
//! connector; whoever owns a [`DbSettings`](DbSettings) decides who connects.

use sqlx::postgres::PgConnectOptions;

/// Default warehouse host for local development.
pub const DEFAULT_HOST: &str = "localhost";

/// Default Postgres port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "kurator";

/// Default database user.
pub const DEFAULT_USER: &str = "postgres";

/// Default database password for local development.
pub const DEFAULT_PASSWORD: &str = "postgres";

/// Connection parameters for the warehouse
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl DbSettings {
    /// Load settings from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_DB`,
    /// `POSTGRES_USER` and `POSTGRES_PASSWORD`, falling back to the local
    /// development defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            host: env_or("POSTGRES_HOST", DEFAULT_HOST),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            database: env_or("POSTGRES_DB", DEFAULT_DATABASE),
            user: env_or("POSTGRES_USER", DEFAULT_USER),
            password: env_or("POSTGRES_PASSWORD", DEFAULT_PASSWORD),
        }
    }

    /// Driver-level connect options for these settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
