//! Connection options.
//!
//! [`ConnectionConfig`] holds what the caller supplied. Resolving it fills the
//! gaps from the process environment and built-in defaults and yields the
//! immutable [`ConnectionParams`] a connection is opened with.

use crate::error::{Error, Result};

/// Default host when neither config nor `PGHOST` gives one.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port when neither config nor `PGPORT` gives one.
pub const DEFAULT_PORT: u16 = 5432;

/// Application name reported to the server by default.
pub const DEFAULT_APPLICATION_NAME: &str = "lite_postgres";

/// Caller-supplied connection options. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Hostname, IP address, or a directory holding the server's Unix socket
    /// (any value starting with `/`).
    ///
    /// Fallback: `PGHOST`, then `127.0.0.1`
    pub host: Option<String>,

    /// Port number for the PostgreSQL server.
    ///
    /// Fallback: `PGPORT`, then `5432`
    pub port: Option<u16>,

    /// Database name. Required.
    ///
    /// Fallback: `PGDATABASE`
    pub database: Option<String>,

    /// Username for authentication. Required.
    ///
    /// Fallback: `PGUSER`
    pub user: Option<String>,

    /// Password for authentication.
    ///
    /// Fallback: `PGPASSWORD`
    pub password: Option<String>,

    /// Application name to report to the server.
    ///
    /// Fallback: `PGAPPNAME`, then `lite_postgres`
    pub application_name: Option<String>,

    /// SQL run once on every new connection before it is handed out.
    ///
    /// Default: `None`
    pub init_sql: Option<String>,
}

/// Fully resolved connection identity.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub application_name: String,
    pub init_sql: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("application_name", &self.application_name)
            .field("init_sql", &self.init_sql)
            .finish()
    }
}

impl ConnectionParams {
    /// Resolve `config` against the process environment.
    pub fn resolve(config: &ConnectionConfig) -> Result<Self> {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    /// Resolve `config` with an explicit environment lookup.
    ///
    /// Precedence is explicit config, then `env`, then defaults. Missing
    /// `database` or `user` fails with [`Error::Config`] naming exactly the
    /// missing fields.
    pub fn resolve_with<F>(config: &ConnectionConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset, explicit or not
        let lookup = |explicit: &Option<String>, var: &str| {
            explicit
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| env(var).filter(|v| !v.is_empty()))
        };

        let database = lookup(&config.database, "PGDATABASE");
        let user = lookup(&config.user, "PGUSER");

        let (database, user) = match (database, user) {
            (Some(database), Some(user)) => (database, user),
            (database, user) => {
                let mut missing = Vec::new();
                if database.is_none() {
                    missing.push("database");
                }
                if user.is_none() {
                    missing.push("user");
                }
                return Err(Error::Config { missing });
            }
        };

        let port = match config.port {
            Some(port) => port,
            None => match env("PGPORT").filter(|v| !v.is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|e| Error::InvalidConfig(format!("PGPORT {raw:?}: {e}")))?,
                None => DEFAULT_PORT,
            },
        };

        Ok(Self {
            host: lookup(&config.host, "PGHOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database,
            user,
            password: lookup(&config.password, "PGPASSWORD"),
            application_name: lookup(&config.application_name, "PGAPPNAME")
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
            init_sql: config.init_sql.clone(),
        })
    }

    /// Path of the server's Unix socket when `host` names a directory.
    pub fn unix_socket_path(&self) -> Option<String> {
        self.host
            .starts_with('/')
            .then(|| format!("{}/.s.PGSQL.{}", self.host.trim_end_matches('/'), self.port))
    }
}

impl TryFrom<&ConnectionConfig> for ConnectionParams {
    type Error = Error;

    fn try_from(config: &ConnectionConfig) -> Result<Self> {
        Self::resolve(config)
    }
}
