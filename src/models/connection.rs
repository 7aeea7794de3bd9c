//! Connection-related data models.

use crate::config::PoolOptions;
use crate::error::DbError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    Postgres,
    /// Includes MariaDB
    MySql,
    /// Microsoft SQL Server and Azure SQL
    MsSql,
}

impl EngineFamily {
    /// Map a URL scheme onto an engine family.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "mssql" | "sqlserver" => Some(Self::MsSql),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::MsSql => "SQL Server",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MySql => 3306,
            Self::MsSql => 1433,
        }
    }
}

impl std::fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EngineFamily {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_scheme(s).ok_or_else(|| DbError::unsupported_dialect(s))
    }
}

/// Everything needed to open pools against one server.
///
/// Definitions are immutable once registered; replacing one through the
/// registry tears down every pool built from the previous version.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub id: String,
    pub engine: EngineFamily,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    /// Never serialized or logged
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Default database; None connects at server level
    #[serde(default)]
    pub database: Option<String>,
    /// List every database at the root of the hierarchy instead of the
    /// schemas of the default database
    #[serde(default)]
    pub show_all_databases: bool,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub trust_server_certificate: bool,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl ConnectionDefinition {
    /// Create a definition with the given identity and host.
    pub fn new(
        id: impl Into<String>,
        engine: EngineFamily,
        host: impl Into<String>,
    ) -> Result<Self, ConnectionDefinitionError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConnectionDefinitionError::EmptyId);
        }
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConnectionDefinitionError::InvalidId(id));
        }
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConnectionDefinitionError::EmptyHost);
        }

        Ok(Self {
            id,
            engine,
            host,
            port: None,
            username: None,
            password: None,
            database: None,
            show_all_databases: false,
            ssl: false,
            trust_server_certificate: false,
            pool_options: PoolOptions::default(),
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_show_all_databases(mut self, show_all: bool) -> Self {
        self.show_all_databases = show_all;
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn with_trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }

    pub fn with_pool_options(mut self, pool_options: PoolOptions) -> Self {
        self.pool_options = pool_options;
        self
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    /// Database a pool should target: the override if given, otherwise the default.
    pub fn effective_database<'a>(&'a self, database_override: Option<&'a str>) -> Option<&'a str> {
        database_override.or(self.database.as_deref())
    }

    /// Display-safe location string with the password masked.
    pub fn masked_location(&self) -> String {
        let scheme = match self.engine {
            EngineFamily::Postgres => "postgres",
            EngineFamily::MySql => "mysql",
            EngineFamily::MsSql => "mssql",
        };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{}:****@", user),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme,
            auth,
            self.host,
            self.port_or_default(),
            self.database.as_deref().unwrap_or("")
        )
    }
}

impl std::fmt::Debug for ConnectionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDefinition")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("location", &self.masked_location())
            .field("show_all_databases", &self.show_all_databases)
            .field("ssl", &self.ssl)
            .field("pool_options", &self.pool_options)
            .finish()
    }
}

/// Errors that can occur when creating a connection definition.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionDefinitionError {
    #[error("Connection ID cannot be empty")]
    EmptyId,

    #[error("Connection ID contains invalid characters: {0}")]
    InvalidId(String),

    #[error("Connection host cannot be empty")]
    EmptyHost,
}

/// Summary returned when listing registered connections (no secrets).
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: String,
    pub engine: EngineFamily,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub show_all_databases: bool,
}

impl From<&ConnectionDefinition> for ConnectionSummary {
    fn from(def: &ConnectionDefinition) -> Self {
        Self {
            id: def.id.clone(),
            engine: def.engine,
            host: def.host.clone(),
            port: def.port_or_default(),
            database: def.database.clone(),
            show_all_databases: def.show_all_databases,
        }
    }
}
