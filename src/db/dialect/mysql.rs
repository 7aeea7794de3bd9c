//! MySQL / MariaDB strategy.
//!
//! MySQL has no schema level: a "database" is what other engines call a
//! schema. Catalog queries take the database name where Postgres takes a
//! schema, and fall back to `DATABASE()` when none is given.

use crate::db::catalog::CatalogColumn;
use crate::db::dialect::Dialect;
use crate::db::pool::connection_suggestion;
use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOperation, ConnectionDefinition, DatabaseMetrics, EngineFamily, Relationship, TableSize,
    TableTypeCount,
};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::{Executor, MySqlPool, Row};
use tracing::debug;

/// Value of `COLUMN_KEY` for primary key columns; MySQL always names the constraint PRIMARY.
const PRIMARY_KEY_NAME: &str = "PRIMARY";

mod queries {
    pub const LIST_DATABASES: &str = "SHOW DATABASES";

    pub const LIST_TABLES: &str = r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_TYPE = 'VIEW'
        ORDER BY TABLE_NAME
        "#;

    pub const LIST_FUNCTIONS: &str = r#"
        SELECT DISTINCT CAST(ROUTINE_NAME AS CHAR) AS name
        FROM information_schema.ROUTINES
        WHERE ROUTINE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(COLUMN_TYPE AS CHAR) AS column_type,
            CAST(IS_NULLABLE AS CHAR) AS is_nullable,
            CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
            CAST(COLUMN_KEY AS CHAR) AS column_key
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#;

    pub const LIST_RELATIONSHIPS: &str = r#"
        SELECT
            CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
            CAST(TABLE_SCHEMA AS CHAR) AS source_schema,
            CAST(TABLE_NAME AS CHAR) AS source_table,
            CAST(COLUMN_NAME AS CHAR) AS source_column,
            CAST(REFERENCED_TABLE_SCHEMA AS CHAR) AS target_schema,
            CAST(REFERENCED_TABLE_NAME AS CHAR) AS target_table,
            CAST(REFERENCED_COLUMN_NAME AS CHAR) AS target_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

    pub const TABLE_COUNT: &str = r#"
        SELECT COUNT(*) AS count
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        "#;

    pub const DATABASE_SIZE: &str = r#"
        SELECT CAST(COALESCE(SUM(DATA_LENGTH + INDEX_LENGTH), 0) AS SIGNED) AS size
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        "#;

    pub const ACTIVE_CONNECTIONS: &str = r#"
        SELECT COUNT(*) AS count
        FROM information_schema.PROCESSLIST
        WHERE DB = DATABASE()
        "#;

    pub const TOP_TABLES: &str = r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) AS name,
            CAST(TABLE_SCHEMA AS CHAR) AS `schema`,
            CAST(COALESCE(DATA_LENGTH + INDEX_LENGTH, 0) AS SIGNED) AS size_bytes,
            CAST(TABLE_ROWS AS SIGNED) AS row_count
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY size_bytes DESC
        LIMIT 5
        "#;

    pub const TABLE_TYPES: &str = r#"
        SELECT CAST(TABLE_TYPE AS CHAR) AS table_type, COUNT(*) AS count
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        GROUP BY TABLE_TYPE
        ORDER BY TABLE_TYPE
        "#;
}

// =============================================================================
// DDL
// =============================================================================

/// The clause following `ALTER TABLE <table>`.
pub(super) fn alter_clause(op: &AlterOperation) -> String {
    let d = Dialect::MySql;
    let q = |name: &str| d.quote_identifier(name);

    match op {
        AlterOperation::AddColumn {
            name,
            data_type,
            is_nullable,
            default_value,
        } => {
            let mut sql = format!("ADD COLUMN {} {}", q(name), data_type);
            if !is_nullable {
                sql.push_str(" NOT NULL");
            }
            if let Some(default) = default_value {
                sql.push_str(&format!(" DEFAULT {}", default));
            }
            sql
        }
        AlterOperation::DropColumn { name } => format!("DROP COLUMN {}", q(name)),
        AlterOperation::AlterColumnType {
            name,
            data_type,
            is_nullable,
        } => {
            let mut sql = format!("MODIFY COLUMN {} {}", q(name), data_type);
            match is_nullable {
                Some(true) => sql.push_str(" NULL"),
                Some(false) => sql.push_str(" NOT NULL"),
                None => {}
            }
            sql
        }
        AlterOperation::RenameColumn { name, new_name } => {
            format!("RENAME COLUMN {} TO {}", q(name), q(new_name))
        }
        // MySQL ignores primary key constraint names
        AlterOperation::AddPk { columns, .. } => {
            format!("ADD PRIMARY KEY ({})", d.quote_list(columns))
        }
        AlterOperation::DropPk { .. } => "DROP PRIMARY KEY".to_string(),
        AlterOperation::AddFk {
            name,
            columns,
            ref_schema,
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } => {
            let mut sql = format!(
                "ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                q(name),
                d.quote_list(columns),
                d.quote_table(ref_schema.as_deref(), ref_table),
                d.quote_list(ref_columns)
            );
            if let Some(action) = on_delete {
                sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
            }
            if let Some(action) = on_update {
                sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
            }
            sql
        }
        AlterOperation::DropFk { name } => format!("DROP FOREIGN KEY {}", q(name)),
        AlterOperation::Unknown => String::new(),
    }
}

// =============================================================================
// Pool
// =============================================================================

pub async fn create_pool(
    def: &ConnectionDefinition,
    database: Option<&str>,
) -> DbResult<MySqlPool> {
    let opts = &def.pool_options;
    let mut connect = MySqlConnectOptions::new()
        .host(&def.host)
        .port(def.port_or_default())
        .charset("utf8mb4")
        .ssl_mode(if def.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        });
    if let Some(db) = database {
        connect = connect.database(db);
    }
    if let Some(user) = &def.username {
        connect = connect.username(user);
    }
    if let Some(password) = &def.password {
        connect = connect.password(password);
    }

    let pool = MySqlPoolOptions::new()
        .min_connections(opts.min_connections_or_default())
        .max_connections(opts.max_connections_or_default())
        .acquire_timeout(opts.acquire_timeout())
        .idle_timeout(Some(opts.idle_timeout()))
        .test_before_acquire(opts.test_before_acquire_or_default())
        .connect_with(connect)
        .await
        .map_err(|e| {
            DbError::connection(
                format!("Failed to connect: {}", e),
                connection_suggestion(EngineFamily::MySql, &e.to_string()),
            )
        })?;
    Ok(pool)
}

// =============================================================================
// Catalog
// =============================================================================

pub async fn list_databases(pool: &MySqlPool) -> DbResult<Vec<String>> {
    let rows = sqlx::query(queries::LIST_DATABASES).fetch_all(pool).await?;
    // SHOW DATABASES comes back as VARBINARY on some servers
    let databases: Vec<String> = rows
        .iter()
        .filter_map(|row| {
            row.try_get::<String, _>(0)
                .or_else(|_| {
                    row.try_get::<Vec<u8>, _>(0)
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                })
                .ok()
        })
        .collect();
    debug!(count = databases.len(), "Listed MySQL databases");
    Ok(databases)
}

async fn names(pool: &MySqlPool, sql: &str, database: Option<&str>) -> DbResult<Vec<String>> {
    let rows = sqlx::query(sql).bind(database).fetch_all(pool).await?;
    Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
}

pub async fn list_tables(pool: &MySqlPool, database: Option<&str>) -> DbResult<Vec<String>> {
    let tables = names(pool, queries::LIST_TABLES, database).await?;
    debug!(count = tables.len(), database = ?database, "Listed MySQL tables");
    Ok(tables)
}

pub async fn list_views(pool: &MySqlPool, database: Option<&str>) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_VIEWS, database).await
}

pub async fn list_functions(pool: &MySqlPool, database: Option<&str>) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_FUNCTIONS, database).await
}

pub async fn list_columns(
    pool: &MySqlPool,
    database: Option<&str>,
    table: &str,
) -> DbResult<Vec<CatalogColumn>> {
    let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
        .bind(database)
        .bind(table)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let nullable: String = row.get("is_nullable");
            let key: Option<String> = row.try_get("column_key").ok().flatten();
            CatalogColumn {
                name: row.get("column_name"),
                data_type: row.get("column_type"),
                nullable: nullable == "YES",
                default_value: row.try_get("column_default").ok().flatten(),
                pk_constraint: (key.as_deref() == Some("PRI"))
                    .then(|| PRIMARY_KEY_NAME.to_string()),
            }
        })
        .collect())
}

pub async fn list_relationships(
    pool: &MySqlPool,
    database: Option<&str>,
) -> DbResult<Vec<Relationship>> {
    let rows = sqlx::query(queries::LIST_RELATIONSHIPS)
        .bind(database)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Relationship {
            constraint_name: row.get("constraint_name"),
            source_schema: row.try_get("source_schema").ok(),
            source_table: row.get("source_table"),
            source_column: row.get("source_column"),
            target_schema: row.try_get("target_schema").ok(),
            target_table: row.get("target_table"),
            target_column: row.get("target_column"),
        })
        .collect())
}

pub async fn database_metrics(pool: &MySqlPool) -> DbResult<DatabaseMetrics> {
    let table_count: i64 = sqlx::query_scalar(queries::TABLE_COUNT)
        .fetch_one(pool)
        .await?;
    let size: i64 = sqlx::query_scalar(queries::DATABASE_SIZE)
        .fetch_one(pool)
        .await?;
    let active: i64 = sqlx::query_scalar(queries::ACTIVE_CONNECTIONS)
        .fetch_one(pool)
        .await?;

    let top_tables = sqlx::query(queries::TOP_TABLES)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| TableSize {
            name: row.get("name"),
            schema: row.try_get("schema").ok(),
            size_bytes: row.try_get::<i64, _>("size_bytes").unwrap_or(0).max(0) as u64,
            row_count: row
                .try_get::<Option<i64>, _>("row_count")
                .ok()
                .flatten()
                .map(|n| n.max(0) as u64),
        })
        .collect();

    let table_types = sqlx::query(queries::TABLE_TYPES)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| TableTypeCount {
            table_type: row.get("table_type"),
            count: row.get::<i64, _>("count") as u64,
        })
        .collect();

    Ok(DatabaseMetrics {
        table_count: table_count as u64,
        size_bytes: size.max(0) as u64,
        active_connections: active as u64,
        top_tables,
        table_types,
    })
}

pub async fn create_database(pool: &MySqlPool, name: &str) -> DbResult<()> {
    pool.execute(Dialect::MySql.create_database_sql(name).as_str())
        .await?;
    Ok(())
}

pub async fn drop_database(pool: &MySqlPool, name: &str) -> DbResult<()> {
    pool.execute(Dialect::MySql.drop_database_sql(name).as_str())
        .await?;
    Ok(())
}
