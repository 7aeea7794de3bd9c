//! PostgreSQL strategy.

use crate::db::catalog::CatalogColumn;
use crate::db::dialect::Dialect;
use crate::db::pool::connection_suggestion;
use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOperation, ConnectionDefinition, DatabaseMetrics, EngineFamily, Relationship, TableSize,
    TableTypeCount,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Executor, PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};

mod queries {
    pub const LIST_DATABASES: &str = r#"
        SELECT datname AS name
        FROM pg_database
        WHERE datistemplate = false AND datallowconn
        ORDER BY datname
        "#;

    pub const LIST_SCHEMAS: &str = r#"
        SELECT schema_name AS name
        FROM information_schema.schemata
        WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
        AND schema_name NOT LIKE 'pg\_toast%'
        AND schema_name NOT LIKE 'pg\_temp\_%'
        ORDER BY schema_name
        "#;

    pub const LIST_TABLES: &str = r#"
        SELECT table_name AS name
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT table_name AS name
        FROM information_schema.views
        WHERE table_schema = $1
        ORDER BY table_name
        "#;

    pub const LIST_FUNCTIONS: &str = r#"
        SELECT DISTINCT routine_name AS name
        FROM information_schema.routines
        WHERE routine_schema = $1
        ORDER BY routine_name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable,
            c.column_default,
            pk.constraint_name AS pk_name
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        LEFT JOIN (
            SELECT kcu.column_name, tc.constraint_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.table_name = $1
            AND tc.table_schema = $2
            AND tc.constraint_type = 'PRIMARY KEY'
        ) pk ON c.column_name = pk.column_name
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
        "#;

    pub const COLUMN_TYPES: &str = r#"
        SELECT a.attname AS name, format_type(a.atttypid, a.atttypmod) AS column_type
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2
        AND a.attnum > 0 AND NOT a.attisdropped
        "#;

    /// One row per column pair, so composite keys come out as several edges.
    pub const LIST_RELATIONSHIPS: &str = r#"
        SELECT
            con.conname AS constraint_name,
            sn.nspname AS source_schema,
            sc.relname AS source_table,
            sa.attname AS source_column,
            tn.nspname AS target_schema,
            tc.relname AS target_table,
            ta.attname AS target_column
        FROM pg_constraint con
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(src, tgt, ord)
        JOIN pg_class sc ON sc.oid = con.conrelid
        JOIN pg_namespace sn ON sn.oid = sc.relnamespace
        JOIN pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = k.src
        JOIN pg_class tc ON tc.oid = con.confrelid
        JOIN pg_namespace tn ON tn.oid = tc.relnamespace
        JOIN pg_attribute ta ON ta.attrelid = con.confrelid AND ta.attnum = k.tgt
        WHERE con.contype = 'f'
        AND ($1::text IS NULL OR sn.nspname = $1)
        ORDER BY sn.nspname, sc.relname, con.conname, k.ord
        "#;

    pub const TABLE_COUNT: &str = r#"
        SELECT COUNT(*) AS count
        FROM information_schema.tables
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        AND table_type = 'BASE TABLE'
        "#;

    pub const DATABASE_SIZE: &str = "SELECT pg_database_size(current_database()) AS size";

    pub const ACTIVE_CONNECTIONS: &str = r#"
        SELECT COUNT(*) AS count
        FROM pg_stat_activity
        WHERE datname = current_database()
        "#;

    pub const TOP_TABLES: &str = r#"
        SELECT
            c.relname AS name,
            n.nspname AS schema,
            pg_total_relation_size(c.oid) AS size_bytes,
            c.reltuples::bigint AS row_count
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema')
        ORDER BY size_bytes DESC
        LIMIT 5
        "#;

    pub const TABLE_TYPES: &str = r#"
        SELECT table_type, COUNT(*) AS count
        FROM information_schema.tables
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        GROUP BY table_type
        ORDER BY table_type
        "#;

    pub const TERMINATE_BACKENDS: &str = r#"
        SELECT pg_terminate_backend(pid) AS terminated
        FROM pg_stat_activity
        WHERE datname = $1 AND pid <> pg_backend_pid()
        "#;
}

// =============================================================================
// DDL
// =============================================================================

/// The clause following `ALTER TABLE <table>`.
pub(super) fn alter_clause(_quoted_table: &str, op: &AlterOperation) -> String {
    let d = Dialect::Postgres;
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
            let col = q(name);
            let mut sql = format!(
                "ALTER COLUMN {} TYPE {} USING {}::{}",
                col, data_type, col, data_type
            );
            match is_nullable {
                Some(true) => sql.push_str(&format!(", ALTER COLUMN {} DROP NOT NULL", col)),
                Some(false) => sql.push_str(&format!(", ALTER COLUMN {} SET NOT NULL", col)),
                None => {}
            }
            sql
        }
        AlterOperation::RenameColumn { name, new_name } => {
            format!("RENAME COLUMN {} TO {}", q(name), q(new_name))
        }
        AlterOperation::AddPk { name, columns } => match name {
            Some(n) => format!(
                "ADD CONSTRAINT {} PRIMARY KEY ({})",
                q(n),
                d.quote_list(columns)
            ),
            None => format!("ADD PRIMARY KEY ({})", d.quote_list(columns)),
        },
        AlterOperation::DropPk { name } | AlterOperation::DropFk { name } => {
            format!("DROP CONSTRAINT {}", q(name))
        }
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
        AlterOperation::Unknown => String::new(),
    }
}

// =============================================================================
// Pool
// =============================================================================

pub async fn create_pool(def: &ConnectionDefinition, database: Option<&str>) -> DbResult<PgPool> {
    let opts = &def.pool_options;
    // Postgres always connects to some database
    let database = database
        .or(Dialect::Postgres.maintenance_database())
        .unwrap_or_default();
    let mut connect = PgConnectOptions::new()
        .host(&def.host)
        .port(def.port_or_default())
        .database(database)
        .ssl_mode(if def.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        });
    if let Some(user) = &def.username {
        connect = connect.username(user);
    }
    if let Some(password) = &def.password {
        connect = connect.password(password);
    }

    let pool = PgPoolOptions::new()
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
                connection_suggestion(EngineFamily::Postgres, &e.to_string()),
            )
        })?;
    Ok(pool)
}

// =============================================================================
// Catalog
// =============================================================================

async fn names(pool: &PgPool, sql: &str, schema: Option<&str>) -> DbResult<Vec<String>> {
    let mut query = sqlx::query(sql);
    if let Some(s) = schema {
        query = query.bind(s);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
}

pub async fn list_databases(pool: &PgPool) -> DbResult<Vec<String>> {
    let databases = names(pool, queries::LIST_DATABASES, None).await?;
    debug!(count = databases.len(), "Listed PostgreSQL databases");
    Ok(databases)
}

pub async fn list_schemas(pool: &PgPool) -> DbResult<Vec<String>> {
    let schemas = names(pool, queries::LIST_SCHEMAS, None).await?;
    debug!(count = schemas.len(), "Listed PostgreSQL schemas");
    Ok(schemas)
}

pub async fn list_tables(pool: &PgPool, schema: &str) -> DbResult<Vec<String>> {
    let tables = names(pool, queries::LIST_TABLES, Some(schema)).await?;
    debug!(count = tables.len(), schema = schema, "Listed PostgreSQL tables");
    Ok(tables)
}

pub async fn list_views(pool: &PgPool, schema: &str) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_VIEWS, Some(schema)).await
}

pub async fn list_functions(pool: &PgPool, schema: &str) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_FUNCTIONS, Some(schema)).await
}

pub async fn list_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> DbResult<Vec<CatalogColumn>> {
    let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
        .bind(table)
        .bind(schema)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let nullable: String = row.get("is_nullable");
            CatalogColumn {
                name: row.get("column_name"),
                data_type: row.get("column_type"),
                nullable: nullable == "YES",
                default_value: row.try_get("column_default").ok().flatten(),
                pk_constraint: row.try_get("pk_name").ok().flatten(),
            }
        })
        .collect())
}

/// Declared type of every column of `schema.table`, keyed by column name.
///
/// Bound values arrive typed as `text` or `int8`; update statements cast each
/// placeholder to these types so the server converts them.
pub async fn column_types(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> DbResult<HashMap<String, String>> {
    let rows = sqlx::query(queries::COLUMN_TYPES)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("name"), row.get("column_type")))
        .collect())
}

pub async fn list_relationships(
    pool: &PgPool,
    schema: Option<&str>,
) -> DbResult<Vec<Relationship>> {
    let rows = sqlx::query(queries::LIST_RELATIONSHIPS)
        .bind(schema)
        .fetch_all(pool)
        .await?;

    let relationships = rows
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
        .collect::<Vec<_>>();
    debug!(count = relationships.len(), "Listed PostgreSQL relationships");
    Ok(relationships)
}

pub async fn database_metrics(pool: &PgPool) -> DbResult<DatabaseMetrics> {
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
            // reltuples is -1 until the table has been analyzed
            row_count: row
                .try_get::<i64, _>("row_count")
                .ok()
                .filter(|n| *n >= 0)
                .map(|n| n as u64),
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

pub async fn create_database(pool: &PgPool, name: &str) -> DbResult<()> {
    pool.execute(Dialect::Postgres.create_database_sql(name).as_str())
        .await?;
    Ok(())
}

/// Drop a database after disconnecting every other session using it.
pub async fn drop_database(pool: &PgPool, name: &str) -> DbResult<()> {
    let terminated = sqlx::query(queries::TERMINATE_BACKENDS)
        .bind(name)
        .fetch_all(pool)
        .await?
        .len();
    if terminated > 0 {
        info!(database = %name, sessions = terminated, "Terminated sessions before drop");
    }
    pool.execute(Dialect::Postgres.drop_database_sql(name).as_str())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForeignKeyAction;

    fn sql(op: AlterOperation) -> String {
        Dialect::Postgres.build_alter_table_sql("\"s\".\"t\"", &op)
    }

    #[test]
    fn test_add_column_not_null() {
        assert_eq!(
            sql(AlterOperation::AddColumn {
                name: "age".into(),
                data_type: "int".into(),
                is_nullable: false,
                default_value: None,
            }),
            "ALTER TABLE \"s\".\"t\" ADD COLUMN \"age\" int NOT NULL"
        );
    }

    #[test]
    fn test_add_column_with_default() {
        assert_eq!(
            sql(AlterOperation::AddColumn {
                name: "status".into(),
                data_type: "text".into(),
                is_nullable: true,
                default_value: Some("'new'".into()),
            }),
            "ALTER TABLE \"s\".\"t\" ADD COLUMN \"status\" text DEFAULT 'new'"
        );
    }

    #[test]
    fn test_rename_column() {
        assert_eq!(
            sql(AlterOperation::RenameColumn {
                name: "a".into(),
                new_name: "b".into(),
            }),
            "ALTER TABLE \"s\".\"t\" RENAME COLUMN \"a\" TO \"b\""
        );
    }

    #[test]
    fn test_alter_type_uses_cast() {
        assert_eq!(
            sql(AlterOperation::AlterColumnType {
                name: "n".into(),
                data_type: "bigint".into(),
                is_nullable: Some(false),
            }),
            "ALTER TABLE \"s\".\"t\" ALTER COLUMN \"n\" TYPE bigint USING \"n\"::bigint, \
             ALTER COLUMN \"n\" SET NOT NULL"
        );
    }

    #[test]
    fn test_add_fk() {
        assert_eq!(
            sql(AlterOperation::AddFk {
                name: "fk1".into(),
                columns: vec!["a".into()],
                ref_schema: None,
                ref_table: "r".into(),
                ref_columns: vec!["id".into()],
                on_delete: Some(ForeignKeyAction::Cascade),
                on_update: None,
            }),
            "ALTER TABLE \"s\".\"t\" ADD CONSTRAINT \"fk1\" FOREIGN KEY (\"a\") \
             REFERENCES \"r\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_drop_pk_by_name() {
        assert_eq!(
            sql(AlterOperation::DropPk {
                name: "t_pkey".into()
            }),
            "ALTER TABLE \"s\".\"t\" DROP CONSTRAINT \"t_pkey\""
        );
    }
}
