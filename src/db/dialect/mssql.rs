//! SQL Server strategy, driven through tiberius behind a bb8 pool.
//!
//! tiberius is strict about integer widths, so every count and size in the
//! catalog queries is cast to `bigint` and read back as `i64`.

use crate::db::catalog::CatalogColumn;
use crate::db::dialect::Dialect;
use crate::db::pool::{MssqlPool, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOperation, ConnectionDefinition, DatabaseMetrics, EngineFamily, ForeignKeyAction,
    Relationship, TableSize, TableTypeCount,
};
use tiberius::{AuthMethod, Config, EncryptionLevel, Query, Row};
use tracing::debug;

mod queries {
    pub const LIST_DATABASES: &str = r#"
        SELECT name
        FROM sys.databases
        WHERE state_desc = 'ONLINE'
        ORDER BY name
        "#;

    /// User schemas only; fixed database roles live above 16384.
    pub const LIST_SCHEMAS: &str = r#"
        SELECT name
        FROM sys.schemas
        WHERE schema_id < 16384
        AND name NOT IN ('sys', 'INFORMATION_SCHEMA', 'guest')
        ORDER BY name
        "#;

    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_NAME AS name
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT TABLE_NAME AS name
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = 'VIEW'
        ORDER BY TABLE_NAME
        "#;

    pub const LIST_FUNCTIONS: &str = r#"
        SELECT DISTINCT ROUTINE_NAME AS name
        FROM INFORMATION_SCHEMA.ROUTINES
        WHERE ROUTINE_SCHEMA = @P1
        ORDER BY ROUTINE_NAME
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.COLUMN_NAME AS column_name,
            CAST(CASE
                WHEN c.CHARACTER_MAXIMUM_LENGTH = -1
                    THEN c.DATA_TYPE + '(max)'
                WHEN c.CHARACTER_MAXIMUM_LENGTH IS NOT NULL
                    THEN c.DATA_TYPE + '(' + CAST(c.CHARACTER_MAXIMUM_LENGTH AS nvarchar(10)) + ')'
                WHEN c.DATA_TYPE IN ('decimal', 'numeric')
                    THEN c.DATA_TYPE + '(' + CAST(c.NUMERIC_PRECISION AS nvarchar(10)) + ','
                        + CAST(c.NUMERIC_SCALE AS nvarchar(10)) + ')'
                ELSE c.DATA_TYPE
            END AS nvarchar(256)) AS column_type,
            c.IS_NULLABLE AS is_nullable,
            c.COLUMN_DEFAULT AS column_default,
            pk.CONSTRAINT_NAME AS pk_name
        FROM INFORMATION_SCHEMA.COLUMNS c
        LEFT JOIN (
            SELECT kcu.COLUMN_NAME, tc.CONSTRAINT_NAME
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = @P1
            AND tc.TABLE_NAME = @P2
            AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        ) pk ON c.COLUMN_NAME = pk.COLUMN_NAME
        WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
        ORDER BY c.ORDINAL_POSITION
        "#;

    pub const LIST_RELATIONSHIPS: &str = r#"
        SELECT
            fk.name AS constraint_name,
            ss.name AS source_schema,
            st.name AS source_table,
            sc.name AS source_column,
            ts.name AS target_schema,
            tt.name AS target_table,
            tc.name AS target_column
        FROM sys.foreign_key_columns fkc
        JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
        JOIN sys.tables st ON st.object_id = fkc.parent_object_id
        JOIN sys.schemas ss ON ss.schema_id = st.schema_id
        JOIN sys.columns sc
            ON sc.object_id = fkc.parent_object_id AND sc.column_id = fkc.parent_column_id
        JOIN sys.tables tt ON tt.object_id = fkc.referenced_object_id
        JOIN sys.schemas ts ON ts.schema_id = tt.schema_id
        JOIN sys.columns tc
            ON tc.object_id = fkc.referenced_object_id AND tc.column_id = fkc.referenced_column_id
        WHERE (@P1 IS NULL OR ss.name = @P1)
        ORDER BY ss.name, st.name, fk.name, fkc.constraint_column_id
        "#;

    pub const TABLE_COUNT: &str = r#"
        SELECT CAST(COUNT(*) AS bigint) AS count
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_TYPE = 'BASE TABLE'
        "#;

    /// File sizes are in 8 KB pages.
    pub const DATABASE_SIZE: &str = r#"
        SELECT CAST(COALESCE(SUM(CAST(size AS bigint)), 0) * 8192 AS bigint) AS size
        FROM sys.database_files
        "#;

    pub const ACTIVE_CONNECTIONS: &str = r#"
        SELECT CAST(COUNT(*) AS bigint) AS count
        FROM sys.dm_exec_sessions
        WHERE database_id = DB_ID() AND is_user_process = 1
        "#;

    pub const TOP_TABLES: &str = r#"
        SELECT TOP 5
            t.name AS name,
            s.name AS [schema],
            CAST(SUM(ps.used_page_count) * 8192 AS bigint) AS size_bytes,
            CAST(SUM(CASE WHEN ps.index_id IN (0, 1) THEN ps.row_count ELSE 0 END) AS bigint)
                AS row_count
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        JOIN sys.dm_db_partition_stats ps ON ps.object_id = t.object_id
        GROUP BY t.name, s.name
        ORDER BY size_bytes DESC
        "#;

    pub const TABLE_TYPES: &str = r#"
        SELECT TABLE_TYPE AS table_type, CAST(COUNT(*) AS bigint) AS count
        FROM INFORMATION_SCHEMA.TABLES
        GROUP BY TABLE_TYPE
        ORDER BY TABLE_TYPE
        "#;
}

// =============================================================================
// DDL
// =============================================================================

/// SQL Server has no RESTRICT; NO ACTION is the equivalent.
fn fk_action(action: &ForeignKeyAction) -> &'static str {
    match action {
        ForeignKeyAction::Restrict => ForeignKeyAction::NoAction.as_sql(),
        other => other.as_sql(),
    }
}

fn nullability(is_nullable: bool) -> &'static str {
    if is_nullable { "NULL" } else { "NOT NULL" }
}

fn string_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// The clause following `ALTER TABLE <table>`, or a complete `sp_rename`
/// call for column renames.
pub(super) fn alter_clause(quoted_table: &str, op: &AlterOperation) -> String {
    let d = Dialect::MsSql;
    let q = |name: &str| d.quote_identifier(name);

    match op {
        AlterOperation::AddColumn {
            name,
            data_type,
            is_nullable,
            default_value,
        } => {
            let mut sql = format!("ADD {} {} {}", q(name), data_type, nullability(*is_nullable));
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
            let mut sql = format!("ALTER COLUMN {} {}", q(name), data_type);
            if let Some(nullable) = is_nullable {
                sql.push(' ');
                sql.push_str(nullability(*nullable));
            }
            sql
        }
        AlterOperation::RenameColumn { name, new_name } => format!(
            "EXEC sp_rename {}, {}, N'COLUMN'",
            string_literal(&format!("{}.{}", quoted_table, q(name))),
            string_literal(new_name)
        ),
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
                sql.push_str(&format!(" ON DELETE {}", fk_action(action)));
            }
            if let Some(action) = on_update {
                sql.push_str(&format!(" ON UPDATE {}", fk_action(action)));
            }
            sql
        }
        AlterOperation::Unknown => String::new(),
    }
}

// =============================================================================
// Pool
// =============================================================================

fn build_config(def: &ConnectionDefinition, database: Option<&str>) -> Config {
    let mut config = Config::new();
    config.host(&def.host);
    config.port(def.port_or_default());
    config.authentication(AuthMethod::sql_server(
        def.username.as_deref().unwrap_or_default(),
        def.password.as_deref().unwrap_or_default(),
    ));
    if let Some(db) = database {
        config.database(db);
    }
    config.encryption(if def.ssl {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::NotSupported
    });
    if def.trust_server_certificate {
        config.trust_cert();
    }
    config
}

pub async fn create_pool(
    def: &ConnectionDefinition,
    database: Option<&str>,
) -> DbResult<MssqlPool> {
    let opts = &def.pool_options;
    let manager = bb8_tiberius::ConnectionManager::new(build_config(def, database));

    bb8::Pool::builder()
        .max_size(opts.max_connections_or_default())
        .min_idle(Some(opts.min_connections_or_default()))
        .connection_timeout(opts.acquire_timeout())
        .idle_timeout(Some(opts.idle_timeout()))
        .test_on_check_out(opts.test_before_acquire_or_default())
        .build(manager)
        .await
        .map_err(|e| {
            DbError::connection(
                format!("Failed to connect: {}", e),
                connection_suggestion(EngineFamily::MsSql, &e.to_string()),
            )
        })
}

// =============================================================================
// Catalog
// =============================================================================

async fn fetch_rows(pool: &MssqlPool, sql: &str, binds: &[Option<&str>]) -> DbResult<Vec<Row>> {
    let mut conn = pool.get().await?;
    let mut query = Query::new(sql);
    for value in binds {
        query.bind(*value);
    }
    let rows = query.query(&mut *conn).await?.into_first_result().await?;
    Ok(rows)
}

async fn fetch_i64(pool: &MssqlPool, sql: &str, column: &str) -> DbResult<i64> {
    let rows = fetch_rows(pool, sql, &[]).await?;
    Ok(match rows.first() {
        Some(row) => row.try_get::<i64, _>(column)?.unwrap_or(0),
        None => 0,
    })
}

fn text(row: &Row, column: &str) -> DbResult<Option<String>> {
    Ok(row.try_get::<&str, _>(column)?.map(String::from))
}

fn required_text(row: &Row, column: &str) -> DbResult<String> {
    text(row, column)?
        .ok_or_else(|| DbError::internal(format!("Unexpected NULL in catalog column {}", column)))
}

async fn names(pool: &MssqlPool, sql: &str, binds: &[Option<&str>]) -> DbResult<Vec<String>> {
    fetch_rows(pool, sql, binds)
        .await?
        .iter()
        .map(|row| required_text(row, "name"))
        .collect()
}

pub async fn list_databases(pool: &MssqlPool) -> DbResult<Vec<String>> {
    let databases = names(pool, queries::LIST_DATABASES, &[]).await?;
    debug!(count = databases.len(), "Listed SQL Server databases");
    Ok(databases)
}

pub async fn list_schemas(pool: &MssqlPool) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_SCHEMAS, &[]).await
}

pub async fn list_tables(pool: &MssqlPool, schema: &str) -> DbResult<Vec<String>> {
    let tables = names(pool, queries::LIST_TABLES, &[Some(schema)]).await?;
    debug!(count = tables.len(), schema = schema, "Listed SQL Server tables");
    Ok(tables)
}

pub async fn list_views(pool: &MssqlPool, schema: &str) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_VIEWS, &[Some(schema)]).await
}

pub async fn list_functions(pool: &MssqlPool, schema: &str) -> DbResult<Vec<String>> {
    names(pool, queries::LIST_FUNCTIONS, &[Some(schema)]).await
}

pub async fn list_columns(
    pool: &MssqlPool,
    schema: &str,
    table: &str,
) -> DbResult<Vec<CatalogColumn>> {
    let rows = fetch_rows(pool, queries::DESCRIBE_COLUMNS, &[Some(schema), Some(table)]).await?;
    rows.iter()
        .map(|row| {
            Ok(CatalogColumn {
                name: required_text(row, "column_name")?,
                data_type: required_text(row, "column_type")?,
                nullable: text(row, "is_nullable")?.as_deref() == Some("YES"),
                default_value: text(row, "column_default")?,
                pk_constraint: text(row, "pk_name")?,
            })
        })
        .collect()
}

pub async fn list_relationships(
    pool: &MssqlPool,
    schema: Option<&str>,
) -> DbResult<Vec<Relationship>> {
    let rows = fetch_rows(pool, queries::LIST_RELATIONSHIPS, &[schema]).await?;
    rows.iter()
        .map(|row| {
            Ok(Relationship {
                constraint_name: required_text(row, "constraint_name")?,
                source_schema: text(row, "source_schema")?,
                source_table: required_text(row, "source_table")?,
                source_column: required_text(row, "source_column")?,
                target_schema: text(row, "target_schema")?,
                target_table: required_text(row, "target_table")?,
                target_column: required_text(row, "target_column")?,
            })
        })
        .collect()
}

pub async fn database_metrics(pool: &MssqlPool) -> DbResult<DatabaseMetrics> {
    let table_count = fetch_i64(pool, queries::TABLE_COUNT, "count").await?;
    let size = fetch_i64(pool, queries::DATABASE_SIZE, "size").await?;
    let active = fetch_i64(pool, queries::ACTIVE_CONNECTIONS, "count").await?;

    let top_tables = fetch_rows(pool, queries::TOP_TABLES, &[])
        .await?
        .iter()
        .map(|row| {
            Ok(TableSize {
                name: required_text(row, "name")?,
                schema: text(row, "schema")?,
                size_bytes: row.try_get::<i64, _>("size_bytes")?.unwrap_or(0).max(0) as u64,
                row_count: row
                    .try_get::<i64, _>("row_count")?
                    .map(|n| n.max(0) as u64),
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    let table_types = fetch_rows(pool, queries::TABLE_TYPES, &[])
        .await?
        .iter()
        .map(|row| {
            Ok(TableTypeCount {
                table_type: required_text(row, "table_type")?,
                count: row.try_get::<i64, _>("count")?.unwrap_or(0) as u64,
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    Ok(DatabaseMetrics {
        table_count: table_count as u64,
        size_bytes: size.max(0) as u64,
        active_connections: active as u64,
        top_tables,
        table_types,
    })
}

async fn execute_batch(pool: &MssqlPool, sql: &str) -> DbResult<()> {
    let mut conn = pool.get().await?;
    conn.simple_query(sql).await?.into_results().await?;
    Ok(())
}

pub async fn create_database(pool: &MssqlPool, name: &str) -> DbResult<()> {
    execute_batch(pool, &Dialect::MsSql.create_database_sql(name)).await
}

pub async fn drop_database(pool: &MssqlPool, name: &str) -> DbResult<()> {
    execute_batch(pool, &Dialect::MsSql.drop_database_sql(name)).await
}
