//! sqlbridge command line entry point.
//!
//! Registers the connections given with `--database`, runs one subcommand and
//! prints its result to stdout. Logs go to stderr.

use clap::Parser;
use serde::Serialize;
use sqlbridge::config::{Command, Config, OutputFormat};
use sqlbridge::db::PoolRegistry;
use sqlbridge::error::DbError;
use sqlbridge::handlers::{
    AdminHandler, MetadataHandler, QueryHandler, RowUpdateHandler, SchemaChangeHandler,
};
use sqlbridge::models::{AlterOperation, RowUpdate};
use sqlbridge::{QueryExecutor, output};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_payload<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::invalid_input(format!("Invalid {what}: {e}")))
}

async fn run(
    config: &Config,
    registry: Arc<PoolRegistry>,
) -> Result<(), Box<dyn std::error::Error>> {
    let executor = QueryExecutor::new(config.query_timeout_duration());

    match &config.command {
        Command::Tree { connection, parent } => {
            let handler = MetadataHandler::new(registry);
            print_json(&handler.get_hierarchy(connection, parent.as_deref()).await?)
        }
        Command::Columns { connection, node } => {
            let handler = MetadataHandler::new(registry);
            print_json(&handler.get_columns(connection, node).await?)
        }
        Command::Relationships {
            connection,
            database,
            schema,
        } => {
            let handler = MetadataHandler::new(registry);
            let relationships = handler
                .get_relationships(connection, database.as_deref(), schema.as_deref())
                .await?;
            print_json(&relationships)
        }
        Command::Metrics {
            connection,
            database,
            format,
        } => {
            let handler = MetadataHandler::new(registry);
            let metrics = handler
                .get_database_metrics(connection, database.as_deref())
                .await?;
            match format {
                OutputFormat::Json => print_json(&metrics),
                OutputFormat::Table => {
                    print!("{}", output::format_metrics(&metrics));
                    Ok(())
                }
            }
        }
        Command::Query {
            connection,
            sql,
            database,
            format,
        } => {
            let handler = QueryHandler::new(registry, executor);
            let start = Instant::now();
            let result = handler.execute(connection, sql, database.as_deref()).await?;
            match format {
                OutputFormat::Json => print_json(&result),
                OutputFormat::Table => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    print!("{}", output::format_table(&result, elapsed_ms));
                    Ok(())
                }
            }
        }
        Command::CreateDatabase { connection, name } => {
            AdminHandler::new(registry)
                .create_database(connection, name)
                .await?;
            print_json(&serde_json::json!({ "created": name }))
        }
        Command::DropDatabase { connection, name } => {
            AdminHandler::new(registry)
                .drop_database(connection, name)
                .await?;
            print_json(&serde_json::json!({ "dropped": name }))
        }
        Command::Alter {
            connection,
            schema,
            table,
            operations,
            database,
        } => {
            let operations: Vec<AlterOperation> = parse_payload("operations", operations)?;
            let handler = SchemaChangeHandler::new(registry, executor);
            let report = handler
                .apply(connection, database.as_deref(), schema, table, &operations)
                .await?;
            print_json(&report)?;
            report.into_result()?;
            Ok(())
        }
        Command::UpdateRow {
            connection,
            request,
        } => {
            let request: RowUpdate = parse_payload("row update", request)?;
            let handler = RowUpdateHandler::new(registry, executor);
            print_json(&handler.update_row(connection, &request).await?)
        }
        Command::PayloadSchema => print_json(&serde_json::json!({
            "alterOperation": schemars::schema_for!(AlterOperation),
            "rowUpdate": schemars::schema_for!(RowUpdate),
        })),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let registry = Arc::new(PoolRegistry::with_driver(config.connect_timeout_duration()));
    for db_config in config.parse_databases()? {
        info!(
            id = %db_config.id,
            location = %db_config.definition.masked_location(),
            "Registering connection"
        );
        registry.register(db_config.definition).await?;
    }

    let result = run(&config, Arc::clone(&registry)).await;
    let closed = registry.close_all().await;
    info!(pools = closed, "Shutdown complete");

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        if let Some(suggestion) = e.downcast_ref::<DbError>().and_then(DbError::suggestion) {
            eprintln!("Hint: {suggestion}");
        }
        std::process::exit(1);
    }
    Ok(())
}
