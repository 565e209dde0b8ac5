// ABOUTME: CLI entry point for pg-batch-loader
// ABOUTME: Parses commands, merges flags with the config file and routes to handlers

use clap::{Args, Parser, Subcommand};
use pg_batch_loader::commands;
use pg_batch_loader::writer::ConflictPolicy;
use pg_batch_loader::TableRef;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pg-batch-loader")]
#[command(about = "Batch record loader for PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to config.toml (default: ~/.pg-batch-loader/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TargetArg {
    /// Target database URL
    #[arg(long, env = "PG_BATCH_LOADER_TARGET_URL")]
    target: Option<String>,
}

#[derive(Args, Clone)]
struct SourceArg {
    /// Source database URL
    #[arg(long, env = "PG_BATCH_LOADER_SOURCE_URL")]
    source: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write JSON or NDJSON records into a table
    Load {
        /// Destination table (table or schema.table)
        #[arg(long)]
        table: TableRef,
        /// Input file with a JSON array or one object per line (- for stdin)
        #[arg(long)]
        input: PathBuf,
        /// Conflict policy: no_check, ignore, update, partial_update, scd2 (append)
        #[arg(long, default_value = "no_check")]
        policy: ConflictPolicy,
        /// Rows per chunk (default from config)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Conflict columns to use instead of the table's constraints (comma-separated)
        #[arg(long, value_delimiter = ',')]
        conflict_columns: Option<Vec<String>>,
        /// SCD2: replay history, each version starting one second after its predecessor
        #[arg(long)]
        backfill: bool,
        /// update/partial_update: skip rows identical to the stored ones
        #[arg(long)]
        skip_unchanged: bool,
        /// SCD2: columns hashed into meta_version_hash when missing (comma-separated)
        #[arg(long, value_delimiter = ',')]
        hash_columns: Option<Vec<String>>,
        #[command(flatten)]
        target: TargetArg,
    },
    /// Copy the rows of a source query into a target table
    Transfer {
        #[command(flatten)]
        source: SourceArg,
        /// Query to run on the source
        #[arg(long)]
        query: String,
        /// Destination table (table or schema.table)
        #[arg(long)]
        table: TableRef,
        /// Conflict policy: no_check, ignore, update, partial_update, scd2 (append)
        #[arg(long, default_value = "no_check")]
        policy: ConflictPolicy,
        /// Conflict columns to use instead of the table's constraints (comma-separated)
        #[arg(long, value_delimiter = ',')]
        conflict_columns: Option<Vec<String>>,
        /// Read the source through a cursor instead of loading every row first
        #[arg(long)]
        stream: bool,
        #[command(flatten)]
        target: TargetArg,
    },
    /// Page a templated query into a table with INSERT ... SELECT
    Generate {
        /// File with the query template ({{ offset }}, {{ limit }}, {{ name }})
        #[arg(long)]
        template: PathBuf,
        /// Destination table (table or schema.table)
        #[arg(long)]
        table: TableRef,
        /// Template parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Conflict policy: no_check, ignore, update, partial_update
        #[arg(long, default_value = "no_check")]
        policy: ConflictPolicy,
        /// Rows per page (default from config)
        #[arg(long)]
        page_size: Option<usize>,
        #[command(flatten)]
        target: TargetArg,
    },
    /// Print the rows of a query as NDJSON
    Extract {
        #[command(flatten)]
        source: SourceArg,
        /// Query to run on the source
        #[arg(long)]
        query: String,
        /// Read through a cursor instead of loading every row first
        #[arg(long)]
        stream: bool,
    },
    /// Print the columns and constraints of a table as JSON
    Describe {
        /// Table (table or schema.table)
        #[arg(long)]
        table: TableRef,
        #[command(flatten)]
        target: TargetArg,
    },
    /// Execute one SQL statement on the target
    Exec {
        /// Statement to execute
        #[arg(long)]
        sql: String,
        #[command(flatten)]
        target: TargetArg,
    },
    /// Add columns that exist on the source table but not on the target table
    SyncSchema {
        #[command(flatten)]
        source: SourceArg,
        /// Table present on both databases (table or schema.table)
        #[arg(long)]
        table: TableRef,
        #[command(flatten)]
        target: TargetArg,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    pg_batch_loader::postgres::init_tls_policy(cli.allow_self_signed_certs);

    let config = pg_batch_loader::config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Load {
            table,
            input,
            policy,
            batch_size,
            conflict_columns,
            backfill,
            skip_unchanged,
            hash_columns,
            target,
        } => {
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::load::run(
                commands::load::LoadCommandOptions {
                    target,
                    table,
                    input,
                    policy,
                    batch_size,
                    conflict_columns,
                    backfill,
                    skip_unchanged,
                    hash_columns,
                },
                &config,
            )
            .await
        }
        Commands::Transfer {
            source,
            query,
            table,
            policy,
            conflict_columns,
            stream,
            target,
        } => {
            let source = commands::resolve_source_url(source.source, &config)?;
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::transfer::run(
                commands::transfer::TransferCommandOptions {
                    source,
                    target,
                    query,
                    table,
                    policy,
                    conflict_columns,
                    stream,
                },
                &config,
            )
            .await
        }
        Commands::Generate {
            template,
            table,
            params,
            policy,
            page_size,
            target,
        } => {
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::generate::run(
                commands::generate::GenerateCommandOptions {
                    target,
                    template,
                    table,
                    params,
                    policy,
                    page_size,
                },
                &config,
            )
            .await
        }
        Commands::Extract {
            source,
            query,
            stream,
        } => {
            let source = commands::resolve_source_url(source.source, &config)?;
            commands::extract::run(
                commands::extract::ExtractCommandOptions {
                    source,
                    query,
                    stream,
                },
                &config,
            )
            .await
        }
        Commands::Describe { table, target } => {
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::describe::run(&target, &table, &config).await
        }
        Commands::Exec { sql, target } => {
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::exec::run(&target, &sql, &config).await
        }
        Commands::SyncSchema {
            source,
            table,
            target,
        } => {
            let source = commands::resolve_source_url(source.source, &config)?;
            let target = commands::resolve_target_url(target.target, &config)?;
            commands::sync_schema::run(&source, &target, &table, &config).await
        }
    }
}
