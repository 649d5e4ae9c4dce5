pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod io_utils;
pub mod model;
pub mod prepare;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod service;
pub mod store;
pub mod submit;

use std::{collections::HashMap, env, path::Path, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde_json::Value;

use crate::{
    cli::{Cli, Commands, SourceArgs, SourceFormat},
    config::Config,
    model::{ColumnKeyBinding, Table, TableData},
    reconcile::Reconciliation,
    registry::{ColumnKeyRegistry, UuidIds},
    service::MappingService,
    store::{JsonMappingStore, OutboxSubmissionSink},
    submit::SubmissionOrchestrator,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("form_bridge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("Starting async runtime")?;
    match cli.command {
        Commands::Extract(args) => handle_extract(&config, &args.source),
        Commands::Reconcile(args) => runtime.block_on(handle_reconcile(&config, &args)),
        Commands::Prepare(args) => runtime.block_on(handle_prepare(&config, &args)),
        Commands::Submit(args) => runtime.block_on(handle_submit(&config, &args)),
    }
}

fn load_tables(config: &Config, args: &SourceArgs) -> Result<Vec<Table>> {
    let default_name = args
        .default_table
        .as_deref()
        .unwrap_or(&config.default_table_name);
    let is_json = match args.format {
        SourceFormat::Json => true,
        SourceFormat::Csv => false,
        SourceFormat::Auto => args
            .input
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json")),
    };
    if is_json {
        let raw: Value = io_utils::load_json(&args.input)?;
        return Ok(extract::from_records(&raw, default_name));
    }
    let delimiter =
        io_utils::resolve_input_delimiter(&args.input, args.delimiter.or(config.delimiter_byte()?));
    let encoding = io_utils::resolve_encoding(
        args.input_encoding
            .as_deref()
            .or(config.input_encoding.as_deref()),
    )?;
    extract::from_csv_path(&args.input, delimiter, encoding, default_name)
        .with_context(|| format!("Extracting tables from {:?}", args.input))
}

fn handle_extract(config: &Config, args: &SourceArgs) -> Result<()> {
    let tables = load_tables(config, args)?;
    info!("Discovered {} table(s) in {:?}", tables.len(), args.input);
    print!("{}", report::render_tables(&tables));
    Ok(())
}

async fn reconcile_source(
    config: &Config,
    args: &cli::ReconcileArgs,
) -> Result<(Vec<Table>, Reconciliation)> {
    let tables = load_tables(config, &args.source)?;
    let dir = args.mappings_dir.as_deref().unwrap_or(&config.mappings_dir);
    let store = JsonMappingStore::new(dir);
    let persisted = store
        .lookup(&args.source_id)
        .await
        .with_context(|| format!("Loading mappings for source '{}'", args.source_id))?;
    debug!(
        "Loaded {} persisted mapping(s) for source '{}'",
        persisted.len(),
        args.source_id
    );
    let result = reconcile::reconcile(&store, &args.source_id, &tables, persisted).await;
    if let Some(warning) = result.warning() {
        warn!("{warning}");
    }
    Ok((tables, result))
}

async fn handle_reconcile(config: &Config, args: &cli::ReconcileArgs) -> Result<()> {
    let (_, result) = reconcile_source(config, args).await?;
    print!("{}", report::render_reconciliation(&result));
    Ok(())
}

async fn handle_prepare(config: &Config, args: &cli::PrepareArgs) -> Result<()> {
    let (tables, result) = reconcile_source(config, &args.reconcile).await?;
    let last_known: HashMap<String, Vec<ColumnKeyBinding>> = match &args.bindings {
        Some(path) => io_utils::load_json(path)
            .with_context(|| format!("Loading column keys from {path:?}"))?,
        None => HashMap::new(),
    };
    let registry = ColumnKeyRegistry::new(UuidIds);
    let data = prepare::prepare_all(&tables, &result.mappings, |table, mapping| {
        if let Some(bindings) = last_known.get(&table.name) {
            return bindings.clone();
        }
        let columns = table.columns();
        match mapping {
            Some(m) if !m.target_form_fields().is_empty() => {
                registry.from_form_fields(m.target_form_fields(), &columns)
            }
            _ => registry.from_source_columns(&columns),
        }
    });
    io_utils::save_json(args.output.as_deref(), &data)?;
    info!("Prepared {} table(s)", data.len());
    Ok(())
}

async fn handle_submit(config: &Config, args: &cli::SubmitArgs) -> Result<()> {
    let data: TableData = io_utils::load_json(&args.tables)
        .with_context(|| format!("Loading table data from {:?}", args.tables))?;
    let outbox = Arc::new(OutboxSubmissionSink::new(outbox_dir(config, args)));
    let orchestrator =
        SubmissionOrchestrator::new(outbox.clone(), &args.source_id).with_ledger(outbox);
    let summary = orchestrator.submit(&data).await?;
    print!("{}", report::render_summary(&summary));
    Ok(())
}

fn outbox_dir<'a>(config: &'a Config, args: &'a cli::SubmitArgs) -> &'a Path {
    args.outbox_dir.as_deref().unwrap_or(&config.outbox_dir)
}
