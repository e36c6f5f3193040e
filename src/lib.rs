pub mod bulk;
pub mod cli;
pub mod config;
pub mod error;
pub mod infer;
pub mod io_utils;
pub mod mapping;
pub mod matching;
pub mod payload;
pub mod schema;
pub mod session;
pub mod suggest;
pub mod table;
pub mod tokenizer;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, InputArgs, OperationArgs},
    config::IngestConfig,
    mapping::MappingTable,
    schema::{FieldCatalog, FileCatalog},
    session::UploadSession,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_bulkload", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Map(args) => handle_map(&args),
        Commands::Render(args) => handle_render(&args),
        Commands::SuggestFields(args) => handle_suggest_fields(&args),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Starting async runtime")
}

/// Settings for one run: the catalog's object, the operation from the command
/// line or the config file (insert by default), and the config's poll policy.
fn resolve_settings(args: &OperationArgs, catalog: &FieldCatalog) -> Result<IngestConfig> {
    let config = match &args.config {
        Some(path) => Some(IngestConfig::load(path)?),
        None => None,
    };
    if let Some(config) = &config
        && !config.object.eq_ignore_ascii_case(&catalog.object)
    {
        bail!(
            "Config targets '{}' but the catalog describes '{}'",
            config.object,
            catalog.object
        );
    }
    let mut settings = config.unwrap_or_default();
    settings.object = catalog.object.clone();
    if let Some(operation) = args.operation {
        settings.operation = operation;
    }
    debug!(
        "Operation {} with status checks every {:?}, at most {}",
        settings.operation,
        settings.poll.interval(),
        settings.poll.max_attempts
    );
    Ok(settings)
}

fn default_settings(catalog: &FieldCatalog) -> IngestConfig {
    IngestConfig {
        object: catalog.object.clone(),
        ..IngestConfig::default()
    }
}

fn open_session(input: &InputArgs, catalog: &FieldCatalog, settings: &IngestConfig) -> Result<UploadSession> {
    let encoding = io_utils::resolve_encoding(input.input_encoding.as_deref())?;
    let text = io_utils::read_text(&input.input, encoding)?;
    let mut session = UploadSession::from_config(settings);
    session
        .load_text(&text)
        .with_context(|| format!("Parsing {:?}", input.input))?;
    session.set_fields(catalog.fields.clone());
    Ok(session)
}

fn load_catalog(path: &std::path::Path) -> Result<FieldCatalog> {
    FieldCatalog::load(path).with_context(|| format!("Loading field catalog {path:?}"))
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    info!("Probing '{}'", args.input.input.display());
    let catalog = match &args.catalog {
        Some(path) => load_catalog(path)?,
        None => FieldCatalog::default(),
    };
    let mut session = open_session(&args.input, &catalog, &default_settings(&catalog))?;
    if args.catalog.is_some() {
        let applied = session.auto_map()?;
        debug!("{applied} column(s) matched existing fields");
    }
    let doc = session
        .document()
        .context("No document loaded")?;

    let rows = doc
        .headers()
        .iter()
        .filter(|header| session.mapping().target(header).is_none())
        .map(|header| {
            let inferred = infer::infer_column(doc, header);
            vec![
                header.clone(),
                inferred.field_type.to_string(),
                inferred.length.map(|v| v.to_string()).unwrap_or_default(),
                inferred.precision.map(|v| v.to_string()).unwrap_or_default(),
                inferred.scale.map(|v| v.to_string()).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["column", "type", "length", "precision", "scale"]
        .map(String::from)
        .to_vec();
    table::print_table(&headers, &rows);
    info!("Probed {} column(s)", rows.len());
    Ok(())
}

fn handle_map(args: &cli::MapArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)?;
    let settings = resolve_settings(&args.operation, &catalog)?;
    let operation = settings.operation;
    info!(
        "Mapping '{}' onto {} for {operation}",
        args.input.input.display(),
        catalog.object
    );
    let mut session = open_session(&args.input, &catalog, &settings)?;
    let suggestions = session.match_suggestions()?;
    session.auto_map()?;

    let doc = session.document().context("No document loaded")?;
    let rows = doc
        .headers()
        .iter()
        .map(|header| {
            let field = session.mapping().target(header);
            let score = suggestions
                .iter()
                .find(|s| &s.header == header)
                .filter(|s| Some(s.field.as_str()) == field)
                .map(|s| format!("{:.2}", s.score))
                .unwrap_or_default();
            let label = field
                .and_then(|name| catalog.field(name))
                .map(|f| f.display_label().to_string())
                .unwrap_or_default();
            vec![
                header.clone(),
                field.unwrap_or("(unmapped)").to_string(),
                label,
                score,
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["column", "field", "label", "score"]
        .map(String::from)
        .to_vec();
    table::print_table(&headers, &rows);

    match session.validate() {
        Ok(()) => info!("Mapping is valid for {operation}"),
        Err(err) => {
            for issue in &err.issues {
                warn!("{issue}");
            }
        }
    }
    if let Some(path) = &args.output {
        session
            .mapping()
            .save(path)
            .with_context(|| format!("Writing mapping to {path:?}"))?;
        info!(
            "Mapping for {} column(s) written to {path:?}",
            session.mapping().len()
        );
    }
    Ok(())
}

fn handle_render(args: &cli::RenderArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)?;
    let settings = resolve_settings(&args.operation, &catalog)?;
    let operation = settings.operation;
    let mapping = MappingTable::load(&args.mapping)
        .with_context(|| format!("Loading mapping {:?}", args.mapping))?;
    let mut session = open_session(&args.input, &catalog, &settings)?;
    *session.mapping_mut() = mapping;
    session
        .validate()
        .with_context(|| format!("Validating mapping {:?}", args.mapping))?;
    let payload = session.render_payload()?;
    io_utils::write_text(args.output.as_deref(), &payload)?;
    info!(
        "Payload with {} row(s) written to {}",
        session.document().map_or(0, |doc| doc.row_count()),
        args.output
            .as_ref()
            .map(|p| format!("{p:?}"))
            .unwrap_or_else(|| "stdout".into())
    );
    Ok(())
}

fn handle_suggest_fields(args: &cli::SuggestFieldsArgs) -> Result<()> {
    let api = FileCatalog::open(&args.catalog)?;
    let catalog = api.snapshot()?;
    let mut session = open_session(&args.input, &catalog, &default_settings(&catalog))?;
    match &args.mapping {
        Some(path) => {
            *session.mapping_mut() = MappingTable::load(path)
                .with_context(|| format!("Loading mapping {path:?}"))?;
        }
        None => {
            session.auto_map()?;
        }
    }

    let suggestions = session.field_suggestions()?;
    let rows = suggestions
        .iter()
        .map(|s| {
            vec![
                s.header.clone(),
                s.developer_name.clone(),
                s.label.clone(),
                s.field_type.to_string(),
                s.length.map(|v| v.to_string()).unwrap_or_default(),
                s.scale.map(|v| v.to_string()).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["column", "name", "label", "type", "length", "scale"]
        .map(String::from)
        .to_vec();
    table::print_table(&headers, &rows);

    if !args.apply || suggestions.is_empty() {
        return Ok(());
    }
    let report = runtime()?.block_on(session.create_fields(&api, &suggestions));
    for (name, err) in &report.failed {
        warn!("{name}: {err}");
    }
    if let Some(err) = &report.refresh_error {
        warn!("Re-reading {:?} after creation failed: {err}", args.catalog);
    }
    info!(
        "Added {} field(s) to {} in {:?}",
        report.created.len(),
        session.object(),
        args.catalog
    );
    if !report.is_complete() {
        bail!("{} field(s) could not be created", report.failed.len());
    }
    Ok(())
}
