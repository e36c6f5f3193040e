use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::bulk::Operation;

#[derive(Debug, Parser)]
#[command(author, version, about = "Reconcile CSV files with a record schema for bulk ingest", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer a field type for each column (or each column left unmapped by a catalog)
    Probe(ProbeArgs),
    /// Suggest a column-to-field mapping against a field catalog and validate it
    Map(MapArgs),
    /// Write the normalized upload payload for a validated mapping
    Render(RenderArgs),
    /// Propose new fields for unmapped columns, optionally adding them to the catalog
    SuggestFields(SuggestFieldsArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct OperationArgs {
    /// Bulk operation the mapping is checked for
    #[arg(long, value_enum)]
    pub operation: Option<Operation>,
    /// Ingest settings file (YAML or JSON) supplying the operation
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Field catalog; when given only columns without a matching field are probed
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Field catalog describing the target object (YAML or JSON)
    #[arg(short, long)]
    pub catalog: PathBuf,
    /// Where to save the suggested mapping table
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub operation: OperationArgs,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Field catalog describing the target object (YAML or JSON)
    #[arg(short, long)]
    pub catalog: PathBuf,
    /// Mapping table produced by `map` or written by hand
    #[arg(short, long)]
    pub mapping: PathBuf,
    /// Output payload file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub operation: OperationArgs,
}

#[derive(Debug, Args)]
pub struct SuggestFieldsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Field catalog describing the target object (YAML or JSON)
    #[arg(short, long)]
    pub catalog: PathBuf,
    /// Mapping table to respect; columns are auto-mapped when omitted
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,
    /// Add the suggested fields to the catalog file
    #[arg(long)]
    pub apply: bool,
}
