use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Route discovered tables into their target forms",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the tables discovered in a source
    Extract(ExtractArgs),
    /// Reconcile discovered tables with the mappings stored for a source
    Reconcile(ReconcileArgs),
    /// Build per-table submission rows from a source and its mappings
    Prepare(PrepareArgs),
    /// Submit prepared rows, one request per table
    Submit(SubmitArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Decide from the file extension (`.json` is records, anything else delimited)
    Auto,
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Source file: delimited text or a JSON record dump (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[arg(long = "format", default_value = "auto")]
    pub format: SourceFormat,
    /// Delimiter for delimited sources (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Table name for sources that do not name their tables
    #[arg(long = "default-table")]
    pub default_table: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Source or connection id the mappings belong to
    #[arg(short = 's', long = "source-id")]
    pub source_id: String,
    #[command(flatten)]
    pub source: SourceArgs,
    /// Directory holding `<source-id>.json` mapping documents
    #[arg(long = "mappings-dir")]
    pub mappings_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub reconcile: ReconcileArgs,
    /// Column keys from the last submission, as `{ "<table>": [bindings] }`
    #[arg(long = "bindings")]
    pub bindings: Option<PathBuf>,
    /// Output file for the prepared table data (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Source or connection id the submissions are recorded against
    #[arg(short = 's', long = "source-id")]
    pub source_id: String,
    /// Prepared table data produced by `prepare`
    #[arg(short = 't', long = "tables")]
    pub tables: PathBuf,
    /// Directory receiving one JSON document per accepted submission
    #[arg(long = "outbox-dir")]
    pub outbox_dir: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
