use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Map spreadsheet rows to typed records and back", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the column set a schema file resolves to
    Columns(ColumnsArgs),
    /// Decode the rows of a CSV-backed sheet into JSON records
    Read(ReadArgs),
    /// Encode JSON records into a CSV-backed sheet
    Write(WriteArgs),
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// YAML schema file describing the record
    #[arg(short, long)]
    pub schema: PathBuf,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// YAML schema file describing the record
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Sheet to decode as CSV; the first row is the header (use '-' for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Boolean expressions a record must satisfy to be kept (repeatable)
    #[arg(long = "filter-expr", action = clap::ArgAction::Append)]
    pub filter_exprs: Vec<String>,
    /// Destination JSON file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// YAML schema file describing the record
    #[arg(short, long)]
    pub schema: PathBuf,
    /// JSON array of record objects (use '-' for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Destination CSV file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Omit the header row
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
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
