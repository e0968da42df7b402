pub mod classify;
pub mod cli;
pub mod column;
pub mod converter;
pub mod dynamic;
pub mod error;
pub mod extract;
pub mod filter;
pub mod io_utils;
pub mod reader;
pub mod record;
pub mod schema;
pub mod sheet;
pub mod simple;
pub mod table;
pub mod value;
pub mod writer;

use std::{env, io::Write, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde_json::Value as JsonValue;

use crate::{
    cli::{Cli, ColumnsArgs, Commands, ReadArgs, WriteArgs},
    converter::ConverterRegistry,
    dynamic::{DynamicRecord, SchemaFile},
    extract::ColumnsExtractor,
    filter::ExpressionFilter,
    reader::SheetReader,
    record::RecordType,
    sheet::MemorySheet,
    writer::SheetWriter,
};

pub use crate::{
    error::{MappingError, Result as MappingResult},
    record::{FieldTable, Record},
    schema::{ColumnSpec, OverflowSpec, RecordSchema},
    value::{Value, ValueType},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_mapper", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Columns(args) => handle_columns(&args),
        Commands::Read(args) => handle_read(&args),
        Commands::Write(args) => handle_write(&args),
    }
}

fn load_record_type(path: &Path) -> Result<(SchemaFile, RecordType<DynamicRecord>)> {
    let schema = SchemaFile::load(path)?;
    let record_type = schema
        .into_record_type(&ConverterRegistry::default())
        .with_context(|| format!("Resolving schema {path:?}"))?;
    Ok((schema, record_type))
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let (_, record_type) = load_record_type(&args.schema)?;
    let extraction = ColumnsExtractor::extract(&record_type)
        .with_context(|| format!("Extracting columns from {:?}", args.schema))?;

    let headers = ["#", "name", "field", "type", "format", "converter"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut rows = extraction
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.field_name.clone(),
                column.value_type.to_string(),
                column.data_format.clone().unwrap_or_default(),
                column
                    .converter
                    .as_ref()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    if let Some(overflow) = &extraction.overflow {
        rows.push(vec![
            "*".to_string(),
            format!("(other columns, ignoring {})", overflow.ignore.len()),
            overflow.column.field_name.clone(),
            "map".to_string(),
            String::new(),
            overflow
                .column
                .converter
                .as_ref()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
        ]);
    }
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_read(args: &ReadArgs) -> Result<()> {
    let (schema, record_type) = load_record_type(&args.schema)?;
    let delimiter = io_utils::resolve_delimiter(Some(&args.input), args.delimiter);
    info!(
        "Reading '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let input = io_utils::open_input(&args.input)?;
    let sheet_name = args
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".to_string());
    let sheet = MemorySheet::from_csv_reader(sheet_name, input, delimiter)
        .with_context(|| format!("Loading sheet from {:?}", args.input))?;

    let mut reader = SheetReader::new(&sheet, record_type.clone())
        .with_context(|| format!("Preparing reader for {:?}", args.schema))?;
    if !args.filter_exprs.is_empty() {
        debug!("Filter expressions: {:?}", args.filter_exprs);
        reader.add_post_processor(ExpressionFilter::new(&record_type, args.filter_exprs.iter().cloned())?);
    }
    let records = reader
        .read()
        .with_context(|| format!("Decoding rows of {:?}", args.input))?;

    let payload = JsonValue::Array(
        records
            .iter()
            .map(|record| schema.record_to_json(record))
            .collect(),
    );
    let mut output = io_utils::open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut output, &payload).context("Writing JSON records")?;
    writeln!(output).context("Writing JSON records")?;
    output.flush().context("Flushing output")?;
    info!(
        "Decoded {} record(s) from {} header column(s)",
        records.len(),
        reader.header().len()
    );
    Ok(())
}

fn handle_write(args: &WriteArgs) -> Result<()> {
    let (schema, record_type) = load_record_type(&args.schema)?;
    let input = io_utils::open_input(&args.input)?;
    let payload: JsonValue = serde_json::from_reader(input)
        .with_context(|| format!("Parsing JSON records from {:?}", args.input))?;
    let JsonValue::Array(items) = payload else {
        bail!("Expected a JSON array of records in {:?}", args.input);
    };
    let records = items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            schema
                .record_from_json(item)
                .with_context(|| format!("Reading record {}", idx + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sheet = MemorySheet::new("records");
    let mut writer = SheetWriter::new(&mut sheet, record_type)
        .with_context(|| format!("Preparing writer for {:?}", args.schema))?;
    writer.generate_header_row(!args.no_header);
    writer.write(&records).context("Encoding records")?;

    let delimiter = io_utils::resolve_delimiter(args.output.as_deref(), args.delimiter);
    let output = io_utils::open_output(args.output.as_deref())?;
    sheet.write_csv(output, delimiter)?;
    info!(
        "Encoded {} record(s) with delimiter '{}'",
        records.len(),
        printable_delimiter(delimiter)
    );
    Ok(())
}

fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
